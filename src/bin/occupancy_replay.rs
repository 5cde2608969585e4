//! occupancy_replay - table occupancy from a recorded video
//!
//! Processes a local recording at roughly one frame per second of footage
//! and pushes each count to the same sinks as `occupancyd`. Stops at the
//! end of the file.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

use occupancy_monitor::{
    build_sinks, install_shutdown_handler, load_backend, report_run, FileConfig, FileSource,
    Monitor, MonitorConfig, RunSummary, SupabaseCredentials, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Count table occupancy in a recorded video")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "OCCUPANCY_CONFIG")]
    config: Option<PathBuf>,

    /// Local video file, or stub://clip?frames=N&fps=F for a dry run.
    #[arg(long, env = "OCCUPANCY_VIDEO_PATH")]
    video: Option<String>,

    /// Detector backend: 'tract' (ONNX model) or 'stub'.
    #[arg(long, env = "OCCUPANCY_BACKEND")]
    backend: Option<String>,

    /// Path to the exported ONNX model.
    #[arg(long, env = "OCCUPANCY_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Skip the local dashboard endpoint.
    #[arg(long)]
    no_local_sink: bool,

    /// Stop after this many snapshots.
    #[arg(long)]
    max_snapshots: Option<u64>,
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let credentials = SupabaseCredentials::from_env()?;
    report_run(run(args, &credentials)).map(|_| ())
}

fn run(args: Args, credentials: &SupabaseCredentials) -> Result<RunSummary> {
    let mut config = MonitorConfig::load_from(args.config.as_deref())?;
    if let Some(video) = args.video {
        config.video_path = video;
    }
    if let Some(backend) = args.backend.as_deref() {
        config.detector.backend = backend.parse()?;
    }
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    if args.no_local_sink {
        config.local_sink.enabled = false;
    }

    let sinks =
        build_sinks(&config, credentials).context("failed to initialise database client")?;
    let detector = load_backend(
        config.detector.backend,
        &config.detector.model_path,
        config.detector.input_size,
    )?;

    log::info!("opening video from {}", config.video_path);
    let mut source = FileSource::new(FileConfig {
        path: config.video_path.clone(),
    })?;

    let shutdown = install_shutdown_handler()?;
    let mut settings = config.monitor_settings();
    settings.max_snapshots = args.max_snapshots;
    let mut monitor = Monitor::new(detector, sinks, settings, SystemClock).with_shutdown(shutdown);
    monitor.run_file(&mut source)
}
