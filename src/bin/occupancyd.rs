//! occupancyd - live table occupancy monitor
//!
//! This daemon:
//! 1. Reads database credentials and configuration
//! 2. Loads the detector once
//! 3. Reads a live camera stream, reconnecting after failed reads
//! 4. Every `process_interval`, counts occupied tables and pushes the counts
//!    to the local dashboard endpoint and the remote database

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

use occupancy_monitor::{
    build_sinks, install_shutdown_handler, load_backend, report_run, Monitor, MonitorConfig,
    RunSummary, StreamConfig, StreamSource, SupabaseCredentials, SystemClock,
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Monitor table occupancy from a live camera stream")]
struct Args {
    /// JSON config file.
    #[arg(long, env = "OCCUPANCY_CONFIG")]
    config: Option<PathBuf>,

    /// Stream URL: http(s):// MJPEG or snapshot endpoint, rtsp://, or stub:// for a dry run.
    #[arg(long, env = "OCCUPANCY_STREAM_URL")]
    stream_url: Option<String>,

    /// Detector backend: 'tract' (ONNX model) or 'stub'.
    #[arg(long, env = "OCCUPANCY_BACKEND")]
    backend: Option<String>,

    /// Path to the exported ONNX model.
    #[arg(long, env = "OCCUPANCY_MODEL_PATH")]
    model: Option<PathBuf>,

    /// Minimum milliseconds between processed frames.
    #[arg(long)]
    interval_ms: Option<u64>,

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
    if let Some(url) = args.stream_url {
        config.stream.url = url;
    }
    if let Some(backend) = args.backend.as_deref() {
        config.detector.backend = backend.parse()?;
    }
    if let Some(model) = args.model {
        config.detector.model_path = model;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.stream.process_interval = Duration::from_millis(interval_ms);
    }
    if args.no_local_sink {
        config.local_sink.enabled = false;
    }

    let sinks =
        build_sinks(&config, credentials).context("failed to initialise database client")?;
    log::info!("database client ready (table {})", config.database_table);

    log::info!(
        "loading {} detector from {}",
        config.detector.backend,
        config.detector.model_path.display()
    );
    let detector = load_backend(
        config.detector.backend,
        &config.detector.model_path,
        config.detector.input_size,
    )?;

    let mut source = StreamSource::new(StreamConfig {
        url: config.stream.url.clone(),
        ..StreamConfig::default()
    })?;

    let shutdown = install_shutdown_handler()?;
    let mut settings = config.monitor_settings();
    settings.max_snapshots = args.max_snapshots;
    let mut monitor = Monitor::new(detector, sinks, settings, SystemClock).with_shutdown(shutdown);
    monitor.run_stream(&mut source)
}
