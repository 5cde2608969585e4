//! Recorded video file source.
//!
//! `FileSource` reads a local recording front to back. A failed read means
//! end of input; there is no reconnect. The source reports the container's
//! frame rate so the caller can sample roughly one frame per second.
//!
//! Supported inputs:
//! - a local file path, decoded with FFmpeg (feature: ingest-file-ffmpeg)
//! - `stub://<name>?frames=N&fps=F&width=W&height=H`, a synthetic clip for tests

use anyhow::{anyhow, Context, Result};
use std::path::Path;
use url::Url;

#[cfg(feature = "ingest-file-ffmpeg")]
use super::file_ffmpeg::FfmpegFileSource;
use super::{FrameSource, SourceStats};
use crate::frame::Frame;

/// Configuration for a recorded file source.
#[derive(Clone, Debug, Default)]
pub struct FileConfig {
    /// Local file path (e.g., "recordings/lunch_rush.mp4").
    pub path: String,
}

/// Recorded video file source.
pub struct FileSource {
    path: String,
    backend: FileBackend,
}

enum FileBackend {
    Synthetic(SyntheticFileSource),
    #[cfg(feature = "ingest-file-ffmpeg")]
    Ffmpeg(FfmpegFileSource),
}

impl FileSource {
    pub fn new(config: FileConfig) -> Result<Self> {
        if !is_local_file_path(&config.path) {
            return Err(anyhow!(
                "file ingestion only supports local paths (no URL schemes)"
            ));
        }
        if config.path.starts_with("stub://") {
            let synthetic = SyntheticFileSource::parse(&config.path)?;
            return Ok(Self {
                path: config.path,
                backend: FileBackend::Synthetic(synthetic),
            });
        }
        if !Path::new(&config.path).is_file() {
            return Err(anyhow!("video file not found at {}", config.path));
        }
        Self::open_decoder(config)
    }

    #[cfg(feature = "ingest-file-ffmpeg")]
    fn open_decoder(config: FileConfig) -> Result<Self> {
        Ok(Self {
            path: config.path.clone(),
            backend: FileBackend::Ffmpeg(FfmpegFileSource::new(config)?),
        })
    }

    #[cfg(not(feature = "ingest-file-ffmpeg"))]
    fn open_decoder(_config: FileConfig) -> Result<Self> {
        Err(anyhow!(
            "file ingestion requires the ingest-file-ffmpeg feature"
        ))
    }
}

impl FrameSource for FileSource {
    fn describe(&self) -> String {
        self.path.clone()
    }

    fn connect(&mut self) -> Result<()> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.connect(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.connect(),
        }
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        match &mut self.backend {
            FileBackend::Synthetic(source) => source.next_frame(),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.next_frame(),
        }
    }

    fn reconnect(&mut self) -> Result<()> {
        Err(anyhow!("file sources cannot be reopened mid-read"))
    }

    fn frame_rate(&self) -> Option<f64> {
        match &self.backend {
            FileBackend::Synthetic(source) => Some(source.fps),
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frame_rate(),
        }
    }

    fn stats(&self) -> SourceStats {
        let frames_captured = match &self.backend {
            FileBackend::Synthetic(source) => source.frame_count,
            #[cfg(feature = "ingest-file-ffmpeg")]
            FileBackend::Ffmpeg(source) => source.frames_captured(),
        };
        SourceStats {
            frames_captured,
            source: self.path.clone(),
        }
    }
}

// ----------------------------------------------------------------------------
// Synthetic source (stub://) for tests
// ----------------------------------------------------------------------------

struct SyntheticFileSource {
    total_frames: u64,
    fps: f64,
    width: u32,
    height: u32,
    frame_count: u64,
}

impl SyntheticFileSource {
    fn parse(location: &str) -> Result<Self> {
        let url = Url::parse(location).with_context(|| format!("parse synthetic clip '{}'", location))?;
        let mut source = Self {
            total_frames: 300,
            fps: 30.0,
            width: 64,
            height: 48,
            frame_count: 0,
        };
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "frames" => source.total_frames = parse_param(&key, &value)?,
                "fps" => source.fps = parse_param(&key, &value)?,
                "width" => source.width = parse_param(&key, &value)?,
                "height" => source.height = parse_param(&key, &value)?,
                other => return Err(anyhow!("unknown synthetic clip parameter '{}'", other)),
            }
        }
        Ok(source)
    }

    fn connect(&mut self) -> Result<()> {
        log::info!(
            "FileSource: opened synthetic clip ({} frames @ {} fps)",
            self.total_frames,
            self.fps
        );
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        if self.frame_count >= self.total_frames {
            return Ok(None);
        }
        let shade = (self.frame_count % 256) as u8;
        let frame = Frame::filled(self.width, self.height, self.frame_count, shade)?;
        self.frame_count += 1;
        Ok(Some(frame))
    }
}

fn parse_param<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .parse()
        .map_err(|_| anyhow!("invalid value '{}' for synthetic clip parameter '{}'", value, key))
}

fn is_local_file_path(path: &str) -> bool {
    if path.trim().is_empty() {
        return false;
    }
    if path.starts_with("stub://") {
        return true;
    }
    !path.contains("://")
}
