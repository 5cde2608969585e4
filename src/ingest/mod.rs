//! Frame ingestion sources.
//!
//! This module provides the two kinds of video input the monitor reads:
//! - Live streams (HTTP MJPEG / JPEG snapshots, RTSP with feature: rtsp-gstreamer)
//! - Recorded video files (feature: ingest-file-ffmpeg)
//!
//! Both also accept a `stub://` URL that produces synthetic frames for tests.
//!
//! Frames are decoded in memory and handed to the caller one at a time; the
//! ingestion layer never stores or retransmits them.

pub mod file;
#[cfg(feature = "ingest-file-ffmpeg")]
pub(crate) mod file_ffmpeg;
mod mjpeg;
pub mod stream;

use anyhow::Result;

use crate::frame::Frame;

pub use file::{FileConfig, FileSource};
pub use stream::{StreamConfig, StreamSource};

/// A source of decoded frames.
pub trait FrameSource {
    /// Human-readable source name for logs (URL or path).
    fn describe(&self) -> String;

    /// Open the source. Called once before the first read.
    fn connect(&mut self) -> Result<()>;

    /// Next decoded frame.
    ///
    /// `Ok(None)` means the source has no more input; `Err` is a failed read.
    fn next_frame(&mut self) -> Result<Option<Frame>>;

    /// Reopen the source in place after a failed read.
    fn reconnect(&mut self) -> Result<()> {
        self.connect()
    }

    /// Frames per second reported by the source, if known.
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    fn stats(&self) -> SourceStats;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn describe(&self) -> String {
        (**self).describe()
    }

    fn connect(&mut self) -> Result<()> {
        (**self).connect()
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        (**self).next_frame()
    }

    fn reconnect(&mut self) -> Result<()> {
        (**self).reconnect()
    }

    fn frame_rate(&self) -> Option<f64> {
        (**self).frame_rate()
    }

    fn stats(&self) -> SourceStats {
        (**self).stats()
    }
}

/// Source statistics.
#[derive(Clone, Debug)]
pub struct SourceStats {
    pub frames_captured: u64,
    pub source: String,
}
