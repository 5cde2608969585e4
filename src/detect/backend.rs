use anyhow::Result;

use crate::detect::result::DetectionResult;
use crate::frame::Frame;

/// Detector backend trait.
///
/// A backend is loaded once at start-up and invoked once per sampled frame.
/// Implementations must treat the frame as read-only and must not retain it
/// past the `detect` call.
pub trait DetectorBackend: Send {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Run detection on a frame, keeping only detections scoring at least
    /// `confidence_threshold`.
    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<DetectionResult>;

    /// Optional warm-up hook.
    fn warm_up(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<B: DetectorBackend + ?Sized> DetectorBackend for Box<B> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<DetectionResult> {
        (**self).detect(frame, confidence_threshold)
    }

    fn warm_up(&mut self) -> Result<()> {
        (**self).warm_up()
    }
}
