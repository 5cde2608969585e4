use anyhow::Result;

use crate::detect::backend::DetectorBackend;
use crate::detect::result::{Detection, DetectionResult};
use crate::frame::Frame;

/// Stub backend for dry runs and tests.
///
/// Replays a script of per-frame detections, cycling when it runs out.
/// An empty script detects nothing.
#[derive(Default)]
pub struct StubBackend {
    script: Vec<Vec<Detection>>,
    cursor: usize,
    frames_seen: u64,
}

impl StubBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replay `script`, one entry per `detect` call.
    pub fn with_script(script: Vec<Vec<Detection>>) -> Self {
        Self {
            script,
            ..Self::default()
        }
    }

    /// Script where frame `n` yields `counts[n]` detections of `class_id`.
    pub fn with_class_counts(class_id: u32, counts: &[usize]) -> Self {
        let script = counts
            .iter()
            .map(|&n| vec![Detection::of_class(class_id, 0.9); n])
            .collect();
        Self::with_script(script)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }
}

impl DetectorBackend for StubBackend {
    fn name(&self) -> &'static str {
        "stub"
    }

    fn detect(&mut self, _frame: &Frame, confidence_threshold: f32) -> Result<DetectionResult> {
        self.frames_seen += 1;
        if self.script.is_empty() {
            return Ok(DetectionResult::default());
        }
        let entry = &self.script[self.cursor % self.script.len()];
        self.cursor = self.cursor.wrapping_add(1);
        let detections = entry
            .iter()
            .filter(|d| d.confidence >= confidence_threshold)
            .cloned()
            .collect();
        Ok(DetectionResult::new(detections))
    }
}
