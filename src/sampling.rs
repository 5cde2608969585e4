//! Frame sampling policies.
//!
//! Live streams are sampled by wall-clock interval; every frame is still read
//! so the decoder buffer does not fall behind. Recorded files are sampled by
//! frame index, roughly one processed frame per second of footage.

use std::time::{Duration, Instant};

/// Admits at most one frame per `interval`.
#[derive(Clone, Debug)]
pub struct IntervalThrottle {
    interval: Duration,
    last: Option<Instant>,
}

impl IntervalThrottle {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    /// True when a frame read at `now` should be processed. Records `now` when it is.
    pub fn ready(&mut self, now: Instant) -> bool {
        if let Some(last) = self.last {
            if now.saturating_duration_since(last) < self.interval {
                return false;
            }
        }
        self.last = Some(now);
        true
    }
}

/// Selects every `stride`-th frame by index, starting at 0.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameStride {
    stride: u64,
}

impl FrameStride {
    pub fn every(stride: u64) -> Self {
        Self {
            stride: stride.max(1),
        }
    }

    /// Stride equal to the rounded frame rate. Unknown or sub-1 rates select every frame.
    pub fn from_frame_rate(fps: Option<f64>) -> Self {
        match fps {
            Some(fps) if fps.is_finite() && fps >= 0.5 => Self::every(fps.round() as u64),
            other => {
                log::warn!(
                    "source frame rate {:?} is unusable; processing every frame",
                    other
                );
                Self::every(1)
            }
        }
    }

    pub fn stride(&self) -> u64 {
        self.stride
    }

    pub fn selects(&self, index: u64) -> bool {
        index % self.stride == 0
    }
}
