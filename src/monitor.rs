//! The monitor loop.
//!
//! One thread, strictly sequential: read a frame, decide whether to sample
//! it, detect, count, publish. Live streams are read continuously and
//! reopened in place after a failed read; recorded files stop at the first
//! failed read.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::clock::{Clock, SystemClock};
use crate::detect::DetectorBackend;
use crate::frame::Frame;
use crate::ingest::FrameSource;
use crate::occupancy::{OccupancyRule, OccupancySnapshot};
use crate::sampling::{FrameStride, IntervalThrottle};
use crate::sink::{publish, SnapshotSink};

#[derive(Clone, Debug)]
pub struct MonitorSettings {
    pub restaurant_id: String,
    pub rule: OccupancyRule,
    pub confidence_threshold: f32,
    /// Minimum spacing between processed stream frames.
    pub process_interval: Duration,
    /// Pause before reopening a stream after a failed read.
    pub reconnect_delay: Duration,
    /// Stop after this many snapshots. `None` runs until input ends or shutdown.
    pub max_snapshots: Option<u64>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopReason {
    EndOfInput,
    Shutdown,
    SnapshotLimit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RunSummary {
    pub frames_read: u64,
    pub frames_processed: u64,
    pub reconnects: u64,
    pub stop: StopReason,
}

#[derive(Default)]
struct Counters {
    frames_read: u64,
    frames_processed: u64,
    reconnects: u64,
}

impl Counters {
    fn finish(self, stop: StopReason) -> RunSummary {
        RunSummary {
            frames_read: self.frames_read,
            frames_processed: self.frames_processed,
            reconnects: self.reconnects,
            stop,
        }
    }
}

pub struct Monitor<C: Clock = SystemClock> {
    detector: Box<dyn DetectorBackend>,
    sinks: Vec<Box<dyn SnapshotSink>>,
    settings: MonitorSettings,
    clock: C,
    shutdown: Arc<AtomicBool>,
    snapshots: u64,
}

impl<C: Clock> Monitor<C> {
    pub fn new(
        detector: Box<dyn DetectorBackend>,
        sinks: Vec<Box<dyn SnapshotSink>>,
        settings: MonitorSettings,
        clock: C,
    ) -> Self {
        Self {
            detector,
            sinks,
            settings,
            clock,
            shutdown: Arc::new(AtomicBool::new(false)),
            snapshots: 0,
        }
    }

    /// Stop the loop at the next iteration once `flag` is set.
    pub fn with_shutdown(mut self, flag: Arc<AtomicBool>) -> Self {
        self.shutdown = flag;
        self
    }

    pub fn snapshots_published(&self) -> u64 {
        self.snapshots
    }

    /// Process a live stream until shutdown or the snapshot limit.
    ///
    /// Failing to open the stream is fatal. After that, read failures and
    /// stream ends trigger a reconnect after `reconnect_delay`, indefinitely.
    pub fn run_stream<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<RunSummary> {
        source
            .connect()
            .with_context(|| format!("could not open video stream {}", source.describe()))?;
        log::info!(
            "monitoring {} for {} (every {:?})",
            source.describe(),
            self.settings.restaurant_id,
            self.settings.process_interval
        );

        let mut throttle = IntervalThrottle::new(self.settings.process_interval);
        let mut counters = Counters::default();
        let stop = loop {
            if self.shutdown_requested() {
                break StopReason::Shutdown;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    log::warn!("stream {} ended, reconnecting", source.describe());
                    self.reconnect(source, &mut counters);
                    continue;
                }
                Err(err) => {
                    log::warn!("failed to read frame: {:#}; reconnecting", err);
                    self.reconnect(source, &mut counters);
                    continue;
                }
            };
            counters.frames_read += 1;

            if !throttle.ready(self.clock.now()) {
                log::trace!("frame {} skipped by interval throttle", frame.index);
                continue;
            }

            self.process_frame(&frame)?;
            counters.frames_processed += 1;
            if self.snapshot_limit_reached() {
                break StopReason::SnapshotLimit;
            }
        };

        Ok(counters.finish(stop))
    }

    /// Process a recorded file, about one frame per second of footage.
    ///
    /// The file ends at the first read that yields no frame.
    pub fn run_file<S: FrameSource + ?Sized>(&mut self, source: &mut S) -> Result<RunSummary> {
        source
            .connect()
            .with_context(|| format!("could not open video file {}", source.describe()))?;
        let frame_rate = source.frame_rate();
        match frame_rate {
            Some(fps) => log::info!("video {} reports {:.2} fps", source.describe(), fps),
            None => log::info!("video {} reports no frame rate", source.describe()),
        }

        let stride = FrameStride::from_frame_rate(frame_rate);
        let mut counters = Counters::default();
        let stop = loop {
            if self.shutdown_requested() {
                break StopReason::Shutdown;
            }

            let frame = match source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break StopReason::EndOfInput,
                Err(err) => {
                    log::warn!("failed to read frame: {:#}; treating as end of video", err);
                    break StopReason::EndOfInput;
                }
            };
            let index = counters.frames_read;
            counters.frames_read += 1;

            if !stride.selects(index) {
                continue;
            }

            self.process_frame(&frame)?;
            counters.frames_processed += 1;
            if self.snapshot_limit_reached() {
                break StopReason::SnapshotLimit;
            }
        };

        log::info!(
            "video {} done: {} frames read, {} processed",
            source.describe(),
            counters.frames_read,
            counters.frames_processed
        );
        Ok(counters.finish(stop))
    }

    /// Detect, count and publish one frame.
    ///
    /// Detector errors propagate; sink failures are logged and skipped.
    pub fn process_frame(&mut self, frame: &Frame) -> Result<OccupancySnapshot> {
        let result = self
            .detector
            .detect(frame, self.settings.confidence_threshold)
            .with_context(|| {
                format!(
                    "{} detector failed on frame {}",
                    self.detector.name(),
                    frame.index
                )
            })?;
        log::debug!("frame {}: {} detections", frame.index, result.len());

        let raw_occupied = self.settings.rule.count(&result);
        let snapshot = OccupancySnapshot::from_count(
            &self.settings.restaurant_id,
            raw_occupied,
            &self.settings.rule,
            self.clock.wall_time(),
        );
        log::info!(
            "processed frame {}: occupied={}, vacant={}, total={}",
            frame.index,
            snapshot.occupied,
            snapshot.vacant,
            snapshot.total
        );

        let report = publish(&mut self.sinks, &snapshot);
        if !report.all_succeeded() {
            log::debug!(
                "{}/{} sinks failed for frame {}",
                report.failed.len(),
                report.attempted,
                frame.index
            );
        }
        self.snapshots += 1;
        Ok(snapshot)
    }

    fn reconnect<S: FrameSource + ?Sized>(&mut self, source: &mut S, counters: &mut Counters) {
        self.clock.sleep(self.settings.reconnect_delay);
        counters.reconnects += 1;
        match source.reconnect() {
            Ok(()) => log::info!("reconnected to {}", source.describe()),
            Err(err) => log::warn!("reconnect to {} failed: {:#}", source.describe(), err),
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }

    fn snapshot_limit_reached(&self) -> bool {
        matches!(self.settings.max_snapshots, Some(limit) if self.snapshots >= limit)
    }
}

/// Install a Ctrl-C handler that sets the returned flag.
///
/// A second Ctrl-C exits immediately, for loops blocked inside a read.
pub fn install_shutdown_handler() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    ctrlc::set_handler(move || {
        if handler_flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
    })
    .context("error setting Ctrl-C handler")?;
    Ok(flag)
}

/// Log how a run ended, then "detection completed", and pass the result on.
pub fn report_run(outcome: Result<RunSummary>) -> Result<RunSummary> {
    let result = match outcome {
        Ok(summary) => {
            if summary.stop == StopReason::Shutdown {
                log::info!("stopped by user");
            }
            log::info!(
                "{} frames read, {} processed, {} reconnects",
                summary.frames_read,
                summary.frames_processed,
                summary.reconnects
            );
            Ok(summary)
        }
        Err(err) => {
            log::error!("error during detection: {:#}", err);
            Err(err)
        }
    };
    log::info!("detection completed");
    result
}
