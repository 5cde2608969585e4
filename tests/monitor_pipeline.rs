use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{anyhow, Result};

use occupancy_monitor::{
    Detection, DetectionResult, DetectorBackend, Frame, FrameSource, ManualClock, Monitor,
    MonitorSettings, OccupancyRule, OccupancySnapshot, SnapshotSink, SourceStats, StopReason,
};

// ----------------------------------------------------------------------------
// Scripted collaborators
// ----------------------------------------------------------------------------

enum Read {
    Frame,
    Fail,
}

/// Replays a script of reads; each read advances simulated time by `spacing`.
struct ScriptedSource<'a> {
    reads: VecDeque<Read>,
    clock: &'a ManualClock,
    spacing: Duration,
    fps: Option<f64>,
    next_index: u64,
    connects: u32,
    refuse_connect: bool,
    stop_when_done: Option<Arc<AtomicBool>>,
}

impl<'a> ScriptedSource<'a> {
    fn new(reads: Vec<Read>, clock: &'a ManualClock, spacing: Duration) -> Self {
        Self {
            reads: reads.into(),
            clock,
            spacing,
            fps: None,
            next_index: 0,
            connects: 0,
            refuse_connect: false,
            stop_when_done: None,
        }
    }

    fn frames(count: usize, clock: &'a ManualClock, spacing: Duration) -> Self {
        Self::new((0..count).map(|_| Read::Frame).collect(), clock, spacing)
    }

    fn with_fps(mut self, fps: f64) -> Self {
        self.fps = Some(fps);
        self
    }

    /// Raise `flag` as the last scripted read is handed out.
    fn stop_when_done(mut self, flag: Arc<AtomicBool>) -> Self {
        self.stop_when_done = Some(flag);
        self
    }
}

impl FrameSource for ScriptedSource<'_> {
    fn describe(&self) -> String {
        "scripted".to_string()
    }

    fn connect(&mut self) -> Result<()> {
        self.connects += 1;
        if self.refuse_connect {
            return Err(anyhow!("connection refused"));
        }
        Ok(())
    }

    fn next_frame(&mut self) -> Result<Option<Frame>> {
        self.clock.advance(self.spacing);
        let read = self.reads.pop_front();
        if self.reads.is_empty() {
            if let Some(flag) = &self.stop_when_done {
                flag.store(true, Ordering::SeqCst);
            }
        }
        match read {
            Some(Read::Frame) => {
                let frame = Frame::filled(4, 4, self.next_index, 0)?;
                self.next_index += 1;
                Ok(Some(frame))
            }
            Some(Read::Fail) => Err(anyhow!("camera dropped")),
            None => Ok(None),
        }
    }

    fn frame_rate(&self) -> Option<f64> {
        self.fps
    }

    fn stats(&self) -> SourceStats {
        SourceStats {
            frames_captured: self.next_index,
            source: self.describe(),
        }
    }
}

/// Reports `occupied` detections of class 1 per call and records frame indices.
struct RecordingDetector {
    seen: Arc<Mutex<Vec<u64>>>,
    occupied: usize,
    fail_on_call: Option<usize>,
}

impl RecordingDetector {
    fn new(occupied: usize) -> (Self, Arc<Mutex<Vec<u64>>>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let detector = Self {
            seen: Arc::clone(&seen),
            occupied,
            fail_on_call: None,
        };
        (detector, seen)
    }
}

impl DetectorBackend for RecordingDetector {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn detect(&mut self, frame: &Frame, confidence_threshold: f32) -> Result<DetectionResult> {
        let mut seen = self.seen.lock().unwrap();
        if self.fail_on_call == Some(seen.len()) {
            return Err(anyhow!("inference failed"));
        }
        seen.push(frame.index);
        assert_eq!(confidence_threshold, 0.5);
        let mut detections = vec![Detection::of_class(1, 0.9); self.occupied];
        detections.push(Detection::of_class(0, 0.9));
        Ok(DetectionResult::new(detections))
    }
}

type SinkLog = Arc<Mutex<Vec<(&'static str, OccupancySnapshot)>>>;

/// Appends every attempted push to a log shared by all sinks.
struct RecordingSink {
    name: &'static str,
    log: SinkLog,
    fail: bool,
}

impl SnapshotSink for RecordingSink {
    fn name(&self) -> &str {
        self.name
    }

    fn push(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        self.log.lock().unwrap().push((self.name, snapshot.clone()));
        if self.fail {
            return Err(anyhow!("{} is down", self.name));
        }
        Ok(())
    }
}

fn sinks(local_fails: bool, database_fails: bool) -> (Vec<Box<dyn SnapshotSink>>, SinkLog) {
    let log: SinkLog = Arc::new(Mutex::new(Vec::new()));
    let sinks: Vec<Box<dyn SnapshotSink>> = vec![
        Box::new(RecordingSink {
            name: "local",
            log: Arc::clone(&log),
            fail: local_fails,
        }),
        Box::new(RecordingSink {
            name: "database",
            log: Arc::clone(&log),
            fail: database_fails,
        }),
    ];
    (sinks, log)
}

fn settings(process_interval: Duration, max_snapshots: Option<u64>) -> MonitorSettings {
    MonitorSettings {
        restaurant_id: "demo-restaurant-123".to_string(),
        rule: OccupancyRule::new(3),
        confidence_threshold: 0.5,
        process_interval,
        reconnect_delay: Duration::from_secs(1),
        max_snapshots,
    }
}

fn pushes_to(log: &SinkLog, name: &str) -> Vec<OccupancySnapshot> {
    log.lock()
        .unwrap()
        .iter()
        .filter(|(sink, _)| *sink == name)
        .map(|(_, snapshot)| snapshot.clone())
        .collect()
}

// ----------------------------------------------------------------------------
// File path
// ----------------------------------------------------------------------------

#[test]
fn file_at_thirty_fps_processes_every_thirtieth_frame() -> Result<()> {
    let clock = ManualClock::new();
    let (detector, seen) = RecordingDetector::new(1);
    let (sinks, log) = sinks(false, false);
    let mut monitor = Monitor::new(Box::new(detector), sinks, settings(Duration::ZERO, None), &clock);
    let mut source =
        ScriptedSource::frames(100, &clock, Duration::from_millis(33)).with_fps(30.0);

    let summary = monitor.run_file(&mut source)?;

    assert_eq!(*seen.lock().unwrap(), vec![0, 30, 60, 90]);
    assert_eq!(summary.frames_read, 100);
    assert_eq!(summary.frames_processed, 4);
    assert_eq!(summary.stop, StopReason::EndOfInput);
    let rows = pushes_to(&log, "database");
    assert_eq!(rows.len(), 4);
    assert!(rows.iter().all(|row| (row.occupied, row.vacant, row.total) == (1, 2, 3)));
    Ok(())
}

#[test]
fn file_stops_at_first_failed_read() -> Result<()> {
    let clock = ManualClock::new();
    let (detector, seen) = RecordingDetector::new(0);
    let (sinks, _log) = sinks(false, false);
    let mut monitor = Monitor::new(Box::new(detector), sinks, settings(Duration::ZERO, None), &clock);
    let mut source = ScriptedSource::new(
        vec![Read::Frame, Read::Fail, Read::Frame],
        &clock,
        Duration::ZERO,
    )
    .with_fps(1.0);

    let summary = monitor.run_file(&mut source)?;

    assert_eq!(summary.stop, StopReason::EndOfInput);
    assert_eq!(summary.frames_read, 1);
    assert_eq!(*seen.lock().unwrap(), vec![0]);
    assert_eq!(summary.reconnects, 0);
    Ok(())
}

#[test]
fn unknown_frame_rate_processes_every_frame() -> Result<()> {
    let clock = ManualClock::new();
    let (detector, seen) = RecordingDetector::new(0);
    let mut monitor = Monitor::new(
        Box::new(detector),
        Vec::new(),
        settings(Duration::ZERO, None),
        &clock,
    );
    let mut source = ScriptedSource::frames(4, &clock, Duration::ZERO);

    monitor.run_file(&mut source)?;
    assert_eq!(*seen.lock().unwrap(), vec![0, 1, 2, 3]);
    Ok(())
}

#[test]
fn failing_database_does_not_stop_the_loop() -> Result<()> {
    let clock = ManualClock::new();
    let (detector, _seen) = RecordingDetector::new(2);
    let (sinks, log) = sinks(false, true);
    let mut monitor = Monitor::new(Box::new(detector), sinks, settings(Duration::ZERO, None), &clock);
    let mut source = ScriptedSource::frames(90, &clock, Duration::ZERO).with_fps(30.0);

    let summary = monitor.run_file(&mut source)?;

    assert_eq!(summary.stop, StopReason::EndOfInput);
    assert_eq!(summary.frames_processed, 3);
    assert_eq!(pushes_to(&log, "database").len(), 3);
    assert_eq!(pushes_to(&log, "local").len(), 3);
    Ok(())
}

#[test]
fn failing_local_sink_still_reaches_database() -> Result<()> {
    let clock = ManualClock::new();
    let (detector, _seen) = RecordingDetector::new(5);
    let (sinks, log) = sinks(true, false);
    let mut monitor = Monitor::new(Box::new(detector), sinks, settings(Duration::ZERO, None), &clock);
    let mut source = ScriptedSource::frames(3, &clock, Duration::ZERO).with_fps(1.0);

    monitor.run_file(&mut source)?;

    let order: Vec<&str> = log.lock().unwrap().iter().map(|(sink, _)| *sink).collect();
    assert_eq!(
        order,
        vec!["local", "database", "local", "database", "local", "database"]
    );
    let rows = pushes_to(&log, "database");
    assert_eq!(rows.len(), 3);
    assert!(rows.iter().all(|row| (row.occupied, row.vacant) == (3, 0)));
    Ok(())
}

#[test]
fn detector_failure_ends_the_run() {
    let clock = ManualClock::new();
    let (mut detector, seen) = RecordingDetector::new(1);
    detector.fail_on_call = Some(1);
    let (sinks, log) = sinks(false, false);
    let mut monitor = Monitor::new(Box::new(detector), sinks, settings(Duration::ZERO, None), &clock);
    let mut source = ScriptedSource::frames(5, &clock, Duration::ZERO).with_fps(1.0);

    let err = monitor.run_file(&mut source).expect_err("detector error must propagate");
    assert!(format!("{:#}", err).contains("inference failed"));
    assert_eq!(*seen.lock().unwrap(), vec![0]);
    assert_eq!(pushes_to(&log, "database").len(), 1);
}

// ----------------------------------------------------------------------------
// Stream path
// ----------------------------------------------------------------------------

#[test]
fn stream_snapshots_are_spaced_by_the_interval() -> Result<()> {
    let clock = ManualClock::new();
    let (detector, _seen) = RecordingDetector::new(1);
    let (sinks, log) = sinks(false, false);
    let interval = Duration::from_secs(3);
    let mut monitor = Monitor::new(Box::new(detector), sinks, settings(interval, Some(5)), &clock);
    let mut source = ScriptedSource::frames(1_000, &clock, Duration::from_millis(400));

    let summary = monitor.run_stream(&mut source)?;

    assert_eq!(summary.stop, StopReason::SnapshotLimit);
    assert_eq!(summary.frames_processed, 5);
    assert!(summary.frames_read > summary.frames_processed);

    let rows = pushes_to(&log, "database");
    assert_eq!(rows.len(), 5);
    let min_gap = chrono::Duration::from_std(interval)?;
    for pair in rows.windows(2) {
        assert!(pair[1].timestamp - pair[0].timestamp >= min_gap);
    }
    Ok(())
}

#[test]
fn stream_reconnects_after_failed_reads() -> Result<()> {
    let clock = ManualClock::new();
    let shutdown = Arc::new(AtomicBool::new(false));
    let (detector, seen) = RecordingDetector::new(1);
    let (sinks, _log) = sinks(false, false);
    let mut monitor = Monitor::new(Box::new(detector), sinks, settings(Duration::ZERO, None), &clock)
        .with_shutdown(Arc::clone(&shutdown));
    let mut source = ScriptedSource::new(
        vec![Read::Frame, Read::Fail, Read::Fail, Read::Frame],
        &clock,
        Duration::ZERO,
    )
    .stop_when_done(shutdown);

    let summary = monitor.run_stream(&mut source)?;

    assert_eq!(summary.stop, StopReason::Shutdown);
    assert_eq!(summary.reconnects, 2);
    assert_eq!(summary.frames_read, 2);
    assert_eq!(*seen.lock().unwrap(), vec![0, 1]);
    // Initial open plus one reopen per failed read.
    assert_eq!(source.connects, 3);
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
    Ok(())
}

#[test]
fn stream_open_failure_is_fatal() {
    let clock = ManualClock::new();
    let (detector, seen) = RecordingDetector::new(1);
    let mut monitor = Monitor::new(
        Box::new(detector),
        Vec::new(),
        settings(Duration::ZERO, None),
        &clock,
    );
    let mut source = ScriptedSource::frames(3, &clock, Duration::ZERO);
    source.refuse_connect = true;

    let err = monitor
        .run_stream(&mut source)
        .expect_err("open failure must be fatal");
    assert!(format!("{:#}", err).contains("connection refused"));
    assert!(seen.lock().unwrap().is_empty());
    assert_eq!(source.connects, 1);
}
