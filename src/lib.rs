//! Table Occupancy Monitor
//!
//! This crate watches a restaurant floor through a camera (or a recorded
//! video), counts how many tables a pre-trained detector reports as occupied,
//! and pushes the counts to a local dashboard endpoint and a remote database.
//!
//! # Pipeline
//!
//! Everything runs in one synchronous loop:
//!
//! 1. **Ingest**: read the next frame from a live stream or a video file.
//! 2. **Sample**: streams are throttled by wall-clock interval, files by
//!    frame index (about one frame per second of footage).
//! 3. **Detect**: run the detector with a fixed confidence threshold.
//! 4. **Count**: occupied detections, clamped to the configured table total.
//! 5. **Publish**: best-effort writes to every sink; a failing sink is logged
//!    and skipped.
//!
//! # Module Structure
//!
//! - `frame`: decoded RGB frames
//! - `ingest`: frame sources (HTTP MJPEG, RTSP, local files, synthetic)
//! - `detect`: detector backends and YOLO post-processing
//! - `occupancy`: counting rule and snapshots
//! - `sampling`: stream throttle and file stride
//! - `sink`: local HTTP and remote database sinks
//! - `monitor`: the loop itself
//! - `config`: file + environment configuration

pub mod clock;
pub mod config;
pub mod detect;
pub mod frame;
pub mod ingest;
pub mod monitor;
pub mod occupancy;
pub mod sampling;
pub mod sink;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{MonitorConfig, SupabaseCredentials};
pub use detect::{
    load_backend, BackendKind, Detection, DetectionResult, DetectorBackend, StubBackend,
};
pub use frame::Frame;
pub use ingest::{FileConfig, FileSource, FrameSource, SourceStats, StreamConfig, StreamSource};
pub use monitor::{
    install_shutdown_handler, report_run, Monitor, MonitorSettings, RunSummary, StopReason,
};
pub use occupancy::{OccupancyRule, OccupancySnapshot, OCCUPIED_CLASS_ID};
pub use sampling::{FrameStride, IntervalThrottle};
pub use sink::{build_sinks, publish, LocalHttpSink, PublishReport, SnapshotSink, SupabaseSink};
