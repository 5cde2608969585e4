//! Snapshot sinks.
//!
//! Every processed frame yields one `OccupancySnapshot`, pushed in order to
//! each configured sink. Sinks are best-effort: a failed push is logged and
//! skipped, and never stops the next sink or the monitor loop.

mod local;
mod supabase;

use anyhow::Result;

use crate::config::{MonitorConfig, SupabaseCredentials};
use crate::occupancy::OccupancySnapshot;

pub use local::LocalHttpSink;
pub use supabase::SupabaseSink;

/// A destination for occupancy snapshots.
pub trait SnapshotSink {
    fn name(&self) -> &str;
    fn push(&mut self, snapshot: &OccupancySnapshot) -> Result<()>;
}

impl<S: SnapshotSink + ?Sized> SnapshotSink for Box<S> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn push(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        (**self).push(snapshot)
    }
}

/// Outcome of pushing one snapshot to every sink.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub attempted: usize,
    /// Names of the sinks whose push failed.
    pub failed: Vec<String>,
}

impl PublishReport {
    pub fn all_succeeded(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Push `snapshot` to every sink in order.
pub fn publish<S: SnapshotSink>(sinks: &mut [S], snapshot: &OccupancySnapshot) -> PublishReport {
    let mut report = PublishReport::default();
    for sink in sinks.iter_mut() {
        report.attempted += 1;
        if let Err(err) = sink.push(snapshot) {
            log::warn!("{} update failed: {:#}", sink.name(), err);
            report.failed.push(sink.name().to_string());
        }
    }
    report
}

/// Sinks for a deployment: the local endpoint (when enabled), then the database.
///
/// Fails only if the database sink cannot be initialised.
pub fn build_sinks(
    config: &MonitorConfig,
    credentials: &SupabaseCredentials,
) -> Result<Vec<Box<dyn SnapshotSink>>> {
    let mut sinks: Vec<Box<dyn SnapshotSink>> = Vec::new();
    if config.local_sink.enabled {
        sinks.push(Box::new(LocalHttpSink::new(
            config.local_sink.endpoint.clone(),
            config.local_sink.timeout,
        )));
    }
    sinks.push(Box::new(SupabaseSink::new(
        credentials,
        &config.database_table,
    )?));
    Ok(sinks)
}
