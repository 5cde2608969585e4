//! Local HTTP sink: posts each snapshot to the on-site dashboard service.

use anyhow::{Context, Result};
use std::time::Duration;

use super::SnapshotSink;
use crate::occupancy::OccupancySnapshot;

pub struct LocalHttpSink {
    endpoint: String,
    agent: ureq::Agent,
}

impl LocalHttpSink {
    pub fn new(endpoint: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(timeout).build();
        Self { endpoint, agent }
    }
}

impl SnapshotSink for LocalHttpSink {
    fn name(&self) -> &str {
        "local"
    }

    /// The response is ignored: any HTTP status counts as delivered.
    /// Only connection failures and timeouts are errors.
    fn push(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        let body = serde_json::to_string(&snapshot.local_update())
            .context("serialize local occupancy update")?;
        let sent = self
            .agent
            .post(&self.endpoint)
            .set("Content-Type", "application/json")
            .send_string(&body);
        match sent {
            Ok(_) => log::debug!("local update sent to {}", self.endpoint),
            Err(ureq::Error::Status(code, _)) => {
                log::debug!("local endpoint {} answered {}", self.endpoint, code)
            }
            Err(err) => {
                return Err(anyhow::Error::new(err).context(format!("POST {}", self.endpoint)))
            }
        }
        Ok(())
    }
}
