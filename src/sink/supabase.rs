//! Remote database sink.
//!
//! Inserts one row per snapshot through the database's REST interface
//! (`POST {url}/rest/v1/{table}`). The write is synchronous and has no
//! timeout; a slow database stalls the loop until it answers.

use anyhow::{anyhow, Context, Result};
use url::Url;

use super::SnapshotSink;
use crate::config::SupabaseCredentials;
use crate::occupancy::OccupancySnapshot;

pub struct SupabaseSink {
    insert_url: String,
    key: String,
    agent: ureq::Agent,
}

impl SupabaseSink {
    /// Fails if the project URL is not an absolute http(s) URL or the table name is empty.
    pub fn new(credentials: &SupabaseCredentials, table: &str) -> Result<Self> {
        let base = Url::parse(credentials.url.trim())
            .with_context(|| format!("invalid SUPABASE_URL '{}'", credentials.url))?;
        if !matches!(base.scheme(), "http" | "https") {
            return Err(anyhow!(
                "SUPABASE_URL must use http or https (got '{}')",
                base.scheme()
            ));
        }
        let table = table.trim();
        if table.is_empty() {
            return Err(anyhow!("database table must not be empty"));
        }
        let insert_url = format!(
            "{}/rest/v1/{}",
            base.as_str().trim_end_matches('/'),
            table
        );
        Ok(Self {
            insert_url,
            key: credentials.key.clone(),
            agent: ureq::AgentBuilder::new().build(),
        })
    }

    pub fn insert_url(&self) -> &str {
        &self.insert_url
    }
}

impl SnapshotSink for SupabaseSink {
    fn name(&self) -> &str {
        "database"
    }

    fn push(&mut self, snapshot: &OccupancySnapshot) -> Result<()> {
        let body = serde_json::to_string(&snapshot.database_row())
            .context("serialize occupancy row")?;
        self.agent
            .post(&self.insert_url)
            .set("apikey", &self.key)
            .set("Authorization", &format!("Bearer {}", self.key))
            .set("Content-Type", "application/json")
            .set("Prefer", "return=minimal")
            .send_string(&body)
            .context("insert occupancy row")?;
        log::debug!("database row inserted for {}", snapshot.restaurant_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(url: &str) -> SupabaseCredentials {
        SupabaseCredentials {
            url: url.to_string(),
            key: "anon-key".to_string(),
        }
    }

    #[test]
    fn builds_rest_insert_url() -> Result<()> {
        let sink = SupabaseSink::new(&credentials("https://abc.supabase.co/"), "table_occupancy")?;
        assert_eq!(
            sink.insert_url(),
            "https://abc.supabase.co/rest/v1/table_occupancy"
        );
        Ok(())
    }

    #[test]
    fn rejects_unusable_project_urls() {
        assert!(SupabaseSink::new(&credentials("not a url"), "t").is_err());
        assert!(SupabaseSink::new(&credentials("ftp://abc.supabase.co"), "t").is_err());
        assert!(SupabaseSink::new(&credentials("https://abc.supabase.co"), " ").is_err());
    }
}
