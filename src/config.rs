use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::detect::BackendKind;
use crate::monitor::MonitorSettings;
use crate::occupancy::{OccupancyRule, OCCUPIED_CLASS_ID};

const DEFAULT_RESTAURANT_ID: &str = "demo-restaurant-123";
const DEFAULT_TOTAL_TABLES: u32 = 3;
const DEFAULT_MODEL_PATH: &str = "models/best.onnx";
const DEFAULT_INPUT_SIZE: u32 = 640;
const DEFAULT_CONFIDENCE: f32 = 0.5;
const DEFAULT_STREAM_URL: &str = "stub://front_camera";
const DEFAULT_PROCESS_INTERVAL_MS: u64 = 3_000;
const DEFAULT_RECONNECT_DELAY_MS: u64 = 1_000;
const DEFAULT_VIDEO_PATH: &str = "recordings/Test.mp4";
const DEFAULT_LOCAL_ENDPOINT: &str = "http://localhost:3000/api/occupancy/update";
const DEFAULT_LOCAL_TIMEOUT_MS: u64 = 1_000;
const DEFAULT_DATABASE_TABLE: &str = "table_occupancy";

#[derive(Debug, Deserialize, Default)]
struct MonitorConfigFile {
    restaurant_id: Option<String>,
    total_tables: Option<u32>,
    detector: Option<DetectorConfigFile>,
    stream: Option<StreamConfigFile>,
    video: Option<VideoConfigFile>,
    local_sink: Option<LocalSinkConfigFile>,
    database: Option<DatabaseConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct DetectorConfigFile {
    backend: Option<String>,
    model_path: Option<PathBuf>,
    input_size: Option<u32>,
    confidence: Option<f32>,
    occupied_class_id: Option<u32>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamConfigFile {
    url: Option<String>,
    process_interval_ms: Option<u64>,
    reconnect_delay_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct VideoConfigFile {
    path: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct LocalSinkConfigFile {
    enabled: Option<bool>,
    endpoint: Option<String>,
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct DatabaseConfigFile {
    table: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MonitorConfig {
    pub restaurant_id: String,
    pub total_tables: u32,
    pub detector: DetectorSettings,
    pub stream: StreamSettings,
    pub video_path: String,
    pub local_sink: LocalSinkSettings,
    pub database_table: String,
}

#[derive(Debug, Clone)]
pub struct DetectorSettings {
    pub backend: BackendKind,
    pub model_path: PathBuf,
    pub input_size: u32,
    pub confidence: f32,
    pub occupied_class_id: u32,
}

#[derive(Debug, Clone)]
pub struct StreamSettings {
    pub url: String,
    pub process_interval: Duration,
    pub reconnect_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct LocalSinkSettings {
    pub enabled: bool,
    pub endpoint: String,
    pub timeout: Duration,
}

impl MonitorConfig {
    /// Load from the file named by `OCCUPANCY_CONFIG` (if any), then environment overrides.
    pub fn load() -> Result<Self> {
        let config_path = non_empty_env("OCCUPANCY_CONFIG").map(PathBuf::from);
        Self::load_from(config_path.as_deref())
    }

    pub fn load_from(config_path: Option<&Path>) -> Result<Self> {
        let file_cfg = match config_path {
            Some(path) => Some(read_config_file(path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Parse a config document without consulting the environment.
    pub fn from_json(raw: &str) -> Result<Self> {
        let file: MonitorConfigFile =
            serde_json::from_str(raw).map_err(|e| anyhow!("invalid config: {}", e))?;
        let mut cfg = Self::from_file(file)?;
        cfg.validate()?;
        Ok(cfg)
    }

    fn from_file(file: MonitorConfigFile) -> Result<Self> {
        let detector_file = file.detector.unwrap_or_default();
        let backend = match detector_file.backend.as_deref() {
            Some(name) => name.parse()?,
            None => BackendKind::Tract,
        };
        let detector = DetectorSettings {
            backend,
            model_path: detector_file
                .model_path
                .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH)),
            input_size: detector_file.input_size.unwrap_or(DEFAULT_INPUT_SIZE),
            confidence: detector_file.confidence.unwrap_or(DEFAULT_CONFIDENCE),
            occupied_class_id: detector_file
                .occupied_class_id
                .unwrap_or(OCCUPIED_CLASS_ID),
        };

        let stream_file = file.stream.unwrap_or_default();
        let stream = StreamSettings {
            url: stream_file
                .url
                .unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
            process_interval: Duration::from_millis(
                stream_file
                    .process_interval_ms
                    .unwrap_or(DEFAULT_PROCESS_INTERVAL_MS),
            ),
            reconnect_delay: Duration::from_millis(
                stream_file
                    .reconnect_delay_ms
                    .unwrap_or(DEFAULT_RECONNECT_DELAY_MS),
            ),
        };

        let local_file = file.local_sink.unwrap_or_default();
        let local_sink = LocalSinkSettings {
            enabled: local_file.enabled.unwrap_or(true),
            endpoint: local_file
                .endpoint
                .unwrap_or_else(|| DEFAULT_LOCAL_ENDPOINT.to_string()),
            timeout: Duration::from_millis(
                local_file.timeout_ms.unwrap_or(DEFAULT_LOCAL_TIMEOUT_MS),
            ),
        };

        Ok(Self {
            restaurant_id: file
                .restaurant_id
                .unwrap_or_else(|| DEFAULT_RESTAURANT_ID.to_string()),
            total_tables: file.total_tables.unwrap_or(DEFAULT_TOTAL_TABLES),
            detector,
            stream,
            video_path: file
                .video
                .and_then(|video| video.path)
                .unwrap_or_else(|| DEFAULT_VIDEO_PATH.to_string()),
            local_sink,
            database_table: file
                .database
                .and_then(|database| database.table)
                .unwrap_or_else(|| DEFAULT_DATABASE_TABLE.to_string()),
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(id) = non_empty_env("OCCUPANCY_RESTAURANT_ID") {
            self.restaurant_id = id;
        }
        if let Some(total) = non_empty_env("OCCUPANCY_TOTAL_TABLES") {
            self.total_tables = total
                .parse()
                .map_err(|_| anyhow!("OCCUPANCY_TOTAL_TABLES must be a positive integer"))?;
        }
        if let Some(path) = non_empty_env("OCCUPANCY_MODEL_PATH") {
            self.detector.model_path = PathBuf::from(path);
        }
        if let Some(url) = non_empty_env("OCCUPANCY_STREAM_URL") {
            self.stream.url = url;
        }
        if let Some(path) = non_empty_env("OCCUPANCY_VIDEO_PATH") {
            self.video_path = path;
        }
        if let Some(endpoint) = non_empty_env("OCCUPANCY_LOCAL_ENDPOINT") {
            self.local_sink.endpoint = endpoint;
        }
        if let Some(interval) = non_empty_env("OCCUPANCY_PROCESS_INTERVAL_MS") {
            let millis: u64 = interval.parse().map_err(|_| {
                anyhow!("OCCUPANCY_PROCESS_INTERVAL_MS must be an integer number of milliseconds")
            })?;
            self.stream.process_interval = Duration::from_millis(millis);
        }
        if let Some(confidence) = non_empty_env("OCCUPANCY_CONFIDENCE") {
            self.detector.confidence = confidence
                .parse()
                .map_err(|_| anyhow!("OCCUPANCY_CONFIDENCE must be a number between 0 and 1"))?;
        }
        Ok(())
    }

    fn validate(&mut self) -> Result<()> {
        self.restaurant_id = self.restaurant_id.trim().to_string();
        if self.restaurant_id.is_empty() {
            return Err(anyhow!("restaurant_id must not be empty"));
        }
        if self.total_tables == 0 {
            return Err(anyhow!("total_tables must be at least 1"));
        }
        if !(0.0..=1.0).contains(&self.detector.confidence) {
            return Err(anyhow!(
                "confidence must be between 0 and 1 (got {})",
                self.detector.confidence
            ));
        }
        if self.detector.input_size == 0 {
            return Err(anyhow!("detector input_size must be greater than zero"));
        }
        if self.local_sink.timeout.is_zero() {
            return Err(anyhow!("local sink timeout must be greater than zero"));
        }
        if self.database_table.trim().is_empty() {
            return Err(anyhow!("database table must not be empty"));
        }
        Ok(())
    }

    /// Loop settings derived from this config.
    pub fn monitor_settings(&self) -> MonitorSettings {
        MonitorSettings {
            restaurant_id: self.restaurant_id.clone(),
            rule: OccupancyRule::new(self.total_tables)
                .with_occupied_class(self.detector.occupied_class_id),
            confidence_threshold: self.detector.confidence,
            process_interval: self.stream.process_interval,
            reconnect_delay: self.stream.reconnect_delay,
            max_snapshots: None,
        }
    }
}

/// Remote database credentials, read from the process environment.
#[derive(Clone)]
pub struct SupabaseCredentials {
    pub url: String,
    pub key: String,
}

impl SupabaseCredentials {
    pub fn from_env() -> Result<Self> {
        let url = non_empty_env("SUPABASE_URL");
        let key = non_empty_env("SUPABASE_KEY");
        match (url, key) {
            (Some(url), Some(key)) => Ok(Self { url, key }),
            _ => Err(anyhow!(
                "SUPABASE_URL and SUPABASE_KEY must be set in the environment or .env file"
            )),
        }
    }
}

impl fmt::Debug for SupabaseCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SupabaseCredentials")
            .field("url", &self.url)
            .field("key", &"<redacted>")
            .finish()
    }
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn read_config_file(path: &Path) -> Result<MonitorConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}
