use anyhow::Result;
use serde::Deserialize;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub room: RoomConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoomConfig {
    /// Admission ceiling for the shared session (2 for this deployment)
    pub max_participants: usize,

    /// Minimum gap between broadcasts of a high-frequency event class
    pub broadcast_throttle_ms: u64,

    /// How long an unanswered call stays pending before expiring
    pub call_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    /// Directory holding uploaded media assets
    pub media_dir: String,

    /// Aggregate storage cap across all assets
    pub max_total_bytes: u64,

    /// Per-file upload cap
    pub max_file_bytes: u64,

    /// Assets older than this are evicted by the retention sweeper
    pub retention_hours: u64,

    /// How often the retention sweeper runs
    pub sweep_interval_secs: u64,
}

impl RoomConfig {
    pub fn broadcast_throttle(&self) -> Duration {
        Duration::from_millis(self.broadcast_throttle_ms)
    }

    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs)
    }
}

impl StorageConfig {
    pub fn retention_age(&self) -> chrono::Duration {
        chrono::Duration::hours(self.retention_hours as i64)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
