use garde::Validate;
use serde::Deserialize;
use std::net::{AddrParseError, SocketAddr};
use std::time::Duration;

use crate::services::upscaler::ResampleFilter;
use crate::services::worker::WorkerSettings;

/// Where the task queue and task store live.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Redis list for the queue, Redis keys for results.
    #[default]
    Redis,
    /// Process-local queue and store; the server runs its own worker pool.
    Memory,
}

#[derive(Debug, Deserialize, Validate)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:5000"). Unused by worker processes.
    #[serde(default = "default_bind_addr")]
    #[garde(length(min = 1))]
    pub bind_addr: String,

    /// Prometheus scrape listener of worker processes. The server exposes `/metrics` itself.
    #[serde(default = "default_metrics_addr")]
    #[garde(length(min = 1))]
    pub metrics_addr: String,

    #[serde(default)]
    #[garde(skip)]
    pub backend: Backend,

    /// Redis connection string for the task queue
    #[serde(default = "default_redis_url")]
    #[garde(length(min = 1))]
    pub broker_url: String,

    /// Redis connection string for task results
    #[serde(default = "default_redis_url")]
    #[garde(length(min = 1))]
    pub result_backend_url: String,

    /// Upload size ceiling in bytes
    #[serde(default = "default_max_upload_bytes")]
    #[garde(range(min = 1))]
    pub max_upload_bytes: usize,

    /// How long a finished task's outcome stays retrievable
    #[serde(default = "default_result_ttl_secs")]
    #[garde(range(min = 1))]
    pub result_ttl_secs: u64,

    #[serde(default)]
    #[garde(skip)]
    pub upscale_filter: ResampleFilter,

    #[serde(default = "default_upscale_scale")]
    #[garde(range(min = 2, max = 8))]
    pub upscale_scale: u32,

    /// Names this worker's processing list; must be unique per worker process.
    #[serde(default = "default_worker_id")]
    #[garde(length(min = 1))]
    pub worker_id: String,

    #[serde(default = "default_worker_concurrency")]
    #[garde(range(min = 1, max = 64))]
    pub worker_concurrency: usize,

    #[serde(default = "default_poll_interval_ms")]
    #[garde(range(min = 10))]
    pub poll_interval_ms: u64,

    /// Processing deadline per task. Unset means no deadline.
    #[serde(default)]
    #[garde(range(min = 1))]
    pub task_timeout_secs: Option<u64>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:5000".to_string()
}

fn default_metrics_addr() -> String {
    "0.0.0.0:9091".to_string()
}

fn default_redis_url() -> String {
    "redis://localhost:6379/0".to_string()
}

fn default_max_upload_bytes() -> usize {
    16 * 1024 * 1024
}

fn default_result_ttl_secs() -> u64 {
    24 * 60 * 60
}

fn default_upscale_scale() -> u32 {
    2
}

fn default_worker_id() -> String {
    "worker-1".to_string()
}

fn default_worker_concurrency() -> usize {
    1
}

fn default_poll_interval_ms() -> u64 {
    1000
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_vars(std::env::vars())
    }

    /// Build from explicit key/value pairs (environment-style, upper case keys).
    pub fn from_vars<I>(vars: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let config: Self = envy::from_iter(vars)?;
        config.validate()?;
        Ok(config)
    }

    pub fn metrics_socket_addr(&self) -> Result<SocketAddr, AddrParseError> {
        self.metrics_addr.parse()
    }

    pub fn worker_settings(&self) -> WorkerSettings {
        WorkerSettings {
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            task_timeout: self.task_timeout_secs.map(Duration::from_secs),
            ..WorkerSettings::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read environment: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(#[from] garde::Report),
}
