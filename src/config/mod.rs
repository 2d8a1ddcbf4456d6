use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    /// Server bind address (e.g., "0.0.0.0:3000"). Ignored by worker processes.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Queue store (Redis) host
    #[serde(default = "default_redis_host")]
    pub redis_host: String,

    /// Queue store (Redis) port
    #[serde(default = "default_redis_port")]
    pub redis_port: u16,

    /// Directory rendered artifacts are written to
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Upper bound for navigation plus network idle, in milliseconds
    #[serde(default = "default_navigation_timeout_ms")]
    pub navigation_timeout_ms: u64,

    /// Upper bound for the `waitForEvent` readiness poll, in milliseconds
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    /// Delay after forcing hover states, in milliseconds
    #[serde(default = "default_hover_settle_ms")]
    pub hover_settle_ms: u64,

    /// Sleep between queue polls when idle, in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Claim lease length; a job whose lease lapses is requeued
    #[serde(default = "default_lease_ttl_ms")]
    pub lease_ttl_ms: u64,

    /// Chrome/Chromium executable. Auto-detected when unset.
    #[serde(default)]
    pub chrome_path: Option<PathBuf>,

    /// Run Chrome with its process sandbox. Containers running as root
    /// usually need this off.
    #[serde(default = "default_chrome_sandbox")]
    pub chrome_sandbox: bool,

    /// Address for the worker's own Prometheus scrape listener. Workers
    /// export no metrics when unset.
    #[serde(default)]
    pub worker_metrics_addr: Option<String>,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_redis_host() -> String {
    "127.0.0.1".to_string()
}

fn default_redis_port() -> u16 {
    6379
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_navigation_timeout_ms() -> u64 {
    30_000
}

fn default_ready_timeout_ms() -> u64 {
    5_000
}

fn default_hover_settle_ms() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_lease_ttl_ms() -> u64 {
    30_000
}

fn default_chrome_sandbox() -> bool {
    true
}

impl AppConfig {
    pub fn from_env() -> Result<Self, envy::Error> {
        dotenvy::dotenv().ok();
        envy::from_env()
    }

    /// Connection URL for the queue store.
    pub fn redis_url(&self) -> String {
        format!("redis://{}:{}/", self.redis_host, self.redis_port)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn lease_ttl(&self) -> Duration {
        Duration::from_millis(self.lease_ttl_ms)
    }
}
