//! cfgridd.toml configuration parser.
//!
//! Every section is optional; missing values fall back to the defaults
//! below. Command-line flags override whatever the file sets.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use cfgrid_state::group_store::DEFAULT_MAX_CAS_RETRIES;

pub const DEFAULT_PORT: u16 = 8000;
pub const DEFAULT_DATA_DIR: &str = "/var/lib/cfgrid";
pub const DEFAULT_LOG_FILTER: &str = "info,cfgridd=debug,cfgrid=debug";
pub const DEFAULT_RATE_LIMIT_PERIOD_MS: u64 = 6000;
pub const DEFAULT_RATE_LIMIT_BURST: u32 = 10;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    pub server: ServerConfig,
    pub store: StoreConfig,
    pub idempotency: IdempotencyConfig,
    pub rate_limit: RateLimitConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: DEFAULT_PORT }
    }
}

/// Which KV backend the stores run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// redb file under `data_dir`.
    Redb,
    /// In-memory redb; state is lost on exit.
    Memory,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub backend: Backend,
    pub data_dir: PathBuf,
    pub max_cas_retries: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Redb,
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            max_cas_retries: DEFAULT_MAX_CAS_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct IdempotencyConfig {
    /// Marker lifetime in seconds. Unset means markers never expire.
    pub ttl_secs: Option<u64>,
}

impl IdempotencyConfig {
    pub fn ttl(&self) -> Option<Duration> {
        self.ttl_secs.map(Duration::from_secs)
    }
}

/// One shared token bucket over every API route.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Milliseconds to refill one token.
    pub period_ms: u64,
    /// Tokens available at once.
    pub burst: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            period_ms: DEFAULT_RATE_LIMIT_PERIOD_MS,
            burst: DEFAULT_RATE_LIMIT_BURST,
        }
    }
}

impl RateLimitConfig {
    pub fn period(&self) -> Duration {
        Duration::from_millis(self.period_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: DEFAULT_LOG_FILTER.to_string(),
            format: LogFormat::Text,
        }
    }
}

impl DaemonConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: DaemonConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Path of the redb file inside the data directory.
    pub fn db_path(&self) -> PathBuf {
        self.store.data_dir.join("cfgrid.redb")
    }
}
