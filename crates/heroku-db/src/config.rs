//! Database configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::{DEFAULT_FLUSH_DELAY_SECS, DEFAULT_REVISION_CAPACITY, DEFAULT_REVISION_INTERVAL_SECS};

/// Host configuration key holding the remote cache connection string
pub const REDIS_URI_KEY: &str = "redis_uri";

/// Environment variable holding the remote cache connection string
pub const REDIS_URL_ENV: &str = "REDIS_URL";

/// Main database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DbConfig {
    /// Process/account identity; names the local file and the remote blob key
    pub identity: String,

    /// Directory holding `config-<identity>.json`
    pub data_dir: PathBuf,

    /// Explicit remote cache URI, checked before the host lookup
    pub redis_url: Option<String>,

    /// Debounce before a deferred remote flush, in seconds
    pub flush_delay_secs: u64,

    /// Minimum spacing between two revisions, in seconds
    pub revision_interval_secs: u64,

    /// Maximum number of revisions kept
    pub revision_capacity: usize,

    /// Channel that holds stored assets
    pub assets_channel: Option<i64>,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            identity: "0".to_string(),
            data_dir: PathBuf::from("."),
            redis_url: None,
            flush_delay_secs: DEFAULT_FLUSH_DELAY_SECS,
            revision_interval_secs: DEFAULT_REVISION_INTERVAL_SECS,
            revision_capacity: DEFAULT_REVISION_CAPACITY,
            assets_channel: None,
        }
    }
}

impl DbConfig {
    /// Create a configuration for the given identity
    pub fn new(identity: impl ToString) -> Self {
        Self {
            identity: identity.to_string(),
            ..Self::default()
        }
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.data_dir = dir.into();
        self
    }

    /// Set an explicit remote cache URI
    pub fn with_redis_url(mut self, url: impl Into<String>) -> Self {
        self.redis_url = Some(url.into());
        self
    }

    /// Set the remote flush debounce
    pub fn with_flush_delay_secs(mut self, secs: u64) -> Self {
        self.flush_delay_secs = secs;
        self
    }

    /// Set the spacing between revisions
    pub fn with_revision_interval_secs(mut self, secs: u64) -> Self {
        self.revision_interval_secs = secs;
        self
    }

    /// Set the revision log capacity
    pub fn with_revision_capacity(mut self, capacity: usize) -> Self {
        self.revision_capacity = capacity;
        self
    }

    /// Set the assets channel
    pub fn with_assets_channel(mut self, channel: i64) -> Self {
        self.assets_channel = Some(channel);
        self
    }

    /// Path of the local database file
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join(format!("config-{}.json", self.identity))
    }

    pub fn flush_delay(&self) -> Duration {
        Duration::from_secs(self.flush_delay_secs)
    }

    pub fn revision_interval(&self) -> Duration {
        Duration::from_secs(self.revision_interval_secs)
    }

    /// Load configuration from a file
    pub fn from_file(path: &str) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn to_file(&self, path: &str) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

/// Host-supplied configuration lookup
pub trait ConfigSource: Send + Sync {
    fn get_config_key(&self, name: &str) -> Option<String>;
}

/// A host without configuration
impl ConfigSource for () {
    fn get_config_key(&self, _name: &str) -> Option<String> {
        None
    }
}

impl<F> ConfigSource for F
where
    F: Fn(&str) -> Option<String> + Send + Sync,
{
    fn get_config_key(&self, name: &str) -> Option<String> {
        self(name)
    }
}

/// Layers process environment variables over another source.
///
/// `redis_uri` is answered from `REDIS_URL` when it is set and non-empty.
#[derive(Debug, Clone, Default)]
pub struct EnvConfig<S> {
    inner: S,
}

impl<S: ConfigSource> EnvConfig<S> {
    pub fn new(inner: S) -> Self {
        Self { inner }
    }
}

impl<S: ConfigSource> ConfigSource for EnvConfig<S> {
    fn get_config_key(&self, name: &str) -> Option<String> {
        let from_env = match name {
            REDIS_URI_KEY => std::env::var(REDIS_URL_ENV).ok(),
            _ => None,
        };
        from_env
            .filter(|v| !v.trim().is_empty())
            .or_else(|| self.inner.get_config_key(name))
    }
}
