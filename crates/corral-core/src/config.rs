//! Pool configuration.
//!
//! A config file is TOML with the pool settings under a `[pool]` table:
//!
//! ```toml
//! [pool]
//! cap = 16
//! expiration_secs = 5
//! ```

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CorralError;
use crate::types::Result;

/// Idle time after which a worker is reclaimed when no expiration is configured.
pub const DEFAULT_EXPIRATION: Duration = Duration::from_secs(5);

/// Prefix for worker thread names; the worker id is appended.
pub const DEFAULT_THREAD_NAME: &str = "corral-worker";

/// Settings used to build a [`Pool`](crate::Pool).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Maximum number of workers running a task at once.
    #[serde(alias = "cap")]
    pub capacity: usize,
    /// Idle time after which a worker is reclaimed. Also the reaper period.
    #[serde(
        rename = "expiration_secs",
        with = "duration_secs",
        default = "default_expiration"
    )]
    pub expiration: Duration,
    /// Number of hand-off slots kept for reuse. `None` means `capacity`.
    #[serde(default)]
    pub worker_cache_size: Option<usize>,
    #[serde(default = "default_thread_name")]
    pub thread_name: String,
}

impl PoolConfig {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            expiration: DEFAULT_EXPIRATION,
            worker_cache_size: None,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    pub fn with_expiration(mut self, expiration: Duration) -> Self {
        self.expiration = expiration;
        self
    }

    pub fn with_thread_name(mut self, thread_name: impl Into<String>) -> Self {
        self.thread_name = thread_name.into();
        self
    }

    pub fn with_worker_cache_size(mut self, size: usize) -> Self {
        self.worker_cache_size = Some(size);
        self
    }

    /// Parses a config document and returns its `[pool]` section.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let file: ConfigFile = toml::from_str(source)?;
        Ok(file.pool)
    }

    /// Checks the invariants a pool relies on.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(CorralError::InvalidCapacity);
        }
        if self.expiration.is_zero() {
            return Err(CorralError::InvalidExpiration);
        }
        Ok(())
    }

    pub fn effective_cache_size(&self) -> usize {
        self.worker_cache_size.unwrap_or(self.capacity)
    }
}

#[derive(Debug, Deserialize)]
struct ConfigFile {
    pool: PoolConfig,
}

/// Loads the `[pool]` section of the TOML file at `path`.
pub fn load_config(path: impl AsRef<Path>) -> Result<PoolConfig> {
    let path = path.as_ref();
    let context = || format!("loading pool config from {}", path.display());
    let source = fs::read_to_string(path)
        .map_err(|error| CorralError::from(error).with_context(context()))?;
    PoolConfig::from_toml_str(&source).map_err(|error| error.with_context(context()))
}

fn default_expiration() -> Duration {
    DEFAULT_EXPIRATION
}

fn default_thread_name() -> String {
    DEFAULT_THREAD_NAME.to_string()
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
