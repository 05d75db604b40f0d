//! Synchronizer configuration.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{Result, SyncError};

/// Wait applied when no request timeout is configured.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60);

/// Default number of registry shards.
pub const DEFAULT_SHARDS: usize = 16;

/// Options supplied when constructing a synchronizer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SyncOptions {
    /// Ceiling on how long a single `lock_page` call may wait.
    pub max_wait: Duration,
    /// Number of registry shards; must be a power of two.
    pub shards: usize,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            max_wait: DEFAULT_MAX_WAIT,
            shards: DEFAULT_SHARDS,
        }
    }
}

impl SyncOptions {
    /// Options with the given wait ceiling and default sharding.
    pub fn new(max_wait: Duration) -> Self {
        Self {
            max_wait,
            ..Self::default()
        }
    }

    /// Sets the wait ceiling.
    pub fn max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Sets the registry shard count.
    pub fn shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    /// Rejects shard counts that are zero or not a power of two.
    pub fn validate(&self) -> Result<()> {
        if self.shards == 0 || !self.shards.is_power_of_two() {
            return Err(SyncError::Config(format!(
                "shards must be a non-zero power of two, got {}",
                self.shards
            )));
        }
        Ok(())
    }

    /// Parses options from TOML.
    ///
    /// ```toml
    /// max_wait_ms = 5000
    /// shards = 32
    /// ```
    ///
    /// Missing fields fall back to their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let raw: RawOptions = toml::from_str(text)?;
        let opts = raw.into_options();
        opts.validate()?;
        Ok(opts)
    }

    /// Reads and parses a TOML options file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&text)
    }

    /// Renders the options as TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        let raw = RawOptions {
            max_wait_ms: Some(u64::try_from(self.max_wait.as_millis()).unwrap_or(u64::MAX)),
            shards: Some(self.shards),
        };
        toml::to_string(&raw).map_err(|err| SyncError::Config(err.to_string()))
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawOptions {
    max_wait_ms: Option<u64>,
    shards: Option<usize>,
}

impl RawOptions {
    fn into_options(self) -> SyncOptions {
        let defaults = SyncOptions::default();
        SyncOptions {
            max_wait: self
                .max_wait_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.max_wait),
            shards: self.shards.unwrap_or(defaults.shards),
        }
    }
}
