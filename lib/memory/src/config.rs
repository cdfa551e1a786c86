//! Context store configuration.

use serde::Deserialize;
use std::time::Duration;

/// Context store configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    /// Idle time after which a context expires, in seconds.
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,

    /// Maximum number of stored contexts; unlimited when absent.
    #[serde(default)]
    pub max_entries: Option<usize>,

    /// Number of independently locked shards.
    #[serde(default = "default_shard_count")]
    pub shard_count: usize,

    /// Interval between background sweeps, in seconds.
    #[serde(default = "default_sweep_interval_seconds")]
    pub sweep_interval_seconds: u64,
}

fn default_ttl_seconds() -> u64 {
    600
}

fn default_shard_count() -> usize {
    16
}

fn default_sweep_interval_seconds() -> u64 {
    60
}

impl StoreConfig {
    /// Returns the TTL as a duration.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Returns the sweep interval as a duration.
    #[must_use]
    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            max_entries: None,
            shard_count: default_shard_count(),
            sweep_interval_seconds: default_sweep_interval_seconds(),
        }
    }
}
