//! Construction settings for stores and the lock registry.
//!
//! All settings deserialize with defaults filled in, so a runtime can embed
//! them in its own settings file and only spell out what it overrides.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::key::KeyNormalizer;

/// Settings shared by `ConcurrentStore` and `OrderedMap`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub case_sensitive: bool,
    /// Capacity hint spread over all shards.
    pub initial_capacity: usize,
    /// Shard count; rounded up to a power of two. `0` picks one from the
    /// available parallelism.
    pub shards: usize,
}

impl StoreConfig {
    /// General-purpose store: case-sensitive.
    pub fn case_sensitive() -> Self {
        Self::default()
    }

    /// Record-typed variables: case-insensitive.
    pub fn record() -> Self {
        Self {
            case_sensitive: false,
            ..Self::default()
        }
    }

    pub fn with_capacity(mut self, initial_capacity: usize) -> Self {
        self.initial_capacity = initial_capacity;
        self
    }

    pub fn with_shards(mut self, shards: usize) -> Self {
        self.shards = shards;
        self
    }

    pub fn normalizer(&self) -> KeyNormalizer {
        KeyNormalizer::from_case_sensitive(self.case_sensitive)
    }

    pub(crate) fn shard_count(&self) -> usize {
        let wanted = if self.shards == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get() * 4)
                .unwrap_or(16)
        } else {
            self.shards
        };
        wanted.clamp(1, 1 << 16).next_power_of_two()
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            case_sensitive: true,
            initial_capacity: 0,
            shards: 0,
        }
    }
}

/// Settings for `IdleStore`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdleConfig {
    /// Nominal idle timeout. Entries survive between one and two sweep
    /// periods after their last access.
    pub timeout_seconds: u32,
    pub case_sensitive: bool,
}

impl IdleConfig {
    pub fn new(timeout_seconds: u32) -> Self {
        Self {
            timeout_seconds,
            ..Self::default()
        }
    }

    /// Sweep period: the timeout truncated to whole minutes, at least one.
    pub fn sweep_period(&self) -> Duration {
        let minutes = (self.timeout_seconds / 60).max(1);
        Duration::from_secs(u64::from(minutes) * 60)
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 600,
            case_sensitive: true,
        }
    }
}

/// Settings for `LockRegistry` and the acquisition poll loop.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockConfig {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub case_sensitive_names: bool,
    /// How often the registry retires free locks.
    pub sweep_minutes: u32,
}

impl LockConfig {
    pub fn initial_backoff(&self) -> Duration {
        Duration::from_millis(self.initial_backoff_ms.max(1))
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms.max(self.initial_backoff_ms).max(1))
    }

    pub fn sweep_period(&self) -> Duration {
        Duration::from_secs(u64::from(self.sweep_minutes.max(1)) * 60)
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 1,
            max_backoff_ms: 128,
            case_sensitive_names: false,
            sweep_minutes: 1,
        }
    }
}
