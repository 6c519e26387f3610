//! Background maintenance: idle shutdown and archive sweeping.

use std::time::Duration;

use serde::Deserialize;

/// Idle shutdown watcher settings.
#[derive(Debug, Clone, Deserialize)]
pub struct IdleConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// How long an ONLINE server may sit with zero players (seconds).
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// Interval between expiry sweeps (seconds).
    #[serde(default = "default_idle_tick_secs")]
    pub tick_secs: u64,
}

fn default_true() -> bool {
    true
}

fn default_grace_secs() -> u64 {
    300
}

fn default_idle_tick_secs() -> u64 {
    10
}

impl IdleConfig {
    #[must_use]
    pub const fn grace(&self) -> Duration {
        Duration::from_secs(self.grace_secs)
    }

    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_secs(self.tick_secs)
    }
}

impl Default for IdleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_secs: default_grace_secs(),
            tick_secs: default_idle_tick_secs(),
        }
    }
}

/// Periodic archiving of long-offline servers.
#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default)]
    pub sweep_enabled: bool,
    #[serde(default = "default_archive_interval_secs")]
    pub interval_secs: u64,
    /// Servers archived per sweep.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
}

fn default_archive_interval_secs() -> u64 {
    300
}

fn default_batch_size() -> usize {
    10
}

impl ArchiveConfig {
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs)
    }
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            sweep_enabled: false,
            interval_secs: default_archive_interval_secs(),
            batch_size: default_batch_size(),
        }
    }
}
