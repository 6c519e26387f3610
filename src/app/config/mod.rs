//! Application configuration loading and validation.
//!
//! Configuration is loaded from a TOML file with environment variable
//! overrides for deployment-specific values like the container prefix.

use serde::Deserialize;
use std::path::Path;

use crate::error::{ConfigError, Result};

mod inventory;
mod lifecycle;
mod logging;
mod maintenance;
mod relay;
mod rpc;

pub use inventory::{InventoryConfig, OwnerEntry, RunnerEntry, ServerEntry};
pub use lifecycle::{LifecycleConfig, ProbeConfig};
pub use logging::{LoggingConfig, LOG_FORMATS};
pub use maintenance::{ArchiveConfig, IdleConfig};
pub use relay::RelayConfig;
pub use rpc::RpcConfig;

/// Overrides `lifecycle.container_prefix`.
pub const ENV_CONTAINER_PREFIX: &str = "HOSTPLANE_CONTAINER_PREFIX";
/// Overrides `probe.socket_timeout_ms`.
pub const ENV_PROBE_SOCKET_TIMEOUT_MS: &str = "HOSTPLANE_PROBE_SOCKET_TIMEOUT_MS";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub rpc: RpcConfig,
    #[serde(default)]
    pub lifecycle: LifecycleConfig,
    #[serde(default)]
    pub probe: ProbeConfig,
    #[serde(default)]
    pub idle: IdleConfig,
    #[serde(default)]
    pub archive: ArchiveConfig,
    #[serde(default)]
    pub relay: RelayConfig,
    #[serde(default)]
    pub inventory: InventoryConfig,
}

impl Config {
    #[allow(clippy::result_large_err)]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(ConfigError::ReadFile)?;
        Self::parse(&content)
    }

    /// Parse from TOML text, apply environment overrides and validate.
    #[allow(clippy::result_large_err)]
    pub fn parse(content: &str) -> Result<Self> {
        let mut config: Self = toml::from_str(content).map_err(ConfigError::Parse)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    #[allow(clippy::result_large_err)]
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(prefix) = std::env::var(ENV_CONTAINER_PREFIX) {
            self.lifecycle.container_prefix = prefix;
        }
        if let Ok(raw) = std::env::var(ENV_PROBE_SOCKET_TIMEOUT_MS) {
            self.probe.socket_timeout_ms =
                raw.trim().parse().map_err(|_| ConfigError::InvalidValue {
                    field: "probe.socket_timeout_ms",
                    reason: format!("{ENV_PROBE_SOCKET_TIMEOUT_MS}={raw} is not a number"),
                })?;
        }
        Ok(())
    }

    #[allow(clippy::result_large_err)]
    pub fn validate(&self) -> Result<()> {
        if !LOG_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(ConfigError::InvalidValue {
                field: "logging.format",
                reason: format!("expected one of {LOG_FORMATS:?}"),
            }
            .into());
        }
        if !matches!(self.rpc.scheme.as_str(), "http" | "https") {
            return Err(ConfigError::InvalidValue {
                field: "rpc.scheme",
                reason: "expected http or https".into(),
            }
            .into());
        }
        non_zero("rpc.runner_port", u64::from(self.rpc.runner_port))?;
        non_zero("rpc.storage_port", u64::from(self.rpc.storage_port))?;
        non_zero("lifecycle.game_port", u64::from(self.lifecycle.game_port))?;
        non_zero("lifecycle.event_capacity", self.lifecycle.event_capacity as u64)?;
        non_zero("probe.tick_ms", self.probe.tick_ms)?;
        non_zero("probe.socket_timeout_ms", self.probe.socket_timeout_ms)?;
        non_zero("idle.tick_secs", self.idle.tick_secs)?;
        non_zero("archive.interval_secs", self.archive.interval_secs)?;
        non_zero("relay.subscriber_capacity", self.relay.subscriber_capacity as u64)?;

        if self.probe.handshake_host.is_empty() {
            return Err(ConfigError::MissingField {
                field: "probe.handshake_host",
            }
            .into());
        }
        Ok(())
    }

    /// Initialize logging with the configured settings.
    pub fn init_logging(&self) {
        self.logging.init();
    }
}

#[allow(clippy::result_large_err)]
fn non_zero(field: &'static str, value: u64) -> Result<()> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: "must be greater than zero".into(),
        }
        .into());
    }
    Ok(())
}
