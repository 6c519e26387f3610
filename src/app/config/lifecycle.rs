//! Lifecycle controller and readiness probe configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::DEFAULT_MEMORY_BUFFER_CAP_MB;

/// Lifecycle controller settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LifecycleConfig {
    /// Fixed delay before re-subscribing to a node's status stream (milliseconds).
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
    /// How long a started container has to answer the readiness probe (milliseconds).
    #[serde(default = "default_readiness_timeout_ms")]
    pub readiness_timeout_ms: u64,
    /// Port the game server listens on inside its container.
    #[serde(default = "default_game_port")]
    pub game_port: u16,
    /// Prefix for container names; also part of the probe hostname.
    #[serde(default)]
    pub container_prefix: String,
    /// Cap of the per-server memory buffer (MB).
    #[serde(default = "default_memory_buffer_cap_mb")]
    pub memory_buffer_cap_mb: u64,
    /// Capacity of the in-process event bus.
    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

fn default_reconnect_delay_ms() -> u64 {
    5_000
}

fn default_readiness_timeout_ms() -> u64 {
    120_000
}

fn default_game_port() -> u16 {
    25565
}

fn default_memory_buffer_cap_mb() -> u64 {
    DEFAULT_MEMORY_BUFFER_CAP_MB
}

fn default_event_capacity() -> usize {
    1024
}

impl LifecycleConfig {
    #[must_use]
    pub const fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    #[must_use]
    pub const fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }
}

impl Default for LifecycleConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_ms: default_reconnect_delay_ms(),
            readiness_timeout_ms: default_readiness_timeout_ms(),
            game_port: default_game_port(),
            container_prefix: String::new(),
            memory_buffer_cap_mb: default_memory_buffer_cap_mb(),
            event_capacity: default_event_capacity(),
        }
    }
}

/// Readiness probe settings.
#[derive(Debug, Clone, Deserialize)]
pub struct ProbeConfig {
    /// Interval between probe rounds (milliseconds).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Bound on a single connection attempt (milliseconds).
    #[serde(default = "default_socket_timeout_ms")]
    pub socket_timeout_ms: u64,
    /// Host name written into the handshake packet.
    #[serde(default = "default_handshake_host")]
    pub handshake_host: String,
    /// Protocol version written into the handshake packet.
    #[serde(default = "default_protocol_version")]
    pub protocol_version: i32,
}

fn default_tick_ms() -> u64 {
    1_000
}

fn default_socket_timeout_ms() -> u64 {
    600
}

fn default_handshake_host() -> String {
    "127.0.0.1".into()
}

fn default_protocol_version() -> i32 {
    -1
}

impl ProbeConfig {
    #[must_use]
    pub const fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }

    #[must_use]
    pub const fn socket_timeout(&self) -> Duration {
        Duration::from_millis(self.socket_timeout_ms)
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            socket_timeout_ms: default_socket_timeout_ms(),
            handshake_host: default_handshake_host(),
            protocol_version: default_protocol_version(),
        }
    }
}
