//! Node RPC transport configuration.

use std::time::Duration;

use serde::Deserialize;

use crate::domain::NodeRole;

/// How the control plane reaches runner and storage nodes.
#[derive(Debug, Clone, Deserialize)]
pub struct RpcConfig {
    /// `http` or `https`; WebSocket streams use the matching `ws`/`wss`.
    #[serde(default = "default_scheme")]
    pub scheme: String,
    #[serde(default = "default_port")]
    pub runner_port: u16,
    #[serde(default = "default_port")]
    pub storage_port: u16,
    /// Timeout for unary calls (milliseconds). Streams are not bounded.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
}

fn default_scheme() -> String {
    "http".into()
}

fn default_port() -> u16 {
    5000
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_connect_timeout_ms() -> u64 {
    3_000
}

impl RpcConfig {
    /// Port for channels of the given role.
    #[must_use]
    pub const fn port(&self, role: NodeRole) -> u16 {
        match role {
            NodeRole::Runner => self.runner_port,
            NodeRole::Storage => self.storage_port,
        }
    }

    #[must_use]
    pub const fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    #[must_use]
    pub const fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    /// WebSocket scheme matching the HTTP scheme.
    #[must_use]
    pub fn ws_scheme(&self) -> &'static str {
        if self.scheme == "https" {
            "wss"
        } else {
            "ws"
        }
    }
}

impl Default for RpcConfig {
    fn default() -> Self {
        Self {
            scheme: default_scheme(),
            runner_port: default_port(),
            storage_port: default_port(),
            request_timeout_ms: default_request_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
        }
    }
}
