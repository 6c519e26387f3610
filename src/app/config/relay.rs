use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::domain::NodeId;

/// Node-side relay settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Prepended to container names, e.g. `"staging-"`.
    #[serde(default)]
    pub container_prefix: String,

    /// Host memory kept free, in bytes. Unset means 10% of total host memory.
    #[serde(default)]
    pub ram_buffer_bytes: Option<u64>,

    /// Do not put a memory limit on containers.
    #[serde(default)]
    pub ignore_ram_limit: bool,

    /// Engine network containers join.
    #[serde(default)]
    pub network: Option<String>,

    /// Host directory holding each storage node's server folders.
    #[serde(default)]
    pub storage_paths: BTreeMap<NodeId, PathBuf>,

    /// Delay before re-subscribing to the engine event feed.
    #[serde(default = "default_feed_reconnect_delay_ms")]
    pub feed_reconnect_delay_ms: u64,

    /// Buffered status events per subscriber.
    #[serde(default = "default_subscriber_capacity")]
    pub subscriber_capacity: usize,
}

fn default_feed_reconnect_delay_ms() -> u64 {
    1000
}

fn default_subscriber_capacity() -> usize {
    256
}

impl RelayConfig {
    #[must_use]
    pub const fn feed_reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.feed_reconnect_delay_ms)
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            container_prefix: String::new(),
            ram_buffer_bytes: None,
            ignore_ram_limit: false,
            network: None,
            storage_paths: BTreeMap::new(),
            feed_reconnect_delay_ms: default_feed_reconnect_delay_ms(),
            subscriber_capacity: default_subscriber_capacity(),
        }
    }
}
