//! Canonical test configurations.
//!
//! Single source of truth for config structs used across tests.

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::app::config::{LifecycleConfig, ProbeConfig, RelayConfig};
use crate::domain::NodeId;

/// Lifecycle config with short delays and a 5 second readiness deadline.
pub fn lifecycle() -> LifecycleConfig {
    LifecycleConfig {
        reconnect_delay_ms: 50,
        readiness_timeout_ms: 5_000,
        event_capacity: 256,
        ..LifecycleConfig::default()
    }
}

/// Probe config with a 10ms tick and a 200ms socket timeout.
pub fn probe() -> ProbeConfig {
    ProbeConfig {
        tick_ms: 10,
        socket_timeout_ms: 200,
        ..ProbeConfig::default()
    }
}

/// Relay config mapping storage node `s1` to `/srv/s1`, with no host reserve.
pub fn relay() -> RelayConfig {
    RelayConfig {
        ram_buffer_bytes: Some(0),
        storage_paths: BTreeMap::from([(NodeId::new("s1"), PathBuf::from("/srv/s1"))]),
        feed_reconnect_delay_ms: 10,
        ..RelayConfig::default()
    }
}
