//! Notification adapters.
//!
//! Implements the `port::Notifier` trait for the built-in backends.

use tracing::{debug, info};

use crate::domain::ServerEvent;
use crate::port::Notifier;

/// A no-op notifier for tests or when notifications are disabled.
pub struct NullNotifier;

impl Notifier for NullNotifier {
    fn notify(&self, _event: &ServerEvent) {}

    fn name(&self) -> &'static str {
        "null"
    }
}

/// A logging notifier that logs events via tracing.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: &ServerEvent) {
        match event {
            ServerEvent::StatusChanged {
                server_id,
                owner_id,
                previous,
                status,
                producer,
            } => {
                info!(
                    server_id = %server_id,
                    owner = %owner_id,
                    from = %previous,
                    to = %status,
                    producer = %producer,
                    "Server status changed"
                );
            }
            ServerEvent::PlayerCountUpdated {
                server_id,
                player_count,
                status,
            } => {
                info!(
                    server_id = %server_id,
                    players = player_count,
                    status = %status,
                    "Player count updated"
                );
            }
            ServerEvent::StatsSampled { server_id, stats } => {
                debug!(
                    server_id = %server_id,
                    cpu = stats.cpu,
                    ram = stats.ram,
                    "Container stats"
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "log"
    }
}
