//! Relay status events and control-plane domain events.

use serde::{Deserialize, Serialize};

use super::id::{Actor, ServerId, UserId};
use super::server::ServerStatus;

/// Container status change reported by a runner node's relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContainerStatus {
    Starting,
    Started,
    Stopping,
    Stopped,
    Exited,
    CouldNotStart,
    CouldNotStop,
}

/// Resource usage sample for a single container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ContainerStats {
    /// Cumulative cpu usage as reported by the engine.
    pub cpu: u64,
    /// Memory usage in bytes.
    pub ram: u64,
}

/// Payload of a status stream message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPayload {
    Change(ContainerStatus),
    Stats(ContainerStats),
}

/// One message of a runner node's status stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub server_id: ServerId,
    pub payload: StatusPayload,
}

impl StatusEvent {
    #[must_use]
    pub const fn change(server_id: ServerId, status: ContainerStatus) -> Self {
        Self {
            server_id,
            payload: StatusPayload::Change(status),
        }
    }

    #[must_use]
    pub const fn stats(server_id: ServerId, stats: ContainerStats) -> Self {
        Self {
            server_id,
            payload: StatusPayload::Stats(stats),
        }
    }
}

/// Events the control plane publishes to its consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// A persisted status change.
    StatusChanged {
        server_id: ServerId,
        owner_id: UserId,
        previous: ServerStatus,
        status: ServerStatus,
        producer: Actor,
    },
    /// The player count of a server was updated.
    PlayerCountUpdated {
        server_id: ServerId,
        player_count: u32,
        /// Status of the server at the time of the update.
        status: ServerStatus,
    },
    /// A resource sample arrived on a status stream.
    StatsSampled {
        server_id: ServerId,
        stats: ContainerStats,
    },
}

impl ServerEvent {
    /// The server this event is about.
    #[must_use]
    pub const fn server_id(&self) -> ServerId {
        match self {
            Self::StatusChanged { server_id, .. }
            | Self::PlayerCountUpdated { server_id, .. }
            | Self::StatsSampled { server_id, .. } => *server_id,
        }
    }
}
