//! Server entity and its lifecycle status graph.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::id::{NodeId, ServerId, UserId};

/// Persisted lifecycle status of a server.
///
/// The main chain is `OFFLINE → QUEUED → STARTING → ONLINE → STOPPING → OFFLINE`
/// with the archival side chain `OFFLINE → ARCHIVING → ARCHIVED → RESTORING → OFFLINE`.
/// See [`ServerStatus::can_transition_to`] for the full edge set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServerStatus {
    Offline,
    Queued,
    Starting,
    Online,
    Stopping,
    Archiving,
    Archived,
    Restoring,
}

impl ServerStatus {
    /// Statuses counted against an owner's ram budget.
    pub const RAM_CONSUMING: [Self; 2] = [Self::Online, Self::Starting];

    /// Statuses that imply a container should exist on the runner node.
    pub const ACTIVE: [Self; 3] = [Self::Online, Self::Starting, Self::Stopping];

    /// Whether `next` is a legal successor of `self`.
    ///
    /// Besides the happy path this admits the failure edges the relay can
    /// report: a container that could not start (`STARTING → OFFLINE`), a
    /// container that exited on its own (`ONLINE → OFFLINE`), a stop the
    /// engine refused (`STOPPING → ONLINE`) and a stop requested while the
    /// server was still starting (`STARTING → STOPPING`).
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        use ServerStatus::*;
        matches!(
            (self, next),
            (Offline, Queued)
                | (Offline, Starting)
                | (Offline, Archiving)
                | (Queued, Starting)
                | (Queued, Offline)
                | (Starting, Online)
                | (Starting, Stopping)
                | (Starting, Offline)
                | (Online, Stopping)
                | (Online, Offline)
                | (Stopping, Offline)
                | (Stopping, Online)
                | (Archiving, Archived)
                | (Archived, Restoring)
                | (Restoring, Offline)
        )
    }

    /// Stable upper-case name, as persisted.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "OFFLINE",
            Self::Queued => "QUEUED",
            Self::Starting => "STARTING",
            Self::Online => "ONLINE",
            Self::Stopping => "STOPPING",
            Self::Archiving => "ARCHIVING",
            Self::Archived => "ARCHIVED",
            Self::Restoring => "RESTORING",
        }
    }
}

impl fmt::Display for ServerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Container image and start command template a server runs with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRef {
    /// Container image reference.
    pub image: String,
    /// Start command; `{ram}` is replaced by the server's ram in MB.
    pub start_command: String,
}

impl VersionRef {
    /// Render the start command for a server with `ram_mb` of memory.
    #[must_use]
    pub fn render_start_command(&self, ram_mb: u64) -> String {
        render_start_command(&self.start_command, ram_mb)
    }
}

/// Replace every `{ram}` placeholder in `template` with `ram_mb`.
#[must_use]
pub fn render_start_command(template: &str, ram_mb: u64) -> String {
    template.replace("{ram}", &ram_mb.to_string())
}

/// Container (and host) name of a server: `<prefix>gameserver-<id>`.
#[must_use]
pub fn container_name(prefix: &str, id: ServerId) -> String {
    format!("{prefix}gameserver-{id}")
}

/// A hosted game server as persisted by the CRUD collaborators.
///
/// Only the lifecycle controller writes `status` and `runner_node_id`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Server {
    pub id: ServerId,
    pub owner_id: UserId,
    pub name: String,
    pub status: ServerStatus,
    /// Requested memory in MB.
    pub ram_mb: u64,
    pub slots: u32,
    /// Unset until the first start places the server on a runner node.
    pub runner_node_id: Option<NodeId>,
    pub storage_node_id: NodeId,
    pub version: VersionRef,
    pub player_count: u32,
    pub last_start: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// The owner of one or more servers, as far as admission control cares.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Owner {
    pub id: UserId,
    pub display_name: String,
    /// Total ram (MB) the owner may have in ONLINE or STARTING servers.
    pub ram_limit_mb: u64,
}

/// How a player count report is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "strategy", content = "count", rename_all = "lowercase")]
pub enum PlayerCountUpdate {
    Add(u32),
    Set(u32),
    Subtract(u32),
}

impl PlayerCountUpdate {
    /// Apply to `current`, never going below zero.
    #[must_use]
    pub const fn apply(self, current: u32) -> u32 {
        match self {
            Self::Add(n) => current.saturating_add(n),
            Self::Set(n) => n,
            Self::Subtract(n) => current.saturating_sub(n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn happy_path_edges_are_legal() {
        use ServerStatus::*;
        let chain = [Offline, Queued, Starting, Online, Stopping, Offline];
        for pair in chain.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
        let archive = [Offline, Archiving, Archived, Restoring, Offline];
        for pair in archive.windows(2) {
            assert!(pair[0].can_transition_to(pair[1]), "{} -> {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn forbidden_edges_are_rejected() {
        use ServerStatus::*;
        assert!(!Offline.can_transition_to(Online));
        assert!(!Online.can_transition_to(Archiving));
        assert!(!Archived.can_transition_to(Offline));
        assert!(!Archiving.can_transition_to(Offline));
        assert!(!Online.can_transition_to(Online));
    }

    #[test]
    fn status_serializes_upper_case() {
        let json = serde_json::to_string(&ServerStatus::Archiving).unwrap();
        assert_eq!(json, "\"ARCHIVING\"");
        assert_eq!(ServerStatus::Online.to_string(), "ONLINE");
    }

    #[test]
    fn start_command_placeholder() {
        let version = VersionRef {
            image: "games/paper:1.20".into(),
            start_command: "java -Xmx{ram}M -Xms{ram}M -jar server.jar".into(),
        };
        assert_eq!(
            version.render_start_command(2048),
            "java -Xmx2048M -Xms2048M -jar server.jar"
        );
    }

    #[test]
    fn player_count_never_negative() {
        assert_eq!(PlayerCountUpdate::Subtract(5).apply(3), 0);
        assert_eq!(PlayerCountUpdate::Add(2).apply(3), 5);
        assert_eq!(PlayerCountUpdate::Set(7).apply(3), 7);
    }
}
