//! Builders for domain primitives used across tests.

use chrono::Utc;

use crate::domain::{
    NodeId, NodeStats, Owner, Server, ServerId, ServerStatus, UserId, VersionRef, BYTES_PER_MB,
};

/// Storage node every [`server`] lives on.
pub const STORAGE_NODE: &str = "s1";

/// An OFFLINE, never started server on [`STORAGE_NODE`].
pub fn server(id: u64, owner: &str, ram_mb: u64) -> Server {
    let now = Utc::now();
    Server {
        id: ServerId::new(id),
        owner_id: UserId::new(owner),
        name: format!("server-{id}"),
        status: ServerStatus::Offline,
        ram_mb,
        slots: 20,
        runner_node_id: None,
        storage_node_id: NodeId::new(STORAGE_NODE),
        version: VersionRef {
            image: "games/paper:1.20".into(),
            start_command: "java -Xmx{ram}M -jar server.jar".into(),
        },
        player_count: 0,
        last_start: None,
        created_at: now,
        updated_at: now,
    }
}

/// A server in `status`, placed on `runner`.
pub fn placed(id: u64, owner: &str, ram_mb: u64, status: ServerStatus, runner: &str) -> Server {
    Server {
        status,
        runner_node_id: Some(NodeId::new(runner)),
        ..server(id, owner, ram_mb)
    }
}

pub fn owner(id: &str, ram_limit_mb: u64) -> Owner {
    Owner {
        id: UserId::new(id),
        display_name: format!("{id}-name"),
        ram_limit_mb,
    }
}

/// Node stats with `free_mb` free out of 16 GB.
pub fn node_stats(free_mb: u64) -> NodeStats {
    NodeStats {
        cpu_usage: 0,
        total_ram: 16_000 * BYTES_PER_MB,
        free_ram: free_mb * BYTES_PER_MB,
    }
}
