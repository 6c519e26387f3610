//! Static fleet inventory used to seed the in-memory store.

use serde::Deserialize;

use crate::domain::ServerStatus;

/// Nodes, owners and servers known at boot.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub runners: Vec<RunnerEntry>,
    #[serde(default)]
    pub owners: Vec<OwnerEntry>,
    #[serde(default)]
    pub servers: Vec<ServerEntry>,
}

/// A runner node and the storage nodes it is linked to.
#[derive(Debug, Clone, Deserialize)]
pub struct RunnerEntry {
    pub id: String,
    #[serde(default)]
    pub storage: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OwnerEntry {
    pub id: String,
    #[serde(default)]
    pub display_name: String,
    pub ram_limit_mb: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerEntry {
    pub id: u64,
    pub owner: String,
    #[serde(default)]
    pub name: String,
    pub ram_mb: u64,
    #[serde(default = "default_slots")]
    pub slots: u32,
    pub storage_node: String,
    #[serde(default)]
    pub runner_node: Option<String>,
    pub image: String,
    pub start_command: String,
    #[serde(default = "default_status")]
    pub status: ServerStatus,
}

fn default_slots() -> u32 {
    20
}

fn default_status() -> ServerStatus {
    ServerStatus::Offline
}

impl InventoryConfig {
    /// Every storage node referenced by a runner link.
    #[must_use]
    pub fn storage_nodes(&self) -> Vec<&str> {
        let mut nodes: Vec<&str> = self
            .runners
            .iter()
            .flat_map(|r| r.storage.iter().map(String::as_str))
            .collect();
        nodes.sort_unstable();
        nodes.dedup();
        nodes
    }
}
