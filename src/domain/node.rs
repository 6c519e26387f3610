//! Worker node roles, node statistics and memory sizing rules.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::id::NodeId;

/// Bytes per MB as used for container memory limits.
pub const BYTES_PER_MB: u64 = 1_000_000;

/// Upper bound of the per-server memory buffer, in MB.
pub const DEFAULT_MEMORY_BUFFER_CAP_MB: u64 = 512;

/// Role a worker node plays in the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// Runs server containers.
    Runner,
    /// Holds server files.
    Storage,
}

impl NodeRole {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Runner => "runner",
            Self::Storage => "storage",
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource snapshot reported by a runner node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStats {
    pub cpu_usage: u64,
    /// Total host memory in bytes.
    pub total_ram: u64,
    /// Free host memory in bytes.
    pub free_ram: u64,
}

/// A runner node with the stats it reported during scheduling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeCandidate {
    pub node_id: NodeId,
    pub stats: NodeStats,
}

/// Memory buffer added on top of a server's requested ram:
/// `min(25% of ram, cap)`, in bytes.
#[must_use]
pub fn memory_buffer_bytes(ram_mb: u64, cap_mb: u64) -> u64 {
    let quarter = ram_mb.saturating_mul(BYTES_PER_MB) / 4;
    quarter.min(cap_mb.saturating_mul(BYTES_PER_MB))
}

/// Working memory for a container: requested ram plus the buffer, in bytes.
#[must_use]
pub fn working_memory_bytes(ram_mb: u64, cap_mb: u64) -> u64 {
    ram_mb
        .saturating_mul(BYTES_PER_MB)
        .saturating_add(memory_buffer_bytes(ram_mb, cap_mb))
}

/// Memory a runner host keeps in reserve: the configured value, or 10% of total.
#[must_use]
pub fn host_ram_reserve(configured: Option<u64>, total_ram: u64) -> u64 {
    configured.unwrap_or(total_ram / 10)
}
