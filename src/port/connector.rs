//! Channel factory port.
//!
//! A connector turns a node address into typed service handles. The
//! connection manager caches what it returns for the process lifetime.

use std::fmt;
use std::sync::Arc;

use super::container::ContainerService;
use super::storage::{ExtensionsService, FilesService};
use crate::domain::{NodeId, NodeRole};

/// Deterministic address of a node channel: `<role>-node-<id>`, lowercased.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChannelAddress {
    pub role: NodeRole,
    pub node: NodeId,
}

impl ChannelAddress {
    #[must_use]
    pub fn new(role: NodeRole, node: NodeId) -> Self {
        Self { role, node }
    }

    /// Host name the channel connects to.
    #[must_use]
    pub fn host(&self) -> String {
        format!("{}-node-{}", self.role, self.node).to_lowercase()
    }
}

impl fmt::Display for ChannelAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.host())
    }
}

/// Services reachable on a storage node channel.
#[derive(Clone)]
pub struct StorageChannel {
    pub files: Arc<dyn FilesService>,
    pub extensions: Arc<dyn ExtensionsService>,
}

/// Opens channels to worker nodes.
pub trait Connector: Send + Sync {
    /// Open a channel to a runner node's container service.
    fn runner(&self, address: &ChannelAddress) -> Arc<dyn ContainerService>;

    /// Open a channel to a storage node's services.
    fn storage(&self, address: &ChannelAddress) -> StorageChannel;
}
