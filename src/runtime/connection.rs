//! RPC connection manager.
//!
//! Lazily opens one channel per node and role and caches it for the process
//! lifetime. There is no teardown.

use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::domain::{NodeId, NodeRole};
use crate::port::{
    ChannelAddress, Connector, ContainerService, ExtensionsService, FilesService, StorageChannel,
};

/// Cache of node channels, split by role.
pub struct RpcConnectionManager {
    connector: Arc<dyn Connector>,
    runners: DashMap<NodeId, Arc<dyn ContainerService>>,
    storages: DashMap<NodeId, StorageChannel>,
}

impl RpcConnectionManager {
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self {
            connector,
            runners: DashMap::new(),
            storages: DashMap::new(),
        }
    }

    /// Container service of a runner node.
    #[must_use]
    pub fn containers(&self, node: &NodeId) -> Arc<dyn ContainerService> {
        self.runners
            .entry(node.clone())
            .or_insert_with(|| {
                let address = ChannelAddress::new(NodeRole::Runner, node.clone());
                debug!(channel = %address, "Opening channel");
                self.connector.runner(&address)
            })
            .clone()
    }

    fn storage(&self, node: &NodeId) -> StorageChannel {
        self.storages
            .entry(node.clone())
            .or_insert_with(|| {
                let address = ChannelAddress::new(NodeRole::Storage, node.clone());
                debug!(channel = %address, "Opening channel");
                self.connector.storage(&address)
            })
            .clone()
    }

    /// Files service of a storage node.
    #[must_use]
    pub fn files(&self, node: &NodeId) -> Arc<dyn FilesService> {
        self.storage(node).files
    }

    /// Extensions service of a storage node.
    #[must_use]
    pub fn extensions(&self, node: &NodeId) -> Arc<dyn ExtensionsService> {
        self.storage(node).extensions
    }

    /// Number of open channels for `role`.
    #[must_use]
    pub fn open_channels(&self, role: NodeRole) -> usize {
        match role {
            NodeRole::Runner => self.runners.len(),
            NodeRole::Storage => self.storages.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::connector::StubConnector;

    #[test]
    fn channels_are_created_once_per_node_and_role() {
        let connector = Arc::new(StubConnector::new());
        let manager = RpcConnectionManager::new(connector.clone());
        let a = NodeId::new("a");

        let _ = manager.containers(&a);
        let _ = manager.containers(&a);
        let _ = manager.files(&a);
        let _ = manager.extensions(&a);

        assert_eq!(manager.open_channels(NodeRole::Runner), 1);
        assert_eq!(manager.open_channels(NodeRole::Storage), 1);
        assert_eq!(
            connector.opened(),
            vec!["runner-node-a".to_string(), "storage-node-a".to_string()]
        );
    }
}
