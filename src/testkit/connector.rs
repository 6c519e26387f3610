//! [`Connector`] handing out test doubles per node.
//!
//! Nodes without a registered runner get an unreachable one; nodes without
//! registered storage get fresh in-memory services.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::domain::NodeId;
use crate::port::{ChannelAddress, Connector, ContainerService, StorageChannel};

use super::containers::ScriptedContainers;
use super::storage::memory_storage;

#[derive(Default)]
pub struct StubConnector {
    runners: HashMap<NodeId, Arc<dyn ContainerService>>,
    storages: HashMap<NodeId, StorageChannel>,
    opened: Mutex<Vec<String>>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_runner(mut self, node: &str, service: Arc<dyn ContainerService>) -> Self {
        self.runners.insert(NodeId::new(node), service);
        self
    }

    pub fn with_storage(mut self, node: &str, channel: StorageChannel) -> Self {
        self.storages.insert(NodeId::new(node), channel);
        self
    }

    /// Hosts of every channel opened so far, in order.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

impl Connector for StubConnector {
    fn runner(&self, address: &ChannelAddress) -> Arc<dyn ContainerService> {
        self.opened.lock().unwrap().push(address.host());
        self.runners
            .get(&address.node)
            .cloned()
            .unwrap_or_else(|| Arc::new(ScriptedContainers::unreachable()))
    }

    fn storage(&self, address: &ChannelAddress) -> StorageChannel {
        self.opened.lock().unwrap().push(address.host());
        self.storages
            .get(&address.node)
            .cloned()
            .unwrap_or_else(|| memory_storage().2)
    }
}
