//! Thread-safe in-memory server store.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;

use crate::app::config::InventoryConfig;
use crate::domain::{
    NodeId, Owner, Server, ServerId, ServerStatus, UserId, VersionRef,
};
use crate::error::{Error, Result};
use crate::port::ServerStore;

#[derive(Default)]
struct Tables {
    servers: BTreeMap<ServerId, Server>,
    owners: HashMap<UserId, Owner>,
    /// runner node -> linked storage nodes
    links: BTreeMap<NodeId, BTreeSet<NodeId>>,
}

/// [`ServerStore`] backed by process memory.
///
/// Used by the standalone binary (seeded from the inventory section of the
/// config) and by tests.
#[derive(Default)]
pub struct MemoryStore {
    tables: RwLock<Tables>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store from the configured inventory.
    #[must_use]
    pub fn from_inventory(inventory: &InventoryConfig) -> Self {
        let store = Self::new();
        for runner in &inventory.runners {
            store.add_runner(NodeId::new(&runner.id));
            for storage in &runner.storage {
                store.link(NodeId::new(&runner.id), NodeId::new(storage));
            }
        }
        for owner in &inventory.owners {
            store.insert_owner(Owner {
                id: UserId::new(&owner.id),
                display_name: owner.display_name.clone(),
                ram_limit_mb: owner.ram_limit_mb,
            });
        }
        let now = Utc::now();
        for entry in &inventory.servers {
            store.insert_server(Server {
                id: ServerId::new(entry.id),
                owner_id: UserId::new(&entry.owner),
                name: entry.name.clone(),
                status: entry.status,
                ram_mb: entry.ram_mb,
                slots: entry.slots,
                runner_node_id: entry.runner_node.as_deref().map(NodeId::new),
                storage_node_id: NodeId::new(&entry.storage_node),
                version: VersionRef {
                    image: entry.image.clone(),
                    start_command: entry.start_command.clone(),
                },
                player_count: 0,
                last_start: None,
                created_at: now,
                updated_at: now,
            });
        }
        store
    }

    pub fn insert_server(&self, server: Server) {
        self.tables.write().servers.insert(server.id, server);
    }

    pub fn insert_owner(&self, owner: Owner) {
        self.tables.write().owners.insert(owner.id.clone(), owner);
    }

    /// Register a runner node without any storage link.
    pub fn add_runner(&self, runner: NodeId) {
        self.tables.write().links.entry(runner).or_default();
    }

    /// Link a runner node to a storage node.
    pub fn link(&self, runner: NodeId, storage: NodeId) {
        self.tables
            .write()
            .links
            .entry(runner)
            .or_default()
            .insert(storage);
    }

    /// Snapshot of a server, if present.
    #[must_use]
    pub fn get(&self, id: ServerId) -> Option<Server> {
        self.tables.read().servers.get(&id).cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tables.read().servers.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ServerStore for MemoryStore {
    async fn server(&self, id: ServerId) -> Result<Server> {
        self.get(id).ok_or(Error::ServerNotFound(id))
    }

    async fn save_server(&self, server: &Server) -> Result<()> {
        let mut tables = self.tables.write();
        if !tables.servers.contains_key(&server.id) {
            return Err(Error::ServerNotFound(server.id));
        }
        let mut server = server.clone();
        server.updated_at = Utc::now();
        tables.servers.insert(server.id, server);
        Ok(())
    }

    async fn servers_with_status(&self, statuses: &[ServerStatus]) -> Result<Vec<Server>> {
        Ok(self
            .tables
            .read()
            .servers
            .values()
            .filter(|s| statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    async fn owner_servers_with_status(
        &self,
        owner: &UserId,
        statuses: &[ServerStatus],
    ) -> Result<Vec<Server>> {
        Ok(self
            .tables
            .read()
            .servers
            .values()
            .filter(|s| &s.owner_id == owner && statuses.contains(&s.status))
            .cloned()
            .collect())
    }

    async fn assign_runner_node(&self, id: ServerId, node: &NodeId) -> Result<()> {
        let mut tables = self.tables.write();
        let server = tables.servers.get_mut(&id).ok_or(Error::ServerNotFound(id))?;
        server.runner_node_id = Some(node.clone());
        server.updated_at = Utc::now();
        Ok(())
    }

    async fn runner_nodes(&self) -> Result<Vec<NodeId>> {
        Ok(self.tables.read().links.keys().cloned().collect())
    }

    async fn runner_nodes_for_storage(&self, storage_node: &NodeId) -> Result<Vec<NodeId>> {
        Ok(self
            .tables
            .read()
            .links
            .iter()
            .filter(|(_, storage)| storage.contains(storage_node))
            .map(|(runner, _)| runner.clone())
            .collect())
    }

    async fn owner(&self, id: &UserId) -> Result<Owner> {
        self.tables
            .read()
            .owners
            .get(id)
            .cloned()
            .ok_or_else(|| Error::OwnerNotFound(id.clone()))
    }
}
