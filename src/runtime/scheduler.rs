//! Node scheduler.
//!
//! Decides which runner node serves a server and remembers the answer in a
//! process-local cache. Storage node lookups are cached the same way.

use std::collections::HashMap;
use std::sync::Arc;

use futures_util::future::join_all;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::connection::RpcConnectionManager;
use crate::domain::{NodeCandidate, NodeId, ServerId};
use crate::error::{Error, Result};
use crate::port::ServerStore;

/// Cached placement of one server.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NodeAssignment {
    pub runner: Option<NodeId>,
    pub storage: Option<NodeId>,
}

/// Pick the runner node among reachable candidates.
///
/// Candidates are sorted ascending by free memory and the first one wins,
/// which packs servers onto the fullest reachable node.
#[must_use]
pub fn pick_candidate(mut candidates: Vec<NodeCandidate>) -> Option<NodeId> {
    candidates.sort_by_key(|c| c.stats.free_ram);
    candidates.into_iter().next().map(|c| c.node_id)
}

pub struct NodeScheduler {
    store: Arc<dyn ServerStore>,
    connections: Arc<RpcConnectionManager>,
    cache: Mutex<HashMap<ServerId, NodeAssignment>>,
}

impl NodeScheduler {
    #[must_use]
    pub fn new(store: Arc<dyn ServerStore>, connections: Arc<RpcConnectionManager>) -> Self {
        Self {
            store,
            connections,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Storage node holding the server's files.
    pub async fn resolve_storage_node(&self, server_id: ServerId) -> Result<NodeId> {
        if let Some(node) = self.cached(server_id).storage {
            return Ok(node);
        }
        let server = self.store.server(server_id).await?;
        self.cache
            .lock()
            .entry(server_id)
            .or_default()
            .storage = Some(server.storage_node_id.clone());
        Ok(server.storage_node_id)
    }

    /// Runner node serving the server.
    ///
    /// Uses the cache, then the persisted placement, and only then selects a
    /// new node. `force_new` skips both and always selects.
    pub async fn resolve_runner_node(&self, server_id: ServerId, force_new: bool) -> Result<NodeId> {
        if !force_new {
            if let Some(node) = self.cached(server_id).runner {
                return Ok(node);
            }
        }

        let server = self.store.server(server_id).await?;
        let node = match server.runner_node_id {
            Some(node) if !force_new => node,
            _ => {
                let node = self.select_runner(&server.storage_node_id).await?;
                self.store.assign_runner_node(server_id, &node).await?;
                info!(server_id = %server_id, node = %node, "Assigned runner node");
                node
            }
        };

        let mut cache = self.cache.lock();
        let entry = cache.entry(server_id).or_default();
        entry.runner = Some(node.clone());
        entry.storage = Some(server.storage_node_id);
        Ok(node)
    }

    /// Record that the server runs on `node`, persisting the placement if it changed.
    pub async fn pin_runner_node(&self, server_id: ServerId, node: &NodeId) -> Result<()> {
        let server = self.store.server(server_id).await?;
        if server.runner_node_id.as_ref() != Some(node) {
            self.store.assign_runner_node(server_id, node).await?;
            info!(server_id = %server_id, node = %node, "Pinned runner node");
        }
        self.cache.lock().entry(server_id).or_default().runner = Some(node.clone());
        Ok(())
    }

    /// Cached placement, empty if nothing was resolved yet.
    #[must_use]
    pub fn cached(&self, server_id: ServerId) -> NodeAssignment {
        self.cache
            .lock()
            .get(&server_id)
            .cloned()
            .unwrap_or_default()
    }

    async fn select_runner(&self, storage_node: &NodeId) -> Result<NodeId> {
        let linked = self.store.runner_nodes_for_storage(storage_node).await?;
        if linked.is_empty() {
            warn!(storage_node = %storage_node, "No runner node linked to storage node");
            return Err(Error::NoNodeAvailable {
                storage_node: storage_node.clone(),
            });
        }

        let queries = linked.into_iter().map(|node_id| async move {
            let result = self.connections.containers(&node_id).node_stats().await;
            (node_id, result)
        });

        let mut candidates = Vec::new();
        for (node_id, result) in join_all(queries).await {
            match result {
                Ok(stats) => {
                    debug!(node = %node_id, free_ram = stats.free_ram, "Runner node stats");
                    candidates.push(NodeCandidate { node_id, stats });
                }
                Err(e) => {
                    warn!(node = %node_id, error = %e, "Runner node stats query failed");
                }
            }
        }

        pick_candidate(candidates).ok_or_else(|| Error::NoNodeAvailable {
            storage_node: storage_node.clone(),
        })
    }
}
