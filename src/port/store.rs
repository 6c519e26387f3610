//! Persistence port.
//!
//! The control plane treats the database as an external key/value lookup for
//! servers, owners and the runner/storage affinity relation. Only the
//! lifecycle controller writes `status` and `runner_node_id`.

use async_trait::async_trait;

use crate::domain::{NodeId, Owner, Server, ServerId, ServerStatus, UserId};
use crate::error::Result;

#[async_trait]
pub trait ServerStore: Send + Sync {
    /// Load a server.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ServerNotFound`](crate::error::Error::ServerNotFound)
    /// when no server has this id.
    async fn server(&self, id: ServerId) -> Result<Server>;

    /// Persist a full server record.
    async fn save_server(&self, server: &Server) -> Result<()>;

    /// All servers currently in one of `statuses`.
    async fn servers_with_status(&self, statuses: &[ServerStatus]) -> Result<Vec<Server>>;

    /// All servers of `owner` currently in one of `statuses`.
    async fn owner_servers_with_status(
        &self,
        owner: &UserId,
        statuses: &[ServerStatus],
    ) -> Result<Vec<Server>>;

    /// Record the runner node a server is placed on.
    async fn assign_runner_node(&self, id: ServerId, node: &NodeId) -> Result<()>;

    /// Every known runner node.
    async fn runner_nodes(&self) -> Result<Vec<NodeId>>;

    /// Runner nodes linked to `storage_node`.
    async fn runner_nodes_for_storage(&self, storage_node: &NodeId) -> Result<Vec<NodeId>>;

    /// Load an owner.
    async fn owner(&self, id: &UserId) -> Result<Owner>;
}
