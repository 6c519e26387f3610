//! Container service port, served by the relay on every runner node.
//!
//! This is the surface the control plane drives: start and stop containers,
//! list what is running, read node stats, follow the status stream, and
//! talk to a server's console.

use std::collections::BTreeMap;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use crate::domain::{NodeId, NodeStats, ServerId, StatusEvent};
use crate::error::RpcError;

/// Environment variable carrying the owner's id.
pub const ENV_OWNER_ID: &str = "OWNER_ID";
/// Environment variable carrying the owner's display name.
pub const ENV_OWNER_NAME: &str = "OWNER_NAME";
/// Environment variable carrying the server id.
pub const ENV_SERVER_ID: &str = "SERVER_ID";

/// Everything a relay needs to launch a server container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartContainerRequest {
    pub server_id: ServerId,
    /// Storage node holding the server's files (mounted into the container).
    pub storage_node: NodeId,
    pub image: String,
    /// Memory limit in bytes, buffer included.
    pub ram_bytes: u64,
    pub start_command: String,
    pub env: BTreeMap<String, String>,
}

/// Successful answers to a start request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StartOutcome {
    /// The relay accepted the request; progress arrives on the status stream.
    Accepted,
    /// The host does not have enough free memory for the container.
    Full,
}

/// Terminal dimensions for console attach.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSize {
    pub rows: u16,
    pub cols: u16,
}

impl Default for TerminalSize {
    fn default() -> Self {
        Self { rows: 24, cols: 80 }
    }
}

/// A bidirectional byte stream attached to a container console.
///
/// Dropping `input` detaches stdin; `output` yields `None` once the
/// container side closes.
#[derive(Debug)]
pub struct ConsoleSession {
    pub input: mpsc::Sender<Vec<u8>>,
    pub output: mpsc::Receiver<Vec<u8>>,
}

/// Long-lived status feed of a runner node.
pub type StatusStream = BoxStream<'static, Result<StatusEvent, RpcError>>;

/// Container operations exposed by a runner node.
#[async_trait]
pub trait ContainerService: Send + Sync {
    /// Ask the node to launch a container.
    async fn start_container(&self, request: &StartContainerRequest)
        -> Result<StartOutcome, RpcError>;

    /// Stop the container owned by `server_id`.
    async fn stop_container(&self, server_id: ServerId) -> Result<(), RpcError>;

    /// Ids of all servers with a running container on the node.
    async fn running_containers(&self) -> Result<Vec<ServerId>, RpcError>;

    /// Current node resource snapshot.
    async fn node_stats(&self) -> Result<NodeStats, RpcError>;

    /// Open the node's status stream.
    async fn status_stream(&self) -> Result<StatusStream, RpcError>;

    /// Attach to a server console.
    async fn attach_console(
        &self,
        server_id: ServerId,
        size: TerminalSize,
    ) -> Result<ConsoleSession, RpcError>;

    /// Write a command line to a server console.
    async fn exec_command(&self, server_id: ServerId, command: &str) -> Result<(), RpcError>;
}
