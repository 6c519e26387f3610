//! Wire types of the node RPC surface.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::{ContainerStats, ContainerStatus, NodeStats, ServerId, StatusEvent};
use crate::error::RpcError;
use crate::port::{InstalledExtension, StartContainerRequest, StartOutcome};

/// Status field of a unary reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyStatus {
    Ok,
    Full,
    Error,
}

/// Body of every unary reply: `{"status": "ok"|"full"|"error", "reason": ...}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reply {
    pub status: ReplyStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl Reply {
    /// Accept `ok`, reject everything else.
    pub fn into_ok(self, operation: &'static str) -> Result<(), RpcError> {
        match self.status {
            ReplyStatus::Ok => Ok(()),
            ReplyStatus::Full => Err(RpcError::Remote {
                operation,
                reason: "node is full".into(),
            }),
            ReplyStatus::Error => Err(self.rejection(operation)),
        }
    }

    /// Map a start reply; `full` is a regular outcome there.
    pub fn into_start_outcome(self) -> Result<StartOutcome, RpcError> {
        match self.status {
            ReplyStatus::Ok => Ok(StartOutcome::Accepted),
            ReplyStatus::Full => Ok(StartOutcome::Full),
            ReplyStatus::Error => Err(self.rejection("startContainer")),
        }
    }

    fn rejection(self, operation: &'static str) -> RpcError {
        RpcError::Remote {
            operation,
            reason: self.reason.unwrap_or_else(|| "unspecified".into()),
        }
    }
}

/// `startContainer` request body.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBody<'a> {
    pub server_id: ServerId,
    pub storage_node_id: &'a str,
    pub image: &'a str,
    pub ram_bytes: u64,
    pub start_command: &'a str,
    pub env: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a StartContainerRequest> for StartBody<'a> {
    fn from(request: &'a StartContainerRequest) -> Self {
        Self {
            server_id: request.server_id,
            storage_node_id: request.storage_node.as_str(),
            image: &request.image,
            ram_bytes: request.ram_bytes,
            start_command: &request.start_command,
            env: &request.env,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerIdBody {
    pub server_id: ServerId,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecBody<'a> {
    pub server_id: ServerId,
    pub command: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PathBody<'a> {
    pub path: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtensionBody {
    pub server_id: ServerId,
    pub version_id: u64,
}

#[derive(Debug, Deserialize)]
pub struct RunningContainers {
    pub servers: Vec<ServerId>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeStatsBody {
    pub cpu_usage: u64,
    pub total_ram: u64,
    pub free_ram: u64,
}

impl From<NodeStatsBody> for NodeStats {
    fn from(body: NodeStatsBody) -> Self {
        Self {
            cpu_usage: body.cpu_usage,
            total_ram: body.total_ram,
            free_ram: body.free_ram,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct Exists {
    pub exists: bool,
}

#[derive(Debug, Deserialize)]
pub struct InstalledExtensions {
    pub extensions: Vec<InstalledExtension>,
}

/// One frame of the status stream: `{serverId, statusChange?|stats?}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusFrame {
    pub server_id: ServerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status_change: Option<ContainerStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stats: Option<ContainerStats>,
}

impl StatusFrame {
    /// Convert to a domain event. Frames carrying neither field are
    /// keep-alives and yield `None`.
    #[must_use]
    pub fn into_event(self) -> Option<StatusEvent> {
        match (self.status_change, self.stats) {
            (Some(status), _) => Some(StatusEvent::change(self.server_id, status)),
            (None, Some(stats)) => Some(StatusEvent::stats(self.server_id, stats)),
            (None, None) => None,
        }
    }
}
