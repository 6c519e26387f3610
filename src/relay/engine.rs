//! Container engine seam underneath the relay.
//!
//! The engine binding (a Docker API client or similar) lives outside this
//! crate. The relay only needs these operations.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use futures_util::stream::BoxStream;

use crate::domain::ContainerStats;
use crate::error::EngineError;
use crate::port::{ConsoleSession, TerminalSize};

/// Everything needed to create one server container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    /// Start command split on whitespace.
    pub command: Vec<String>,
    /// `KEY=value` pairs.
    pub env: Vec<String>,
    /// Memory limit in bytes; `None` for no limit.
    pub memory_bytes: Option<u64>,
    pub network: Option<String>,
    /// Bind mount of the server folder.
    pub mount_source: PathBuf,
    pub mount_target: String,
    pub working_dir: String,
    pub labels: BTreeMap<String, String>,
    /// Remove the container once it exits.
    pub auto_remove: bool,
}

/// Host memory snapshot, in bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HostMemory {
    pub total: u64,
    pub free: u64,
}

/// Container lifecycle action from the engine event feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineAction {
    Start,
    Destroy,
    Other,
}

/// One raw engine event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineEvent {
    pub action: EngineAction,
    pub container_id: String,
    pub labels: BTreeMap<String, String>,
}

pub type EngineEventStream = BoxStream<'static, Result<EngineEvent, EngineError>>;
pub type StatsStream = BoxStream<'static, Result<ContainerStats, EngineError>>;

#[async_trait]
pub trait ContainerEngine: Send + Sync + 'static {
    async fn host_memory(&self) -> Result<HostMemory, EngineError>;

    async fn pull_image(&self, image: &str) -> Result<(), EngineError>;

    /// Create a container and return its id.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    async fn start_container(&self, container_id: &str) -> Result<(), EngineError>;

    async fn stop_container(&self, container_id: &str) -> Result<(), EngineError>;

    /// Running containers carrying `label` whose value equals `value`,
    /// or any value when `value` is `None`. Returns `(container id, label value)`.
    async fn list_by_label(
        &self,
        label: &str,
        value: Option<&str>,
    ) -> Result<Vec<(String, String)>, EngineError>;

    /// Subscribe to container events. Ends when the engine closes the feed.
    async fn events(&self) -> Result<EngineEventStream, EngineError>;

    /// Stats samples for one container. Ends when the container goes away.
    async fn stats(&self, container_id: &str) -> Result<StatsStream, EngineError>;

    async fn attach(
        &self,
        container_id: &str,
        size: TerminalSize,
    ) -> Result<ConsoleSession, EngineError>;

    async fn write_stdin(&self, container_id: &str, data: &[u8]) -> Result<(), EngineError>;
}
