//! Storage-node ports: server files and installed extensions.
//!
//! Only the narrow slice the lifecycle controller needs for archiving and
//! restoring is modelled here.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::ServerId;
use crate::error::RpcError;

/// File operations on a storage node. Paths are relative to the node's
/// server root, e.g. `"42/archive-information.json"`.
#[async_trait]
pub trait FilesService: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool, RpcError>;

    async fn create_folder(&self, path: &str) -> Result<(), RpcError>;

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), RpcError>;

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RpcError>;

    /// Delete a file or a folder recursively.
    async fn delete(&self, path: &str) -> Result<(), RpcError>;

    /// Upload the server's folder to cold storage.
    async fn move_to_cold_storage(&self, server_id: ServerId) -> Result<(), RpcError>;

    /// Download the server's folder back from cold storage.
    async fn load_from_cold_storage(&self, server_id: ServerId) -> Result<(), RpcError>;
}

/// An extension version present in a server's files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstalledExtension {
    pub version_id: u64,
    /// Whether the file was installed through the platform (and can be
    /// reinstalled from the catalog) rather than uploaded by hand.
    pub tracked: bool,
}

/// Extension install/uninstall on a storage node.
#[async_trait]
pub trait ExtensionsService: Send + Sync {
    async fn installed(&self, server_id: ServerId) -> Result<Vec<InstalledExtension>, RpcError>;

    async fn install(&self, server_id: ServerId, version_id: u64) -> Result<(), RpcError>;

    async fn uninstall(&self, server_id: ServerId, version_id: u64) -> Result<(), RpcError>;
}
