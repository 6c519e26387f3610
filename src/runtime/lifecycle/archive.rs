//! Archive and restore of server files.
//!
//! Archiving writes the list of platform-installed extensions next to the
//! server files, uninstalls them, and moves the folder to cold storage.
//! Restoring reverses it. Any failing step leaves the server in its
//! transitional status (ARCHIVING or RESTORING) for an operator.

use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use serde::{Deserialize, Serialize};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{error, info};

use super::LifecycleController;
use crate::app::config::ArchiveConfig;
use crate::domain::{NodeId, ServerId, ServerStatus};
use crate::error::{Error, Result, RpcError};
use crate::port::{ExtensionsService, FilesService};

/// File holding the extensions to reinstall on restore, inside the server folder.
pub const ARCHIVE_INFO_FILE: &str = "archive-information.json";

/// Contents of [`ARCHIVE_INFO_FILE`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchiveInformation {
    pub extensions: Vec<u64>,
}

fn info_path(server_id: ServerId) -> String {
    format!("{server_id}/{ARCHIVE_INFO_FILE}")
}

fn failed(server_id: ServerId, step: &'static str) -> impl Fn(RpcError) -> Error {
    move |source| Error::Archive {
        server_id,
        step,
        source: Some(source),
    }
}

impl LifecycleController {
    /// Check and leave `expected` for `next` as one step under the server lock.
    async fn enter(
        &self,
        server_id: ServerId,
        expected: ServerStatus,
        next: ServerStatus,
    ) -> Result<()> {
        let lock = self.lock_for(server_id);
        let _guard = lock.lock().await;

        let actual = self.inner.store.server(server_id).await?.status;
        if actual != expected || !self.set_status_locked(server_id, next).await? {
            return Err(Error::WrongState {
                server_id,
                expected,
                actual,
            });
        }
        Ok(())
    }

    fn storage_services(
        &self,
        node: &NodeId,
    ) -> (Arc<dyn FilesService>, Arc<dyn ExtensionsService>) {
        (
            self.inner.connections.files(node),
            self.inner.connections.extensions(node),
        )
    }

    /// Move an OFFLINE server's files to cold storage.
    ///
    /// # Errors
    ///
    /// [`Error::WrongState`] unless OFFLINE; [`Error::Archive`] naming the
    /// failed step, with the server left ARCHIVING.
    pub async fn archive(&self, server_id: ServerId) -> Result<()> {
        self.enter(server_id, ServerStatus::Offline, ServerStatus::Archiving)
            .await?;

        let node = self.inner.scheduler.resolve_storage_node(server_id).await?;
        let (files, extensions) = self.storage_services(&node);

        let info = ArchiveInformation {
            extensions: extensions
                .installed(server_id)
                .await
                .map_err(failed(server_id, "list extensions"))?
                .into_iter()
                .filter(|e| e.tracked)
                .map(|e| e.version_id)
                .collect(),
        };

        let folder = server_id.to_string();
        if !files
            .exists(&folder)
            .await
            .map_err(failed(server_id, "check server folder"))?
        {
            files
                .create_folder(&folder)
                .await
                .map_err(failed(server_id, "create server folder"))?;
        }

        files
            .write_file(&info_path(server_id), &serde_json::to_vec(&info)?)
            .await
            .map_err(failed(server_id, "write archive information"))?;

        try_join_all(
            info.extensions
                .iter()
                .map(|version| extensions.uninstall(server_id, *version)),
        )
        .await
        .map_err(failed(server_id, "uninstall extensions"))?;

        files
            .move_to_cold_storage(server_id)
            .await
            .map_err(failed(server_id, "move to cold storage"))?;
        files
            .delete(&folder)
            .await
            .map_err(failed(server_id, "delete server folder"))?;

        self.set_status(server_id, ServerStatus::Archived).await?;
        info!(server_id = %server_id, node = %node, extensions = info.extensions.len(), "Server archived");
        Ok(())
    }

    /// Bring an ARCHIVED server's files back from cold storage.
    ///
    /// # Errors
    ///
    /// [`Error::WrongState`] unless ARCHIVED; [`Error::Archive`] naming the
    /// failed step, with the server left RESTORING.
    pub async fn restore(&self, server_id: ServerId) -> Result<()> {
        self.enter(server_id, ServerStatus::Archived, ServerStatus::Restoring)
            .await?;

        let node = self.inner.scheduler.resolve_storage_node(server_id).await?;
        let (files, extensions) = self.storage_services(&node);

        files
            .load_from_cold_storage(server_id)
            .await
            .map_err(failed(server_id, "load from cold storage"))?;

        let path = info_path(server_id);
        let raw = files
            .read_file(&path)
            .await
            .map_err(failed(server_id, "read archive information"))?;
        let info: ArchiveInformation =
            serde_json::from_slice(&raw).map_err(|_| Error::Archive {
                server_id,
                step: "parse archive information",
                source: None,
            })?;

        try_join_all(
            info.extensions
                .iter()
                .map(|version| extensions.install(server_id, *version)),
        )
        .await
        .map_err(failed(server_id, "install extensions"))?;

        files
            .delete(&path)
            .await
            .map_err(failed(server_id, "delete archive information"))?;

        self.set_status(server_id, ServerStatus::Offline).await?;
        info!(server_id = %server_id, node = %node, extensions = info.extensions.len(), "Server restored");
        Ok(())
    }
}

/// Periodically archives the OFFLINE servers that were started least recently.
pub struct ArchiveSweeper {
    controller: LifecycleController,
    batch_size: usize,
    interval: Duration,
}

impl ArchiveSweeper {
    #[must_use]
    pub fn new(controller: LifecycleController, config: &ArchiveConfig) -> Self {
        Self {
            controller,
            batch_size: config.batch_size,
            interval: config.interval(),
        }
    }

    /// Archive up to one batch. Per-server failures are logged and skipped.
    /// Returns how many servers were archived.
    pub async fn sweep(&self) -> Result<usize> {
        let mut offline = self
            .controller
            .store()
            .servers_with_status(&[ServerStatus::Offline])
            .await?;
        // Never-started servers age from their creation.
        offline.sort_by_key(|s| s.last_start.unwrap_or(s.created_at));

        let mut archived = 0;
        for server in offline.into_iter().take(self.batch_size) {
            match self.controller.archive(server.id).await {
                Ok(()) => archived += 1,
                Err(e) => error!(server_id = %server.id, error = %e, "Archive failed"),
            }
        }
        Ok(archived)
    }

    /// Sweep once per interval, starting one interval from now.
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match self.sweep().await {
                Ok(0) => {}
                Ok(archived) => info!(archived, "Archive sweep finished"),
                Err(e) => error!(error = %e, "Archive sweep failed"),
            }
        }
    }
}
