//! In-memory storage-node services.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use crate::domain::ServerId;
use crate::error::RpcError;
use crate::port::{ExtensionsService, FilesService, InstalledExtension, StorageChannel};

fn rejected(operation: &'static str, reason: impl Into<String>) -> RpcError {
    RpcError::Remote {
        operation,
        reason: reason.into(),
    }
}

/// Files service keeping the tree in memory.
///
/// `fail_on("move_to_cold_storage")` makes that operation fail.
#[derive(Default)]
pub struct MemoryFiles {
    files: Mutex<BTreeMap<String, Vec<u8>>>,
    folders: Mutex<BTreeSet<String>>,
    cold: Mutex<BTreeMap<ServerId, BTreeMap<String, Vec<u8>>>>,
    failing: Mutex<Option<&'static str>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_on(&self, operation: &'static str) {
        *self.failing.lock().unwrap() = Some(operation);
    }

    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        self.files.lock().unwrap().get(path).cloned()
    }

    pub fn has_folder(&self, path: &str) -> bool {
        self.folders.lock().unwrap().contains(path)
    }

    pub fn in_cold_storage(&self, server_id: ServerId) -> bool {
        self.cold.lock().unwrap().contains_key(&server_id)
    }

    /// Seed a file, creating its server folder.
    pub fn put(&self, path: &str, content: &[u8]) {
        if let Some((folder, _)) = path.split_once('/') {
            self.folders.lock().unwrap().insert(folder.to_string());
        }
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), content.to_vec());
    }

    fn check(&self, operation: &'static str) -> Result<(), RpcError> {
        if *self.failing.lock().unwrap() == Some(operation) {
            return Err(rejected(operation, "scripted failure"));
        }
        Ok(())
    }
}

#[async_trait]
impl FilesService for MemoryFiles {
    async fn exists(&self, path: &str) -> Result<bool, RpcError> {
        self.check("exists")?;
        Ok(self.has_folder(path) || self.files.lock().unwrap().contains_key(path))
    }

    async fn create_folder(&self, path: &str) -> Result<(), RpcError> {
        self.check("create_folder")?;
        self.folders.lock().unwrap().insert(path.to_string());
        Ok(())
    }

    async fn write_file(&self, path: &str, content: &[u8]) -> Result<(), RpcError> {
        self.check("write_file")?;
        self.put(path, content);
        Ok(())
    }

    async fn read_file(&self, path: &str) -> Result<Vec<u8>, RpcError> {
        self.check("read_file")?;
        self.file(path)
            .ok_or_else(|| rejected("read_file", format!("{path} not found")))
    }

    async fn delete(&self, path: &str) -> Result<(), RpcError> {
        self.check("delete")?;
        let prefix = format!("{path}/");
        self.files
            .lock()
            .unwrap()
            .retain(|p, _| p != path && !p.starts_with(&prefix));
        self.folders.lock().unwrap().remove(path);
        Ok(())
    }

    async fn move_to_cold_storage(&self, server_id: ServerId) -> Result<(), RpcError> {
        self.check("move_to_cold_storage")?;
        let prefix = format!("{server_id}/");
        let copied: BTreeMap<String, Vec<u8>> = self
            .files
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p.starts_with(&prefix))
            .map(|(p, c)| (p.clone(), c.clone()))
            .collect();
        self.cold.lock().unwrap().insert(server_id, copied);
        Ok(())
    }

    async fn load_from_cold_storage(&self, server_id: ServerId) -> Result<(), RpcError> {
        self.check("load_from_cold_storage")?;
        let archived = self
            .cold
            .lock()
            .unwrap()
            .remove(&server_id)
            .ok_or_else(|| rejected("load_from_cold_storage", "nothing archived"))?;
        self.folders.lock().unwrap().insert(server_id.to_string());
        self.files.lock().unwrap().extend(archived);
        Ok(())
    }
}

/// Extensions service keeping installed versions in memory.
#[derive(Default)]
pub struct MemoryExtensions {
    installed: Mutex<BTreeMap<ServerId, Vec<InstalledExtension>>>,
}

impl MemoryExtensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, server_id: ServerId, extensions: Vec<InstalledExtension>) {
        self.installed.lock().unwrap().insert(server_id, extensions);
    }

    pub fn versions(&self, server_id: ServerId) -> Vec<u64> {
        self.installed
            .lock()
            .unwrap()
            .get(&server_id)
            .map(|list| list.iter().map(|e| e.version_id).collect())
            .unwrap_or_default()
    }
}

#[async_trait]
impl ExtensionsService for MemoryExtensions {
    async fn installed(&self, server_id: ServerId) -> Result<Vec<InstalledExtension>, RpcError> {
        Ok(self
            .installed
            .lock()
            .unwrap()
            .get(&server_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn install(&self, server_id: ServerId, version_id: u64) -> Result<(), RpcError> {
        self.installed
            .lock()
            .unwrap()
            .entry(server_id)
            .or_default()
            .push(InstalledExtension {
                version_id,
                tracked: true,
            });
        Ok(())
    }

    async fn uninstall(&self, server_id: ServerId, version_id: u64) -> Result<(), RpcError> {
        if let Some(list) = self.installed.lock().unwrap().get_mut(&server_id) {
            list.retain(|e| e.version_id != version_id);
        }
        Ok(())
    }
}

/// Fresh in-memory storage services plus the channel wrapping them.
pub fn memory_storage() -> (Arc<MemoryFiles>, Arc<MemoryExtensions>, StorageChannel) {
    let files = Arc::new(MemoryFiles::new());
    let extensions = Arc::new(MemoryExtensions::new());
    let channel = StorageChannel {
        files: files.clone(),
        extensions: extensions.clone(),
    };
    (files, extensions, channel)
}
