//! File-backed document store.
//!
//! One pretty-printed JSON file per Group under `<data_dir>/groups/`. Writes go to a
//! temporary file that is renamed over the old one, so readers never see a torn
//! document. Compare-and-swap is serialized by a lock held for the read-check-write, which
//! covers every writer in this process.

use std::io::ErrorKind;
use std::path::Path;

use async_trait::async_trait;
use tokio::fs;
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};

use super::{
    apply_to_document, DocumentStore, FieldPatch, StorageConfig, StorageError, Subscriptions,
};
use crate::models::{GroupDocument, GroupId};

/// Document store persisting JSON files.
pub struct FileStore {
    config: StorageConfig,
    write_lock: Mutex<()>,
    subscriptions: Subscriptions,
}

impl FileStore {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            write_lock: Mutex::new(()),
            subscriptions: Subscriptions::default(),
        }
    }

    fn path_for(&self, id: &GroupId) -> Result<std::path::PathBuf, StorageError> {
        if !id.is_valid_key() || id.as_str().contains(['/', '\\']) {
            return Err(StorageError::InvalidPath(id.to_string()));
        }
        Ok(self.config.group_path(id))
    }

    async fn load(&self, id: &GroupId) -> Result<Option<GroupDocument>, StorageError> {
        let path = self.path_for(id)?;
        match fs::read_to_string(&path).await {
            Ok(contents) => Ok(Some(serde_json::from_str(&contents)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    async fn save(&self, doc: &GroupDocument) -> Result<(), StorageError> {
        let path = self.path_for(&doc.id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let tmp = path.with_extension("json.tmp");
        let json = serde_json::to_string_pretty(doc)?;
        fs::write(&tmp, json).await?;
        fs::rename(&tmp, &path).await?;

        debug!("Wrote {:?} (version {})", path, doc.version);
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for FileStore {
    fn name(&self) -> &'static str {
        "file"
    }

    async fn read(&self, id: &GroupId) -> Result<Option<GroupDocument>, StorageError> {
        self.load(id).await
    }

    async fn create(&self, doc: &GroupDocument) -> Result<(), StorageError> {
        let _guard = self.write_lock.lock().await;
        if self.load(&doc.id).await?.is_some() {
            return Err(StorageError::AlreadyExists(doc.id.clone()));
        }

        let mut stored = doc.clone();
        stored.version = 1;
        self.save(&stored).await?;
        self.subscriptions.publish(&stored);

        info!("Created group document {}", doc.id);
        Ok(())
    }

    async fn merge(
        &self,
        id: &GroupId,
        expected_version: u64,
        patch: &FieldPatch,
    ) -> Result<u64, StorageError> {
        let _guard = self.write_lock.lock().await;
        let current = self
            .load(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(id.clone()))?;

        let updated = apply_to_document(&current, expected_version, patch)?;
        self.save(&updated).await?;
        self.subscriptions.publish(&updated);

        Ok(updated.version)
    }

    async fn subscribe(
        &self,
        id: &GroupId,
    ) -> Result<watch::Receiver<Option<GroupDocument>>, StorageError> {
        let current = self.load(id).await?;
        Ok(self.subscriptions.subscribe(id, current))
    }

    async fn list(&self) -> Result<Vec<GroupId>, StorageError> {
        let dir = self.config.groups_dir();
        if !Path::new(&dir).exists() {
            return Ok(Vec::new());
        }

        let mut ids = Vec::new();
        let mut entries = fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|s| s.to_str()) {
                Some(stem) => ids.push(GroupId::from(stem)),
                None => warn!("Skipping unreadable document name {:?}", path),
            }
        }

        ids.sort();
        Ok(ids)
    }
}
