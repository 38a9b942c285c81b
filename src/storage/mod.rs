//! Document store and match log.
//!
//! Each Group lives in one document. Writes are partial (dotted-path field patches) and
//! guarded by the document's `version`, so concurrent read-merge-write cycles either
//! apply on top of the version they read or fail with `VersionConflict`.
//!
//! - `memory`: in-process store used by tests and single-node deployments
//! - `document`: one JSON file per Group under the data directory
//! - `jsonl`: append-only match log

mod document;
mod jsonl;
mod memory;
mod patch;

pub use document::FileStore;
pub use jsonl::{JsonlMatchLog, JsonlReader, JsonlWriter};
pub use memory::{MemoryMatchLog, MemoryStore};
pub use patch::FieldPatch;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::watch;

use crate::models::{GroupDocument, GroupId, MatchRecord};

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Document not found: {0}")]
    NotFound(GroupId),

    #[error("Document already exists: {0}")]
    AlreadyExists(GroupId),

    #[error("Version conflict on {id}: expected {expected}, found {actual}")]
    VersionConflict {
        id: GroupId,
        expected: u64,
        actual: u64,
    },

    #[error("Invalid path: {0}")]
    InvalidPath(String),
}

/// Configuration for storage paths.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
}

impl StorageConfig {
    pub fn new(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    pub fn groups_dir(&self) -> PathBuf {
        self.data_dir.join("groups")
    }

    pub fn matches_dir(&self) -> PathBuf {
        self.data_dir.join("matches")
    }

    pub fn group_path(&self, id: &GroupId) -> PathBuf {
        self.groups_dir().join(format!("{}.json", id))
    }

    pub fn match_log_path(&self, id: &GroupId) -> PathBuf {
        self.matches_dir().join(format!("{}.jsonl", id))
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self::new(PathBuf::from("./data"))
    }
}

/// Shared store of Group documents.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store name for logging.
    fn name(&self) -> &'static str;

    /// Read a document.
    async fn read(&self, id: &GroupId) -> Result<Option<GroupDocument>, StorageError>;

    /// Create a document. Fails if one already exists under the same id.
    async fn create(&self, doc: &GroupDocument) -> Result<(), StorageError>;

    /// Apply a partial update if the stored version still equals `expected_version`.
    ///
    /// Returns the new version.
    async fn merge(
        &self,
        id: &GroupId,
        expected_version: u64,
        patch: &FieldPatch,
    ) -> Result<u64, StorageError>;

    /// Watch a document for changes. The receiver starts with the current value.
    async fn subscribe(
        &self,
        id: &GroupId,
    ) -> Result<watch::Receiver<Option<GroupDocument>>, StorageError>;

    /// All stored group ids.
    async fn list(&self) -> Result<Vec<GroupId>, StorageError>;
}

/// Append-only log of finished matches.
#[async_trait]
pub trait MatchLog: Send + Sync {
    async fn append(&self, record: &MatchRecord) -> Result<(), StorageError>;

    /// All records for a group, oldest first.
    async fn list(&self, group_id: &GroupId) -> Result<Vec<MatchRecord>, StorageError>;
}

/// Change fan-out shared by the store implementations.
#[derive(Default)]
pub(crate) struct Subscriptions {
    senders: Mutex<HashMap<GroupId, watch::Sender<Option<GroupDocument>>>>,
}

impl Subscriptions {
    pub(crate) fn subscribe(
        &self,
        id: &GroupId,
        current: Option<GroupDocument>,
    ) -> watch::Receiver<Option<GroupDocument>> {
        let mut senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        match senders.get(id) {
            Some(sender) => sender.subscribe(),
            None => {
                let (sender, receiver) = watch::channel(current);
                senders.insert(id.clone(), sender);
                receiver
            }
        }
    }

    /// Publish `doc` unless subscribers already hold the same or a newer version.
    pub(crate) fn publish(&self, doc: &GroupDocument) {
        let senders = self.senders.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(sender) = senders.get(&doc.id) {
            sender.send_if_modified(|current| match current {
                Some(seen) if seen.version >= doc.version => false,
                _ => {
                    *current = Some(doc.clone());
                    true
                }
            });
        }
    }
}

/// Apply a patch to a typed document via its JSON form and bump the version.
pub(crate) fn apply_to_document(
    doc: &GroupDocument,
    expected_version: u64,
    patch: &FieldPatch,
) -> Result<GroupDocument, StorageError> {
    if doc.version != expected_version {
        return Err(StorageError::VersionConflict {
            id: doc.id.clone(),
            expected: expected_version,
            actual: doc.version,
        });
    }

    let mut value = serde_json::to_value(doc)?;
    patch.apply(&mut value)?;
    let mut updated: GroupDocument = serde_json::from_value(value)?;
    updated.id = doc.id.clone();
    updated.version = doc.version + 1;
    Ok(updated)
}
