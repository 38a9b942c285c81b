//! In-process document store and match log.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::{watch, RwLock};
use tracing::debug;

use super::{
    apply_to_document, DocumentStore, FieldPatch, MatchLog, StorageError, Subscriptions,
};
use crate::models::{GroupDocument, GroupId, MatchRecord};

/// Document store backed by a map in memory.
#[derive(Default)]
pub struct MemoryStore {
    documents: RwLock<HashMap<GroupId, GroupDocument>>,
    subscriptions: Subscriptions,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn read(&self, id: &GroupId) -> Result<Option<GroupDocument>, StorageError> {
        Ok(self.documents.read().await.get(id).cloned())
    }

    async fn create(&self, doc: &GroupDocument) -> Result<(), StorageError> {
        let mut documents = self.documents.write().await;
        if documents.contains_key(&doc.id) {
            return Err(StorageError::AlreadyExists(doc.id.clone()));
        }
        let mut stored = doc.clone();
        stored.version = 1;
        documents.insert(doc.id.clone(), stored.clone());
        self.subscriptions.publish(&stored);
        drop(documents);

        debug!("Created document {} in memory store", doc.id);
        Ok(())
    }

    async fn merge(
        &self,
        id: &GroupId,
        expected_version: u64,
        patch: &FieldPatch,
    ) -> Result<u64, StorageError> {
        let mut documents = self.documents.write().await;
        let current = documents
            .get(id)
            .ok_or_else(|| StorageError::NotFound(id.clone()))?;

        let updated = apply_to_document(current, expected_version, patch)?;
        let version = updated.version;
        documents.insert(id.clone(), updated.clone());
        self.subscriptions.publish(&updated);
        drop(documents);

        debug!(
            "Merged {} fields into {} (version {})",
            patch.len(),
            id,
            version
        );
        Ok(version)
    }

    async fn subscribe(
        &self,
        id: &GroupId,
    ) -> Result<watch::Receiver<Option<GroupDocument>>, StorageError> {
        let documents = self.documents.read().await;
        Ok(self.subscriptions.subscribe(id, documents.get(id).cloned()))
    }

    async fn list(&self) -> Result<Vec<GroupId>, StorageError> {
        let mut ids: Vec<GroupId> = self.documents.read().await.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }
}

/// Match log kept in memory.
#[derive(Default)]
pub struct MemoryMatchLog {
    records: RwLock<HashMap<GroupId, Vec<MatchRecord>>>,
}

impl MemoryMatchLog {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MatchLog for MemoryMatchLog {
    async fn append(&self, record: &MatchRecord) -> Result<(), StorageError> {
        self.records
            .write()
            .await
            .entry(record.group_id.clone())
            .or_default()
            .push(record.clone());
        Ok(())
    }

    async fn list(&self, group_id: &GroupId) -> Result<Vec<MatchRecord>, StorageError> {
        Ok(self
            .records
            .read()
            .await
            .get(group_id)
            .cloned()
            .unwrap_or_default())
    }
}
