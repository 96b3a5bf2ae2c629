//! Snapshot and document stores
//!
//! Both are traits so a deployment can back them with real storage; the
//! in-memory implementations serve tests and single-process use. Every call
//! is atomic on its own.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sim_blackboard::BoardSnapshot;
use ulid::Ulid;

use crate::error::SessionId;

/// Failures of a store backend
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StoreError {
    /// Nothing stored under this id
    #[error("nothing stored under {0}")]
    NotFound(String),

    /// Stored bytes could not be decoded
    #[error("stored item is corrupt: {0}")]
    Corrupt(String),

    /// Backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Everything needed to rebuild a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Session id
    pub session_id: SessionId,
    /// Capture time
    pub taken_at: DateTime<Utc>,
    /// Blackboard contents: phase, entries (outline, settings, state,
    /// transcript, pending intervention), grants and audit log
    pub board: BoardSnapshot,
    /// Attached document ids
    #[serde(default)]
    pub documents: Vec<Ulid>,
}

/// Persists session snapshots
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
    /// Store `snapshot`, replacing any earlier one for the same session
    ///
    /// # Errors
    /// [`StoreError::Backend`] when the write fails.
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError>;

    /// Latest snapshot of `id`
    ///
    /// # Errors
    /// [`StoreError::NotFound`] when nothing is stored.
    async fn load(&self, id: SessionId) -> Result<SessionSnapshot, StoreError>;

    /// Every stored session id
    ///
    /// # Errors
    /// [`StoreError::Backend`] when listing fails.
    async fn list(&self) -> Result<Vec<SessionId>, StoreError>;

    /// Drop the snapshot of `id`; returns whether one existed
    ///
    /// # Errors
    /// [`StoreError::Backend`] when the delete fails.
    async fn delete(&self, id: SessionId) -> Result<bool, StoreError>;
}

/// Snapshots held in memory as serialized JSON
#[derive(Debug, Default)]
pub struct MemorySnapshotStore {
    snapshots: DashMap<SessionId, String>,
}

impl MemorySnapshotStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
    async fn save(&self, snapshot: &SessionSnapshot) -> Result<(), StoreError> {
        let encoded =
            serde_json::to_string(snapshot).map_err(|e| StoreError::Backend(e.to_string()))?;
        self.snapshots.insert(snapshot.session_id, encoded);
        Ok(())
    }

    async fn load(&self, id: SessionId) -> Result<SessionSnapshot, StoreError> {
        let encoded = self
            .snapshots
            .get(&id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        serde_json::from_str(encoded.value()).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    async fn list(&self) -> Result<Vec<SessionId>, StoreError> {
        let mut ids: Vec<SessionId> = self.snapshots.iter().map(|e| *e.key()).collect();
        ids.sort();
        Ok(ids)
    }

    async fn delete(&self, id: SessionId) -> Result<bool, StoreError> {
        Ok(self.snapshots.remove(&id).is_some())
    }
}

/// Uploaded reference material
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Store-assigned id
    pub id: Ulid,
    /// Display name
    pub name: String,
    /// Extracted text
    pub content: String,
    /// Free-form metadata
    #[serde(default)]
    pub meta: BTreeMap<String, String>,
    /// Upload time
    pub uploaded_at: DateTime<Utc>,
}

impl Document {
    /// New document with a fresh id
    pub fn new(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: Ulid::new(),
            name: name.into(),
            content: content.into(),
            meta: BTreeMap::new(),
            uploaded_at: Utc::now(),
        }
    }

    /// With a metadata entry
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.meta.insert(key.into(), value.into());
        self
    }
}

/// Holds documents attached to sessions; opaque to the core
#[async_trait::async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `document`, returning its id
    ///
    /// # Errors
    /// [`StoreError::Backend`] when the write fails.
    async fn put(&self, document: Document) -> Result<Ulid, StoreError>;

    /// Fetch a document
    ///
    /// # Errors
    /// [`StoreError::NotFound`] for an unknown id.
    async fn get(&self, id: Ulid) -> Result<Document, StoreError>;

    /// Ids of documents whose metadata holds every `filter` pair
    ///
    /// # Errors
    /// [`StoreError::Backend`] when listing fails.
    async fn list(&self, filter: &BTreeMap<String, String>) -> Result<Vec<Ulid>, StoreError>;
}

/// Documents held in memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    documents: DashMap<Ulid, Document>,
}

impl MemoryDocumentStore {
    /// Empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn put(&self, document: Document) -> Result<Ulid, StoreError> {
        let id = document.id;
        self.documents.insert(id, document);
        Ok(id)
    }

    async fn get(&self, id: Ulid) -> Result<Document, StoreError> {
        self.documents
            .get(&id)
            .map(|d| d.value().clone())
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    async fn list(&self, filter: &BTreeMap<String, String>) -> Result<Vec<Ulid>, StoreError> {
        let mut ids: Vec<Ulid> = self
            .documents
            .iter()
            .filter(|d| filter.iter().all(|(k, v)| d.meta.get(k) == Some(v)))
            .map(|d| *d.key())
            .collect();
        ids.sort();
        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn documents_filter_by_metadata() {
        let store = MemoryDocumentStore::new();
        let memo = store
            .put(Document::new("memo", "Backups are corrupt").with_meta("kind", "memo"))
            .await
            .unwrap();
        store.put(Document::new("press", "Draft statement")).await.unwrap();

        let filter = BTreeMap::from([("kind".to_string(), "memo".to_string())]);
        assert_eq!(store.list(&filter).await.unwrap(), vec![memo]);
        assert_eq!(store.list(&BTreeMap::new()).await.unwrap().len(), 2);
        assert!(matches!(
            store.get(Ulid::new()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[test]
    fn snapshots_round_trip_through_the_store() {
        let store = MemorySnapshotStore::new();
        let board = sim_blackboard::Blackboard::standard().unwrap();
        let snapshot = SessionSnapshot {
            session_id: Ulid::new(),
            taken_at: Utc::now(),
            board: board.snapshot(),
            documents: vec![Ulid::new()],
        };
        let id = snapshot.session_id;

        tokio_test::block_on(async {
            store.save(&snapshot).await.unwrap();
            let loaded = store.load(id).await.unwrap();
            assert_eq!(loaded.documents, snapshot.documents);
            assert_eq!(store.list().await.unwrap(), vec![id]);
            assert!(store.delete(id).await.unwrap());
            assert!(!store.delete(id).await.unwrap());
            assert!(matches!(store.load(id).await, Err(StoreError::NotFound(_))));
        });
    }
}
