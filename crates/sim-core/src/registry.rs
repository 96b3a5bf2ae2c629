//! Sessions keyed by id
//!
//! Entry points resolve sessions through the registry; there is no process
//! wide "current" session.

use std::sync::Arc;

use dashmap::DashMap;
use sim_agents::LlmClient;
use sim_schema::{DirectorSettings, ScenarioOutline};
use tracing::info;
use ulid::Ulid;

use crate::config::SessionConfig;
use crate::error::{SessionError, SessionId};
use crate::session::{Session, SessionSetup};
use crate::store::{DocumentStore, MemoryDocumentStore, MemorySnapshotStore, SnapshotStore};

/// Live sessions plus the stores they share
pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<Session>>,
    llm: Arc<dyn LlmClient>,
    documents: Arc<dyn DocumentStore>,
    snapshots: Arc<dyn SnapshotStore>,
    config: SessionConfig,
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("sessions", &self.sessions.len())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl SessionRegistry {
    /// Registry with in-memory stores
    pub fn new(llm: Arc<dyn LlmClient>, config: SessionConfig) -> Self {
        Self {
            sessions: DashMap::new(),
            llm,
            documents: Arc::new(MemoryDocumentStore::new()),
            snapshots: Arc::new(MemorySnapshotStore::new()),
            config,
        }
    }

    /// With a document store
    #[must_use]
    pub fn with_documents(mut self, store: Arc<dyn DocumentStore>) -> Self {
        self.documents = store;
        self
    }

    /// With a snapshot store
    #[must_use]
    pub fn with_snapshots(mut self, store: Arc<dyn SnapshotStore>) -> Self {
        self.snapshots = store;
        self
    }

    /// Shared document store
    #[must_use]
    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.documents
    }

    /// Parse, compile and start a new session
    ///
    /// # Errors
    /// Whatever [`Session::start`] reports; nothing is registered then.
    pub async fn setup(&self, setup: SessionSetup) -> Result<Arc<Session>, SessionError> {
        let session = Session::start(
            Ulid::new(),
            setup,
            self.llm.clone(),
            self.documents.clone(),
            self.config.clone(),
        )
        .await?;
        Ok(self.insert(session))
    }

    /// Start a session from a compiled outline
    ///
    /// # Errors
    /// Whatever [`Session::from_outline`] reports.
    pub fn setup_compiled(
        &self,
        outline: &ScenarioOutline,
        settings: &DirectorSettings,
    ) -> Result<Arc<Session>, SessionError> {
        let session = Session::from_outline(
            Ulid::new(),
            outline,
            settings,
            self.llm.clone(),
            self.documents.clone(),
            self.config.clone(),
        )?;
        Ok(self.insert(session))
    }

    fn insert(&self, session: Session) -> Arc<Session> {
        let session = Arc::new(session);
        self.sessions.insert(session.id(), session.clone());
        info!(session = %session.id(), live = self.sessions.len(), "session registered");
        session
    }

    /// Session `id`
    ///
    /// # Errors
    /// [`SessionError::NotFound`] for an unknown id.
    pub fn get(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        self.sessions
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(SessionError::NotFound(id))
    }

    /// Forget session `id`
    pub fn remove(&self, id: SessionId) -> Option<Arc<Session>> {
        self.sessions.remove(&id).map(|(_, s)| s)
    }

    /// Forget every session; returns how many there were
    pub fn clear_all(&self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        info!(count, "all sessions cleared");
        count
    }

    /// Live session ids, oldest first
    #[must_use]
    pub fn ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    /// Live session count
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no session is live
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot session `id` into the snapshot store
    ///
    /// # Errors
    /// [`SessionError::NotFound`] or a store failure.
    pub async fn persist(&self, id: SessionId) -> Result<(), SessionError> {
        let snapshot = self.get(id)?.snapshot();
        self.snapshots.save(&snapshot).await?;
        info!(session = %id, audit_len = snapshot.board.audit_log.len(), "session persisted");
        Ok(())
    }

    /// Load session `id` from the snapshot store and register it
    ///
    /// # Errors
    /// A store failure, or [`SessionError::Board`] when the stored audit
    /// chain does not verify.
    pub async fn resume(&self, id: SessionId) -> Result<Arc<Session>, SessionError> {
        let snapshot = self.snapshots.load(id).await?;
        let session = Session::restore(
            snapshot,
            self.llm.clone(),
            self.documents.clone(),
            self.config.clone(),
        )?;
        Ok(self.insert(session))
    }
}
