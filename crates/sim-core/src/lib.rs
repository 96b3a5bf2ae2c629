//! Scenario Session Runtime
//!
//! Turns a compiled scenario into a live conversation between a student and
//! an LLM advisor, supervised by the director.
//!
//! # Core Concepts
//!
//! - [`SessionRegistry`]: sessions keyed by ULID, plus the shared stores
//! - [`Session`]: one blackboard, one transcript, one director; operations
//!   queue on a fair async lock
//! - [`SnapshotStore`] / [`DocumentStore`]: persistence and reference
//!   material seams, with in-memory implementations
//! - [`SessionError`]: every failure carries an [`ErrorKind`] and a
//!   [`SessionError::safe_message`]
//!
//! # Example
//!
//! ```rust,ignore
//! use sim_core::{SessionConfig, SessionRegistry, SessionSetup};
//!
//! let registry = SessionRegistry::new(llm, SessionConfig::from_env());
//! let session = registry
//!     .setup(SessionSetup::new(narrative).with_instructions(instructions))
//!     .await?;
//! let turn = session.post_student("Where should we start?").await?;
//! println!("{}", turn.reply);
//! ```

mod config;
mod error;
mod registry;
mod session;
mod store;

pub use config::{SessionConfig, DEFAULT_MAX_TRANSCRIPT_TURNS, DEFAULT_TURN_TIMEOUT_MS};
pub use error::{ErrorKind, SessionError, SessionId};
pub use registry::SessionRegistry;
pub use session::{
    ExportFormat, ScenarioEdit, Session, SessionSetup, SessionView, TurnOutcome, SCENARIO_EDITED,
    SESSION_AGENT, SESSION_CLOSED, SESSION_STARTED,
};
pub use store::{
    Document, DocumentStore, MemoryDocumentStore, MemorySnapshotStore, SessionSnapshot,
    SnapshotStore, StoreError,
};
