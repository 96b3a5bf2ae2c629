//! Scenario Blackboard (MCP-v1)
//!
//! Typed key-value space through which scenario agents exchange artifacts.
//!
//! # Core Concepts
//!
//! - [`Grant`]: per-agent `reads` / `writes` / `preserves`
//! - [`Phase`]: IDLE → BUILDING → RUNNING → TERMINATED, gating writable keys
//!   through a [`PhasePolicy`]
//! - Schema bindings: writes to a bound key are validated by the
//!   [`SchemaRegistry`](sim_schema::SchemaRegistry) and stored normalized
//! - [`AuditEntry`]: hash-chained record of every accepted operation
//! - [`BoardEvent`]: broadcasts fanned out to in-process subscribers
//!
//! # Example
//!
//! ```rust,ignore
//! use sim_blackboard::{keys, AgentId, Blackboard, Caller, Grant};
//!
//! let board = Blackboard::standard()?;
//! let parser = AgentId::new("parser");
//! board.grant_permission(parser.clone(), Grant::new().reads([keys::RAW_INPUT]));
//! let narrative = board.read(keys::RAW_INPUT, &Caller::from(&parser))?;
//! ```

mod audit;
mod board;
mod error;
pub mod keys;
mod permission;
mod phase;
mod types;

pub use audit::{verify_chain, AuditAction, AuditEntry, AuditFilter};
pub use board::{
    Blackboard, BlackboardBuilder, BoardEvent, BoardSnapshot, Entry, Subscriber, SubscriptionId,
};
pub use error::BoardError;
pub use permission::Grant;
pub use phase::{allowed_transitions, validate_transition, KeyRule, Phase, PhasePolicy};
pub use types::{Access, AgentId, Caller};
