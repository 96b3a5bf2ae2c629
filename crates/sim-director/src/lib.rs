//! Scenario Director
//!
//! Watches a running session's transcript and keeps the simulation on its
//! learning goals.
//!
//! # Core Concepts
//!
//! - [`Director`]: one evaluation per cadence tick; writes `director_state`
//!   and at most one `pending_intervention`
//! - [`cadence`]: message interval, event and time clauses
//! - [`policy`]: intensity gate and candidate ordering
//! - [`Verifier`]: optional self-check with bounded regeneration
//! - [`CostMeter`]: per-decision spend cap; the latency cap wraps the whole
//!   evaluation
//!
//! # Example
//!
//! ```rust,ignore
//! use sim_director::Director;
//!
//! let director = Director::new(board.clone(), llm, &models.director);
//! director.register();
//! if let Some(evaluation) = director.maybe_evaluate().await? {
//!     println!("{:?}", evaluation.intervention);
//! }
//! ```

pub mod assess;
mod budget;
pub mod cadence;
mod director;
mod error;
pub mod policy;
pub mod scoring;
pub mod verify;

pub use assess::Assessor;
pub use budget::{BudgetBreach, CostMeter};
pub use cadence::{CadenceInput, CadenceReason};
pub use director::{
    Director, Evaluation, Snapshot, BUDGET_EXCEEDED_NOTE, CONVERSATION_CLEARED,
    DIRECTOR_EVALUATED, DIRECTOR_ID,
};
pub use error::DirectorError;
pub use policy::{Candidate, Lag, PolicyInput};
pub use scoring::{Regression, Scores};
pub use verify::Verifier;
