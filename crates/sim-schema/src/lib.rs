//! Scenario Schema Contracts
//!
//! Versioned, validated contracts shared by every agent and the Director.
//!
//! # Core Concepts
//!
//! - [`ScenarioOutline`]: compiled goals, actors, triggers and pacing
//! - [`DirectorSettings`]: intensity, cadence, targets and budgets
//! - [`DirectorState`]: the Director's running assessment
//! - [`Transcript`]: append-only dialogue turns
//! - [`ParsedScenario`]: normalized parser output, repaired via [`ParsedData`]
//! - [`SchemaRegistry`]: `validate` / `strict` entry point with defaults,
//!   version checks and JSON Schema export
//!
//! # Example
//!
//! ```rust,ignore
//! use sim_schema::{SchemaKind, SchemaRegistry, Validation};
//!
//! let registry = SchemaRegistry::new();
//! match registry.validate(SchemaKind::DirectorSettings, &payload) {
//!     Validation::Valid(normalized) => store(normalized),
//!     Validation::Invalid(errors) => report(errors),
//! }
//! ```

mod error;
mod hash;
mod intervention;
mod outline;
mod parsed;
mod registry;
mod settings;
mod state;
mod transcript;
mod validation;
mod version;

pub use error::{FieldError, SchemaError};
pub use hash::{HashError, ValueHash};
pub use intervention::{ActorAction, Intervention, InterventionKind};
pub use outline::{
    ActorTrigger, AdaptationConstraints, Assessment, AssessmentMethod, DirectorTrigger,
    Encounter, EvidenceDepth, Goal, HiddenFact, Lesson, Milestone, OutlineActor,
    ProgressTracking, ScenarioOutline, StructureBlock, StructurePhase, SuccessCriteria,
    SuggestedStructure, TriggerCondition,
};
pub use parsed::{
    ParsedActor, ParsedData, ParsedScenario, Repair, ScenarioContext, ScenarioType,
    DEFAULT_INDUSTRY, NOT_SPECIFIED, NO_ACTOR_DESCRIPTION, NO_SITUATION, UNKNOWN_ROLE,
};
pub use registry::{Contract, SchemaKind, SchemaRegistry, Validation, OUTLINE_VERSION};
pub use settings::{
    DirectorSettings, EvaluationCadence, Intensity, ObjectiveTarget, TargetPriority,
    VerificationPolicy,
};
pub use state::{
    ActorEngagement, DirectorState, GoalStatus, PendingEvent, REGRESSION_NOTE_PREFIX,
};
pub use transcript::{Role, Transcript, Turn};
pub use validation::{check, Validate, Violations};
pub use version::{Compatibility, SchemaVersion};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
