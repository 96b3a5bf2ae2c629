//! Blackboard errors

use sim_schema::SchemaError;

use crate::phase::Phase;
use crate::types::{Access, AgentId};

/// Failures reported by blackboard operations
///
/// None of these are retried internally, and a rejected operation leaves the
/// audit log unchanged.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BoardError {
    /// Agent lacks the grant for this access
    #[error("permission denied: agent '{agent}' may not {access} '{key}'")]
    PermissionDenied {
        /// Offending agent
        agent: AgentId,
        /// Key (or event name for broadcasts)
        key: String,
        /// Attempted access
        access: Access,
    },

    /// Operation not allowed in the current phase
    #[error("phase violation in {phase}: {detail}")]
    PhaseViolation {
        /// Phase at the time of the attempt
        phase: Phase,
        /// What was attempted
        detail: String,
    },

    /// Value rejected by the schema bound to the key
    #[error("schema error on '{key}': {source}")]
    Schema {
        /// Bound key
        key: String,
        /// Validation failure
        #[source]
        source: SchemaError,
    },

    /// Two schema bindings for one key
    #[error("duplicate schema binding for key '{0}'")]
    DuplicateBinding(String),

    /// Audit chain does not verify
    #[error("audit log integrity violation at seq {seq}")]
    IntegrityViolation {
        /// First entry that failed to verify
        seq: u64,
    },

    /// Stored value does not decode as the requested type
    #[error("cannot decode '{key}': {message}")]
    Decode {
        /// Key read
        key: String,
        /// Decoder message
        message: String,
    },
}

impl BoardError {
    /// Create a phase violation
    pub fn phase(phase: Phase, detail: impl Into<String>) -> Self {
        Self::PhaseViolation {
            phase,
            detail: detail.into(),
        }
    }

    /// Whether this is a permission failure
    #[inline]
    #[must_use]
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Whether this is a phase failure
    #[inline]
    #[must_use]
    pub fn is_phase_violation(&self) -> bool {
        matches!(self, Self::PhaseViolation { .. })
    }
}
