//! Session errors and their user-facing classification

use std::fmt;

use serde::{Deserialize, Serialize};
use sim_agents::{AgentError, LlmError};
use sim_blackboard::{BoardError, Phase};
use sim_director::DirectorError;
use sim_schema::SchemaError;

use crate::store::StoreError;

/// Session ids are ULIDs
pub type SessionId = ulid::Ulid;

/// Coarse failure class reported to callers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Required input absent
    MissingInput,
    /// Agent lacks a grant
    PermissionDenied,
    /// Operation not allowed in the current phase
    PhaseViolation,
    /// Payload failed its contract
    SchemaError,
    /// LLM provider failure
    LlmTransportError,
    /// Director cap hit
    BudgetExceeded,
    /// Intervention failed its self-check
    VerificationFailed,
    /// Unknown session or document
    NotFound,
    /// Turn exceeded its deadline
    Timeout,
    /// Request rejected before any work was done
    InvalidRequest,
    /// Snapshot or document store failure
    Storage,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::MissingInput => "missing_input",
            Self::PermissionDenied => "permission_denied",
            Self::PhaseViolation => "phase_violation",
            Self::SchemaError => "schema_error",
            Self::LlmTransportError => "llm_transport_error",
            Self::BudgetExceeded => "budget_exceeded",
            Self::VerificationFailed => "verification_failed",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::InvalidRequest => "invalid_request",
            Self::Storage => "storage",
        })
    }
}

/// Failures of session operations
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// No session with this id
    #[error("session {0} not found")]
    NotFound(SessionId),

    /// Operation needs a RUNNING session
    #[error("session is {0}, not RUNNING")]
    NotRunning(Phase),

    /// Request rejected up front
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Transcript reached its configured cap
    #[error("transcript is full ({limit} turns)")]
    TranscriptFull {
        /// Configured cap
        limit: usize,
    },

    /// Advisor call exceeded the turn deadline; nothing was committed
    #[error("turn timed out after {ms}ms")]
    TurnTimeout {
        /// Configured deadline
        ms: u64,
    },

    /// Blackboard rejected an operation
    #[error(transparent)]
    Board(#[from] BoardError),

    /// Parser or compiler failed
    #[error(transparent)]
    Agent(#[from] AgentError),

    /// Advisor call failed
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Director failed in a way that does not degrade
    #[error(transparent)]
    Director(#[from] DirectorError),

    /// Payload failed its contract
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// Snapshot or document store failed
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Export or snapshot encoding failed
    #[error("encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

fn board_kind(e: &BoardError) -> ErrorKind {
    match e {
        BoardError::PermissionDenied { .. } => ErrorKind::PermissionDenied,
        BoardError::PhaseViolation { .. } => ErrorKind::PhaseViolation,
        BoardError::Schema { .. } | BoardError::Decode { .. } => ErrorKind::SchemaError,
        BoardError::DuplicateBinding(_) | BoardError::IntegrityViolation { .. } => {
            ErrorKind::Storage
        }
    }
}

impl SessionError {
    /// Classification for callers
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::NotRunning(_) => ErrorKind::PhaseViolation,
            Self::InvalidRequest(_) | Self::TranscriptFull { .. } => ErrorKind::InvalidRequest,
            Self::TurnTimeout { .. } => ErrorKind::Timeout,
            Self::Board(e) => board_kind(e),
            Self::Agent(e) => match e {
                AgentError::MissingInput { .. } => ErrorKind::MissingInput,
                AgentError::Board(e) => board_kind(e),
                AgentError::Llm(_) => ErrorKind::LlmTransportError,
                AgentError::Schema(_) => ErrorKind::SchemaError,
            },
            Self::Llm(_) => ErrorKind::LlmTransportError,
            Self::Director(e) => match e {
                DirectorError::BudgetExceeded(_) => ErrorKind::BudgetExceeded,
                DirectorError::VerificationFailed { .. } => ErrorKind::VerificationFailed,
                DirectorError::Llm(_) => ErrorKind::LlmTransportError,
                DirectorError::Board(e) => board_kind(e),
                DirectorError::Schema(_) => ErrorKind::SchemaError,
                DirectorError::MissingInput(_) => ErrorKind::MissingInput,
            },
            Self::Schema(_) => ErrorKind::SchemaError,
            Self::Store(StoreError::NotFound(_)) => ErrorKind::NotFound,
            Self::Store(_) | Self::Encode(_) => ErrorKind::Storage,
        }
    }

    /// Message safe to show an end user; never includes provider output,
    /// keys or payloads
    #[must_use]
    pub fn safe_message(&self) -> String {
        match self {
            Self::NotFound(id) => format!("Session {id} does not exist."),
            Self::NotRunning(phase) => {
                format!("The session is {phase} and cannot accept this request.")
            }
            Self::InvalidRequest(reason) => format!("Invalid request: {reason}."),
            Self::TranscriptFull { limit } => {
                format!("The conversation reached its limit of {limit} messages.")
            }
            Self::TurnTimeout { .. } => {
                "The advisor took too long to respond. Please try again.".to_string()
            }
            _ => match self.kind() {
                ErrorKind::LlmTransportError => {
                    "The language model is unavailable. Please try again.".to_string()
                }
                ErrorKind::SchemaError => "The scenario data is invalid.".to_string(),
                ErrorKind::MissingInput => "The scenario is incomplete.".to_string(),
                ErrorKind::NotFound => "The requested item does not exist.".to_string(),
                ErrorKind::Storage => "Session storage failed.".to_string(),
                _ => "The request could not be completed.".to_string(),
            },
        }
    }

    /// Whether retrying the same request may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::TurnTimeout { .. } => true,
            Self::Llm(e) => e.is_retryable(),
            Self::Agent(e) => e.is_retryable(),
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sim_blackboard::{Access, AgentId};

    #[test]
    fn kinds_follow_the_layer_below() {
        let denied = SessionError::from(BoardError::PermissionDenied {
            agent: AgentId::new("x"),
            key: "transcript".into(),
            access: Access::Write,
        });
        assert_eq!(denied.kind(), ErrorKind::PermissionDenied);

        let missing = SessionError::from(AgentError::MissingInput {
            agent: AgentId::new("parser"),
            key: "raw_input".into(),
        });
        assert_eq!(missing.kind(), ErrorKind::MissingInput);

        let llm = SessionError::from(LlmError::Transport("reset".into()));
        assert_eq!(llm.kind(), ErrorKind::LlmTransportError);
        assert!(llm.is_retryable());
    }

    #[test]
    fn safe_messages_hide_details() {
        let e = SessionError::from(LlmError::Malformed("secret provider body".into()));
        assert!(!e.safe_message().contains("secret"));
        assert_eq!(ErrorKind::Timeout.to_string(), "timeout");
    }
}
