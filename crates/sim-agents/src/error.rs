//! Error types for agents and the LLM seam

use sim_blackboard::{AgentId, BoardError};
use sim_schema::SchemaError;

/// Failures of an LLM provider call
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum LlmError {
    /// Provider unreachable or returned a transport-level failure
    #[error("llm transport error: {0}")]
    Transport(String),

    /// Provider answered but the body was not what was asked for
    #[error("llm returned malformed output: {0}")]
    Malformed(String),

    /// Provider refused the request (quota, auth, content policy)
    #[error("llm rejected request: {0}")]
    Rejected(String),
}

impl LlmError {
    /// Whether a retry may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Malformed(_))
    }
}

/// Failures of an agent execution
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AgentError {
    /// A declared input key holds no value
    #[error("agent '{agent}' is missing required input '{key}'")]
    MissingInput {
        /// Executing agent
        agent: AgentId,
        /// Absent key
        key: String,
    },

    /// Blackboard rejected an operation
    #[error(transparent)]
    Board(#[from] BoardError),

    /// LLM call failed; propagated unchanged
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// An input or output failed its contract
    #[error(transparent)]
    Schema(#[from] SchemaError),
}

impl AgentError {
    /// Whether a retry may succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Llm(e) => e.is_retryable(),
            _ => false,
        }
    }
}
