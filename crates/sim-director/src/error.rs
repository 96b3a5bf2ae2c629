//! Director errors

use sim_agents::LlmError;
use sim_blackboard::BoardError;
use sim_schema::SchemaError;

use crate::budget::BudgetBreach;

/// Failures of a director evaluation
///
/// Budget, verification and LLM failures degrade to "no intervention this
/// round"; blackboard and schema failures are always surfaced.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DirectorError {
    /// Latency or cost cap hit mid-evaluation
    #[error("director budget exceeded: {0}")]
    BudgetExceeded(BudgetBreach),

    /// Intervention still rejected by the self-check after every retry
    #[error("intervention failed verification after {attempts} attempt(s)")]
    VerificationFailed {
        /// Verification passes made
        attempts: u32,
    },

    /// LLM call failed
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// Blackboard rejected a read or write
    #[error(transparent)]
    Board(#[from] BoardError),

    /// A stored artifact failed its contract
    #[error(transparent)]
    Schema(#[from] SchemaError),

    /// A key the director depends on holds no value
    #[error("director input '{0}' is missing")]
    MissingInput(&'static str),
}

impl DirectorError {
    /// Whether the evaluation should degrade to no intervention instead of
    /// failing the turn
    #[must_use]
    pub fn degrades(&self) -> bool {
        matches!(
            self,
            Self::BudgetExceeded(_) | Self::VerificationFailed { .. } | Self::Llm(_)
        )
    }
}

impl From<BudgetBreach> for DirectorError {
    fn from(breach: BudgetBreach) -> Self {
        Self::BudgetExceeded(breach)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_soft_failures_degrade() {
        assert!(DirectorError::from(BudgetBreach::Latency { limit_ms: 100 }).degrades());
        assert!(DirectorError::VerificationFailed { attempts: 2 }.degrades());
        assert!(DirectorError::Llm(LlmError::Transport("down".into())).degrades());
        assert!(!DirectorError::MissingInput("transcript").degrades());
    }
}
