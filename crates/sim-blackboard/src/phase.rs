//! Blackboard lifecycle phases and the per-phase key policy
//!
//! ```text
//! IDLE ──first write──▶ BUILDING ──outline+settings valid──▶ RUNNING ──close──▶ TERMINATED
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BoardError;
use crate::keys::{
    DIRECTOR_SETTINGS, DIRECTOR_STATE, INSTRUCTIONS, PARSED_DATA, PENDING_INTERVENTION,
    RAW_INPUT, SCENARIO_OUTLINE, TRANSCRIPT,
};

/// Global lifecycle state of a blackboard
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// Nothing written yet
    #[default]
    Idle,
    /// Scenario being compiled
    Building,
    /// Session in progress
    Running,
    /// Session closed; terminal
    Terminated,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "IDLE",
            Self::Building => "BUILDING",
            Self::Running => "RUNNING",
            Self::Terminated => "TERMINATED",
        })
    }
}

/// Phases reachable from `from`
#[must_use]
pub fn allowed_transitions(from: Phase) -> &'static [Phase] {
    match from {
        Phase::Idle => &[Phase::Building],
        Phase::Building => &[Phase::Running],
        Phase::Running => &[Phase::Terminated],
        Phase::Terminated => &[],
    }
}

/// Check that `from -> to` is a legal transition
///
/// # Errors
/// Returns [`BoardError::PhaseViolation`] for any transition outside the table.
pub fn validate_transition(from: Phase, to: Phase) -> Result<(), BoardError> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(BoardError::phase(from, format!("illegal transition {from} -> {to}")))
    }
}

/// Which keys may be written in a phase
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyRule {
    /// Only the listed keys
    Only(BTreeSet<String>),
    /// Every key except the listed ones
    AllExcept(BTreeSet<String>),
    /// No key
    Nothing,
}

impl KeyRule {
    /// Only the listed keys
    pub fn only<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Only(keys.into_iter().map(Into::into).collect())
    }

    /// Every key except the listed ones
    pub fn all_except<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::AllExcept(keys.into_iter().map(Into::into).collect())
    }

    /// Whether `key` may be written
    #[must_use]
    pub fn permits(&self, key: &str) -> bool {
        match self {
            Self::Only(keys) => keys.contains(key),
            Self::AllExcept(keys) => !keys.contains(key),
            Self::Nothing => false,
        }
    }
}

/// Writable keys per phase; TERMINATED never permits writes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhasePolicy {
    idle: KeyRule,
    building: KeyRule,
    running: KeyRule,
}

impl Default for PhasePolicy {
    fn default() -> Self {
        Self {
            idle: KeyRule::only([
                RAW_INPUT,
                INSTRUCTIONS,
                PARSED_DATA,
                SCENARIO_OUTLINE,
                DIRECTOR_SETTINGS,
            ]),
            building: KeyRule::all_except([TRANSCRIPT, DIRECTOR_STATE, PENDING_INTERVENTION]),
            running: KeyRule::all_except([RAW_INPUT, PARSED_DATA]),
        }
    }
}

impl PhasePolicy {
    /// Policy permitting every key in every live phase
    #[must_use]
    pub fn permissive() -> Self {
        Self {
            idle: KeyRule::AllExcept(BTreeSet::new()),
            building: KeyRule::AllExcept(BTreeSet::new()),
            running: KeyRule::AllExcept(BTreeSet::new()),
        }
    }

    /// Replace the rule for `phase`; TERMINATED is ignored
    #[must_use]
    pub fn with_rule(mut self, phase: Phase, rule: KeyRule) -> Self {
        match phase {
            Phase::Idle => self.idle = rule,
            Phase::Building => self.building = rule,
            Phase::Running => self.running = rule,
            Phase::Terminated => {}
        }
        self
    }

    /// Whether `key` may be written during `phase`
    #[must_use]
    pub fn permits(&self, phase: Phase, key: &str) -> bool {
        match phase {
            Phase::Idle => self.idle.permits(key),
            Phase::Building => self.building.permits(key),
            Phase::Running => self.running.permits(key),
            Phase::Terminated => false,
        }
    }
}
