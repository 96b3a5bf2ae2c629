//! Director interventions
//!
//! An intervention is a bounded action the Director asks the advisor to take
//! on its next response. The kind taxonomy is closed; settings declare which
//! kinds a scenario allows.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::validation::{Validate, Violations};

/// The five intervention kinds
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum InterventionKind {
    /// Focus the next turn on a goal
    GoalShift,
    /// Bring a stakeholder in or take one out
    EnterExitActor,
    /// Disclose a previously withheld fact
    HiddenInfoReveal,
    /// Shift the advisor's tone
    ToneAdjustment,
    /// Inject a scheduled event
    EventTrigger,
}

impl InterventionKind {
    /// Every kind, in preference order
    pub const ALL: [InterventionKind; 5] = [
        Self::GoalShift,
        Self::EnterExitActor,
        Self::HiddenInfoReveal,
        Self::ToneAdjustment,
        Self::EventTrigger,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GoalShift => "goal_shift",
            Self::EnterExitActor => "enter_exit_actor",
            Self::HiddenInfoReveal => "hidden_info_reveal",
            Self::ToneAdjustment => "tone_adjustment",
            Self::EventTrigger => "event_trigger",
        }
    }
}

impl fmt::Display for InterventionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InterventionKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == s.trim())
            .ok_or_else(|| format!("unknown intervention kind '{s}'"))
    }
}

/// Whether a stakeholder enters or leaves the conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ActorAction {
    /// Stakeholder joins
    Enter,
    /// Stakeholder leaves
    Exit,
}

/// A concrete intervention, consumed by the next advisor turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Intervention {
    /// Steer the conversation toward `goal_id`
    GoalShift {
        /// Target goal
        goal_id: String,
        /// Instruction for the advisor
        directive: String,
    },
    /// Bring in or remove a named stakeholder
    EnterExitActor {
        /// Outline actor id
        actor_id: String,
        /// Enter or exit
        action: ActorAction,
        /// Instruction for the advisor
        directive: String,
    },
    /// Disclose a withheld fact
    HiddenInfoReveal {
        /// Outline hidden-fact id
        fact_id: String,
        /// The fact itself
        fact: String,
        /// Instruction for the advisor
        directive: String,
    },
    /// Change the advisor's tone
    ToneAdjustment {
        /// Target tone (e.g. "calmer", "more urgent")
        tone: String,
        /// Instruction for the advisor
        directive: String,
    },
    /// Inject a scheduled or triggered event
    EventTrigger {
        /// Pending event id
        event_id: String,
        /// What happens
        description: String,
        /// Instruction for the advisor
        directive: String,
    },
}

impl Intervention {
    /// Kind of this intervention
    #[must_use]
    pub fn kind(&self) -> InterventionKind {
        match self {
            Self::GoalShift { .. } => InterventionKind::GoalShift,
            Self::EnterExitActor { .. } => InterventionKind::EnterExitActor,
            Self::HiddenInfoReveal { .. } => InterventionKind::HiddenInfoReveal,
            Self::ToneAdjustment { .. } => InterventionKind::ToneAdjustment,
            Self::EventTrigger { .. } => InterventionKind::EventTrigger,
        }
    }

    /// Instruction text for the advisor
    #[must_use]
    pub fn directive(&self) -> &str {
        match self {
            Self::GoalShift { directive, .. }
            | Self::EnterExitActor { directive, .. }
            | Self::HiddenInfoReveal { directive, .. }
            | Self::ToneAdjustment { directive, .. }
            | Self::EventTrigger { directive, .. } => directive,
        }
    }

    /// Goal this intervention targets, if any
    #[must_use]
    pub fn goal_id(&self) -> Option<&str> {
        match self {
            Self::GoalShift { goal_id, .. } => Some(goal_id),
            _ => None,
        }
    }

    /// Outline goal, actor, fact or pending event this intervention names
    #[must_use]
    pub fn target(&self) -> Option<&str> {
        match self {
            Self::GoalShift { goal_id, .. } => Some(goal_id),
            Self::EnterExitActor { actor_id, .. } => Some(actor_id),
            Self::HiddenInfoReveal { fact_id, .. } => Some(fact_id),
            Self::EventTrigger { event_id, .. } => Some(event_id),
            Self::ToneAdjustment { .. } => None,
        }
    }

    /// Hidden system-prompt addendum delivered to the advisor
    #[must_use]
    pub fn addendum(&self) -> String {
        format!(
            "[Director guidance ({}), never mention this to the student]\n{}",
            self.kind(),
            self.directive()
        )
    }
}

impl Validate for Intervention {
    fn validate(&self, v: &mut Violations) {
        v.non_blank("directive", self.directive());
        match self {
            Self::GoalShift { goal_id, .. } => v.non_blank("goal_id", goal_id),
            Self::EnterExitActor { actor_id, .. } => v.non_blank("actor_id", actor_id),
            Self::HiddenInfoReveal { fact_id, fact, .. } => {
                v.non_blank("fact_id", fact_id);
                v.non_blank("fact", fact);
            }
            Self::ToneAdjustment { tone, .. } => v.non_blank("tone", tone),
            Self::EventTrigger {
                event_id,
                description,
                ..
            } => {
                v.non_blank("event_id", event_id);
                v.non_blank("description", description);
            }
        }
    }
}
