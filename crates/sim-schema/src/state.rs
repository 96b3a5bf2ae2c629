//! Director State contract
//!
//! The Director's running assessment of a session. Progress per goal only
//! moves forward unless a note starting with [`REGRESSION_NOTE_PREFIX`] is
//! recorded in the same evaluation.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::outline::ScenarioOutline;
use crate::validation::{Validate, Violations};

/// Notes recording an allowed progress regression start with this prefix
pub const REGRESSION_NOTE_PREFIX: &str = "regression:";

const INJECTED_EVENT_PREFIX: &str = "event:";

/// Completion status of a goal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    /// No milestone reached yet
    #[default]
    Pending,
    /// At least one milestone reached
    InProgress,
    /// Fully demonstrated; terminal
    Achieved,
}

impl GoalStatus {
    /// Statuses reachable from `self`
    #[must_use]
    pub const fn allowed_transitions(self) -> &'static [GoalStatus] {
        match self {
            Self::Pending => &[Self::InProgress],
            Self::InProgress => &[Self::Achieved],
            Self::Achieved => &[],
        }
    }

    /// Whether `self -> to` is a legal transition
    #[must_use]
    pub fn can_transition_to(self, to: GoalStatus) -> bool {
        self.allowed_transitions().contains(&to)
    }

    /// Whether no further transitions are possible
    #[inline]
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Achieved)
    }
}

/// How much an actor speaks and how well it follows direction
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActorEngagement {
    /// Share of recent advisor output voiced by this actor
    pub talk_time: f64,
    /// How closely the actor follows direction
    pub compliance: f64,
}

/// An event waiting to be injected into the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PendingEvent {
    /// Unique id
    pub id: String,
    /// What happens
    pub description: String,
    /// Inject once this many student messages have been exchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at_message: Option<u64>,
    /// Inject once this wall-clock time has passed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_at: Option<DateTime<Utc>>,
}

impl PendingEvent {
    /// Whether the event is due at `student_messages` / `now`
    #[must_use]
    pub fn is_due(&self, student_messages: u64, now: DateTime<Utc>) -> bool {
        match (self.scheduled_at_message, self.scheduled_at) {
            (None, None) => true,
            (message, at) => {
                message.is_some_and(|m| student_messages >= m) || at.is_some_and(|t| now >= t)
            }
        }
    }
}

/// The Director's assessment of a session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DirectorState {
    /// Transcript seq of the last message covered by an evaluation
    #[serde(default)]
    pub last_evaluated_message: u64,
    /// How far the student has drifted from the scenario
    pub divergence_score: f64,
    /// Dramatic tension of the conversation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tension_score: Option<f64>,
    /// Goal id to progress in `[0, 1]`
    #[serde(default)]
    pub objective_progress: BTreeMap<String, f64>,
    /// Actor id to engagement
    #[serde(default)]
    pub actor_engagement: BTreeMap<String, ActorEngagement>,
    /// Events waiting to be injected
    #[serde(default)]
    pub pending_events: Vec<PendingEvent>,
    /// Free-form reasoning trace
    #[serde(default)]
    pub notes: Vec<String>,
    /// Goal id to completion status
    #[serde(default)]
    pub goal_status: BTreeMap<String, GoalStatus>,
    /// Actor and director trigger ids already acted on, plus injected
    /// event ids under an `event:` prefix
    #[serde(default)]
    pub fired_triggers: Vec<String>,
    /// Hidden fact ids already disclosed
    #[serde(default)]
    pub revealed_facts: Vec<String>,
    /// Completed evaluations
    #[serde(default)]
    pub evaluations: u64,
    /// Wall-clock time of the last completed evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_evaluated_at: Option<DateTime<Utc>>,
}

impl DirectorState {
    /// Fresh state for `outline`: zero progress and pending status per goal
    #[must_use]
    pub fn initial(outline: &ScenarioOutline) -> Self {
        Self {
            objective_progress: outline.goal_ids().map(|g| (g.to_string(), 0.0)).collect(),
            goal_status: outline
                .goal_ids()
                .map(|g| (g.to_string(), GoalStatus::Pending))
                .collect(),
            ..Self::default()
        }
    }

    /// Progress recorded for `goal_id`, zero when unknown
    #[must_use]
    pub fn progress(&self, goal_id: &str) -> f64 {
        self.objective_progress.get(goal_id).copied().unwrap_or(0.0)
    }

    /// Status recorded for `goal_id`
    #[must_use]
    pub fn status(&self, goal_id: &str) -> GoalStatus {
        self.goal_status.get(goal_id).copied().unwrap_or_default()
    }

    /// Append a note
    pub fn note(&mut self, note: impl Into<String>) {
        self.notes.push(note.into());
    }

    /// Whether a regression note for `goal_id` exists among `notes[from..]`
    #[must_use]
    pub fn has_regression_note(&self, goal_id: &str, from: usize) -> bool {
        self.notes.iter().skip(from).any(|n| {
            n.strip_prefix(REGRESSION_NOTE_PREFIX)
                .is_some_and(|rest| rest.trim_start().starts_with(goal_id))
        })
    }

    /// Whether trigger `id` has already fired
    #[must_use]
    pub fn has_fired(&self, id: &str) -> bool {
        self.fired_triggers.iter().any(|t| t == id)
    }

    /// Whether pending event `id` has already been injected
    #[must_use]
    pub fn has_injected(&self, id: &str) -> bool {
        self.fired_triggers
            .iter()
            .any(|t| t.strip_prefix(INJECTED_EVENT_PREFIX) == Some(id))
    }

    /// Drop event `id` from the queue and remember it was injected
    pub fn mark_injected(&mut self, id: &str) {
        self.pending_events.retain(|e| e.id != id);
        if !self.has_injected(id) {
            self.fired_triggers.push(format!("{INJECTED_EVENT_PREFIX}{id}"));
        }
    }

    /// Whether fact `id` has already been revealed
    #[must_use]
    pub fn has_revealed(&self, id: &str) -> bool {
        self.revealed_facts.iter().any(|f| f == id)
    }

    /// Zero every goal's progress and reset statuses
    pub fn reset_progress(&mut self) {
        for value in self.objective_progress.values_mut() {
            *value = 0.0;
        }
        for status in self.goal_status.values_mut() {
            *status = GoalStatus::Pending;
        }
        self.last_evaluated_message = 0;
        self.last_evaluated_at = None;
        self.fired_triggers.clear();
        self.revealed_facts.clear();
        self.pending_events.clear();
    }

    /// Add zero-progress entries for goals that appeared in `outline`
    pub fn sync_goals(&mut self, outline: &ScenarioOutline) {
        for goal in outline.goal_ids() {
            self.objective_progress.entry(goal.to_string()).or_insert(0.0);
            self.goal_status.entry(goal.to_string()).or_default();
        }
    }
}

impl Validate for DirectorState {
    fn validate(&self, v: &mut Violations) {
        v.unit_interval("divergence_score", self.divergence_score);
        if let Some(t) = self.tension_score {
            v.unit_interval("tension_score", t);
        }
        for (goal, progress) in &self.objective_progress {
            v.unit_interval(format!("objective_progress.{goal}"), *progress);
        }
        for (actor, engagement) in &self.actor_engagement {
            v.unit_interval(
                format!("actor_engagement.{actor}.talk_time"),
                engagement.talk_time,
            );
            v.unit_interval(
                format!("actor_engagement.{actor}.compliance"),
                engagement.compliance,
            );
        }
        for (i, event) in self.pending_events.iter().enumerate() {
            v.non_blank(format!("pending_events[{i}].id"), &event.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::check;
    use serde_json::json;

    #[test]
    fn goal_status_transitions() {
        assert!(GoalStatus::Pending.can_transition_to(GoalStatus::InProgress));
        assert!(GoalStatus::InProgress.can_transition_to(GoalStatus::Achieved));
        assert!(!GoalStatus::Pending.can_transition_to(GoalStatus::Achieved));
        assert!(!GoalStatus::Achieved.can_transition_to(GoalStatus::InProgress));
        assert!(GoalStatus::Achieved.is_terminal());
    }

    #[test]
    fn minimal_state_deserializes() {
        let state: DirectorState =
            serde_json::from_value(json!({"divergence_score": 0.2})).unwrap();
        assert_eq!(state.last_evaluated_message, 0);
        assert!(state.objective_progress.is_empty());
        assert!(check(&state).is_ok());
    }

    #[test]
    fn rejects_out_of_range_progress() {
        let mut state = DirectorState::default();
        state.objective_progress.insert("g1".into(), 1.2);
        state.tension_score = Some(-0.1);
        assert_eq!(check(&state).unwrap_err().len(), 2);
    }

    #[test]
    fn regression_note_lookup() {
        let mut state = DirectorState::default();
        state.note("scored turn 4");
        state.note("regression: g2 student retracted their plan");
        assert!(state.has_regression_note("g2", 0));
        assert!(!state.has_regression_note("g2", 2));
        assert!(!state.has_regression_note("g1", 0));
    }

    #[test]
    fn pending_event_due() {
        let now = Utc::now();
        let by_message = PendingEvent {
            id: "e1".into(),
            description: "Board call".into(),
            scheduled_at_message: Some(4),
            scheduled_at: None,
        };
        assert!(!by_message.is_due(3, now));
        assert!(by_message.is_due(4, now));

        let unscheduled = PendingEvent {
            scheduled_at_message: None,
            ..by_message
        };
        assert!(unscheduled.is_due(0, now));
    }
}
