//! When the director runs
//!
//! An evaluation is due when any configured clause holds:
//!
//! - student messages since `last_evaluated_message` ≥ `message_interval`
//! - an `event_triggers` event was broadcast since the last evaluation
//! - `time_interval_seconds` have passed since the last evaluation
//!
//! and never twice for the same transcript position.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sim_schema::{DirectorSettings, DirectorState, Transcript};

/// Clause that made an evaluation due
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "clause", rename_all = "snake_case")]
pub enum CadenceReason {
    /// Enough student messages
    MessageInterval {
        /// Student messages since the last evaluation
        since: u64,
    },
    /// A configured event was observed
    Event {
        /// Event name
        name: String,
    },
    /// Enough wall-clock time
    TimeElapsed {
        /// Seconds since the reference point
        seconds: i64,
    },
    /// Caller asked for an evaluation outright
    Forced,
}

impl fmt::Display for CadenceReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MessageInterval { since } => write!(f, "{since} student message(s)"),
            Self::Event { name } => write!(f, "event '{name}'"),
            Self::TimeElapsed { seconds } => write!(f, "{seconds}s elapsed"),
            Self::Forced => f.write_str("forced"),
        }
    }
}

/// Everything the cadence check looks at
#[derive(Debug, Clone, Copy)]
pub struct CadenceInput<'a> {
    /// Active settings
    pub settings: &'a DirectorSettings,
    /// Current director state
    pub state: &'a DirectorState,
    /// Current transcript
    pub transcript: &'a Transcript,
    /// Events broadcast since the last evaluation, oldest first
    pub events: &'a [String],
    /// Transcript seq covered by the last evaluation attempt, if any
    pub last_attempted: Option<u64>,
    /// Clock
    pub now: DateTime<Utc>,
}

/// First satisfied clause, or `None` when no evaluation is due
#[must_use]
pub fn due(input: &CadenceInput<'_>) -> Option<CadenceReason> {
    let transcript = input.transcript;
    if transcript.is_empty() || input.last_attempted == Some(transcript.last_seq()) {
        return None;
    }
    let cadence = &input.settings.evaluation_cadence;

    if let Some(interval) = cadence.message_interval {
        let since = transcript.student_turns_since(input.state.last_evaluated_message) as u64;
        if since >= interval {
            return Some(CadenceReason::MessageInterval { since });
        }
    }

    if let Some(name) = input.events.iter().find(|e| cadence.triggers_on(e)) {
        return Some(CadenceReason::Event { name: name.clone() });
    }

    if let Some(interval) = cadence.time_interval_seconds {
        let reference = input
            .state
            .last_evaluated_at
            .or_else(|| transcript.turns().first().map(|t| t.ts));
        if let Some(reference) = reference {
            let seconds = (input.now - reference).num_seconds();
            if seconds >= i64::try_from(interval).unwrap_or(i64::MAX) {
                return Some(CadenceReason::TimeElapsed { seconds });
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sim_schema::{EvaluationCadence, Role};

    fn transcript(students: usize) -> Transcript {
        let mut t = Transcript::new();
        for i in 0..students {
            t.push(Role::Student, format!("q{i}"));
            t.push(Role::Advisor, format!("a{i}"));
        }
        t
    }

    fn input<'a>(
        settings: &'a DirectorSettings,
        state: &'a DirectorState,
        transcript: &'a Transcript,
        events: &'a [String],
    ) -> CadenceInput<'a> {
        CadenceInput {
            settings,
            state,
            transcript,
            events,
            last_attempted: None,
            now: Utc::now(),
        }
    }

    #[test]
    fn message_interval_counts_student_turns() {
        let settings = DirectorSettings::default();
        let state = DirectorState::default();
        let two = transcript(2);
        assert_eq!(due(&input(&settings, &state, &two, &[])), None);
        let three = transcript(3);
        assert_eq!(
            due(&input(&settings, &state, &three, &[])),
            Some(CadenceReason::MessageInterval { since: 3 })
        );
    }

    #[test]
    fn counts_only_since_last_evaluation() {
        let settings = DirectorSettings::default();
        let t = transcript(4);
        let state = DirectorState {
            last_evaluated_message: 6,
            ..DirectorState::default()
        };
        assert_eq!(due(&input(&settings, &state, &t, &[])), None);
    }

    #[test]
    fn configured_events_trigger() {
        let settings = DirectorSettings::default().with_cadence(EvaluationCadence {
            message_interval: None,
            event_triggers: Some(vec!["student_stuck".into()]),
            time_interval_seconds: None,
        });
        let state = DirectorState::default();
        let t = transcript(1);
        let events = vec!["parsing_complete".to_string()];
        assert_eq!(due(&input(&settings, &state, &t, &events)), None);
        let events = vec!["student_stuck".to_string()];
        assert_eq!(
            due(&input(&settings, &state, &t, &events)),
            Some(CadenceReason::Event {
                name: "student_stuck".into()
            })
        );
    }

    #[test]
    fn time_clause_uses_last_evaluation() {
        let settings = DirectorSettings::default().with_cadence(EvaluationCadence {
            message_interval: None,
            event_triggers: None,
            time_interval_seconds: Some(60),
        });
        let t = transcript(1);
        let now = Utc::now();
        let state = DirectorState {
            last_evaluated_at: Some(now - Duration::seconds(30)),
            ..DirectorState::default()
        };
        let mut check = input(&settings, &state, &t, &[]);
        check.now = now;
        assert_eq!(due(&check), None);
        check.now = now + Duration::seconds(31);
        assert!(matches!(due(&check), Some(CadenceReason::TimeElapsed { .. })));
    }

    #[test]
    fn never_twice_for_same_position() {
        let settings = DirectorSettings::default();
        let state = DirectorState::default();
        let t = transcript(5);
        let mut check = input(&settings, &state, &t, &[]);
        assert!(due(&check).is_some());
        check.last_attempted = Some(t.last_seq());
        assert_eq!(due(&check), None);
    }

    #[test]
    fn empty_transcript_is_never_due() {
        let settings = DirectorSettings::default().with_cadence(EvaluationCadence {
            message_interval: None,
            event_triggers: Some(vec!["x".into()]),
            time_interval_seconds: None,
        });
        let state = DirectorState::default();
        let t = Transcript::new();
        let events = vec!["x".to_string()];
        assert_eq!(due(&input(&settings, &state, &t, &events)), None);
    }
}
