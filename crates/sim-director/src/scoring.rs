//! Scoring call: progress, divergence and tension from the recent transcript

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde_json::Value;
use sim_agents::{LlmError, LlmRequest, Purpose};
use sim_schema::{
    ActorEngagement, DirectorState, PendingEvent, Role, ScenarioOutline, Transcript,
    REGRESSION_NOTE_PREFIX,
};
use tracing::debug;

/// Explicit progress decrease requested by the scorer
#[derive(Debug, Clone, PartialEq)]
pub struct Regression {
    /// Goal whose progress drops
    pub goal_id: String,
    /// Why
    pub reason: String,
}

/// Parsed scoring answer, clamped to `[0, 1]`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scores {
    /// Goal id to scored progress; unknown goals are dropped
    pub objective_progress: BTreeMap<String, f64>,
    /// Drift from the scenario
    pub divergence_score: Option<f64>,
    /// Dramatic tension
    pub tension_score: Option<f64>,
    /// Actor id to engagement; unknown actors are dropped
    pub actor_engagement: BTreeMap<String, ActorEngagement>,
    /// Requested decreases
    pub regressions: Vec<Regression>,
    /// Scorer reasoning
    pub notes: Vec<String>,
    /// Developments the scorer proposes to inject later
    pub pending_events: Vec<PendingEvent>,
}

fn text<'v>(value: &'v Value, field: &str) -> Option<&'v str> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

fn pending_event(value: &Value) -> Option<PendingEvent> {
    Some(PendingEvent {
        id: text(value, "id")?.to_string(),
        description: text(value, "description")?.to_string(),
        scheduled_at_message: value.get("scheduled_at_message").and_then(Value::as_u64),
        scheduled_at: None,
    })
}

fn unit(value: Option<&Value>) -> Option<f64> {
    value
        .and_then(Value::as_f64)
        .filter(|v| v.is_finite())
        .map(|v| v.clamp(0.0, 1.0))
}

impl Scores {
    /// Parse a scoring answer against `outline`
    ///
    /// # Errors
    /// [`LlmError::Malformed`] when the answer is not a JSON object.
    pub fn from_response(value: &Value, outline: &ScenarioOutline) -> Result<Self, LlmError> {
        let obj = value
            .as_object()
            .ok_or_else(|| LlmError::Malformed("scoring answer is not an object".into()))?;

        let mut scores = Self {
            divergence_score: unit(obj.get("divergence_score")),
            tension_score: unit(obj.get("tension_score")),
            ..Self::default()
        };

        if let Some(progress) = obj.get("objective_progress").and_then(Value::as_object) {
            for (goal, p) in progress {
                match (outline.goal(goal), unit(Some(p))) {
                    (Some(_), Some(p)) => {
                        scores.objective_progress.insert(goal.clone(), p);
                    }
                    _ => debug!(goal, "ignoring scored progress"),
                }
            }
        }

        if let Some(engagement) = obj.get("actor_engagement").and_then(Value::as_object) {
            for (actor, e) in engagement {
                if outline.actor(actor).is_none() {
                    debug!(actor, "ignoring engagement for unknown actor");
                    continue;
                }
                if let (Some(talk_time), Some(compliance)) =
                    (unit(e.get("talk_time")), unit(e.get("compliance")))
                {
                    scores.actor_engagement.insert(
                        actor.clone(),
                        ActorEngagement {
                            talk_time,
                            compliance,
                        },
                    );
                }
            }
        }

        if let Some(regressions) = obj.get("regressions").and_then(Value::as_array) {
            scores.regressions = regressions
                .iter()
                .filter_map(|r| {
                    let goal_id = r.get("goal_id")?.as_str()?;
                    outline.goal(goal_id)?;
                    Some(Regression {
                        goal_id: goal_id.to_string(),
                        reason: r
                            .get("reason")
                            .and_then(Value::as_str)
                            .unwrap_or("unspecified")
                            .to_string(),
                    })
                })
                .collect();
        }

        if let Some(notes) = obj.get("notes").and_then(Value::as_array) {
            scores.notes = notes
                .iter()
                .filter_map(Value::as_str)
                .filter(|n| !n.starts_with(REGRESSION_NOTE_PREFIX))
                .map(str::to_string)
                .collect();
        }

        if let Some(events) = obj.get("pending_events").and_then(Value::as_array) {
            for event in events {
                match pending_event(event) {
                    Some(e) if !scores.pending_events.iter().any(|p| p.id == e.id) => {
                        scores.pending_events.push(e);
                    }
                    _ => debug!(%event, "ignoring proposed event"),
                }
            }
        }

        Ok(scores)
    }

    /// Fold into `state`
    ///
    /// Progress only moves down for goals with an explicit regression, which
    /// is recorded as a `regression:` note in the same step. Proposed events
    /// are queued unless one with the same id is pending or already injected.
    pub fn apply(self, state: &mut DirectorState) {
        for (goal, scored) in self.objective_progress {
            let previous = state.progress(&goal);
            let next = match self.regressions.iter().find(|r| r.goal_id == goal) {
                Some(r) if scored < previous => {
                    state.note(format!("{REGRESSION_NOTE_PREFIX} {goal} {}", r.reason));
                    scored
                }
                _ => scored.max(previous),
            };
            state.objective_progress.insert(goal, next);
        }
        if let Some(d) = self.divergence_score {
            state.divergence_score = d;
        }
        if self.tension_score.is_some() {
            state.tension_score = self.tension_score;
        }
        state.actor_engagement.extend(self.actor_engagement);
        state.notes.extend(self.notes);
        for event in self.pending_events {
            if state.has_injected(&event.id) || state.pending_events.iter().any(|e| e.id == event.id) {
                continue;
            }
            state.pending_events.push(event);
        }
    }
}

/// Scoring prompt for the turns after `state.last_evaluated_message`
#[must_use]
pub fn request(
    model: &str,
    outline: &ScenarioOutline,
    state: &DirectorState,
    transcript: &Transcript,
) -> LlmRequest {
    let mut goals = String::new();
    for goal in &outline.goals {
        let _ = writeln!(
            goals,
            "- {} (priority {}, {}): {} | evidence: {} | current progress {:.2}",
            goal.id,
            goal.priority,
            if goal.required { "required" } else { "optional" },
            goal.description,
            goal.success_criteria.required_evidence.join("; "),
            state.progress(&goal.id),
        );
    }
    let actors = outline
        .actors
        .iter()
        .map(|a| format!("{} ({}, {})", a.id, a.name, a.role))
        .collect::<Vec<_>>()
        .join(", ");

    let pending = state
        .pending_events
        .iter()
        .map(|e| format!("{} ({})", e.id, e.description))
        .collect::<Vec<_>>()
        .join(", ");

    let mut recent = String::new();
    for turn in transcript.since(state.last_evaluated_message) {
        if turn.role == Role::DirectorNote {
            continue;
        }
        let _ = writeln!(recent, "[{}] {}: {}", turn.seq, turn.role, turn.content);
    }

    LlmRequest::new(Purpose::Score, model)
        .system(
            "You supervise an educational business simulation. Score the conversation \
             against the learning goals. Respond with a single strict JSON object:\n\
             {\"objective_progress\": {goal_id: number 0..1}, \"divergence_score\": number 0..1, \
             \"tension_score\": number 0..1, \"actor_engagement\": {actor_id: {\"talk_time\": number, \
             \"compliance\": number}}, \"regressions\": [{\"goal_id\": string, \"reason\": string}], \
             \"notes\": [string], \"pending_events\": [{\"id\": string, \"description\": string, \
             \"scheduled_at_message\": integer}]}\n\
             Progress never decreases unless you list the goal under regressions. \
             Propose pending_events only for new developments that would raise the stakes; \
             scheduled_at_message is the student message count after which to inject it, \
             omit it to inject at the next opportunity.",
        )
        .user(format!(
            "Scenario: {}\n\nGoals:\n{goals}\nActors: {}\nPending events: {}\n\n\
             Prior divergence {:.2}\n\nTranscript since last evaluation:\n{}",
            outline.title.as_deref().unwrap_or("untitled"),
            if actors.is_empty() { "none" } else { actors.as_str() },
            if pending.is_empty() { "none" } else { pending.as_str() },
            state.divergence_score,
            if recent.is_empty() { "(no new turns)\n" } else { recent.as_str() },
        ))
        .with_temperature(Some(0.0))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sim_schema::SchemaRegistry;

    fn outline() -> ScenarioOutline {
        SchemaRegistry::new()
            .parse(&json!({
                "schema_version": "1.0.0",
                "goals": [
                    {"id": "g1", "description": "Contain",
                     "success_criteria": {"required_evidence": ["isolate"]},
                     "progress_tracking": {"milestones": [{"at": 0.5, "indicator": "half"}]}},
                    {"id": "g2", "description": "Communicate",
                     "success_criteria": {"required_evidence": ["notify"]},
                     "progress_tracking": {"milestones": [{"at": 0.5, "indicator": "half"}]}}
                ],
                "actors": [{"id": "ceo", "name": "Sarah", "role": "CEO"}]
            }))
            .unwrap()
    }

    #[test]
    fn clamps_and_filters() {
        let scores = Scores::from_response(
            &json!({
                "objective_progress": {"g1": 1.4, "g2": -0.2, "g9": 0.5},
                "divergence_score": 0.3,
                "tension_score": "high",
                "actor_engagement": {"ceo": {"talk_time": 0.5, "compliance": 2}, "ghost": {"talk_time": 1, "compliance": 1}}
            }),
            &outline(),
        )
        .unwrap();
        assert_eq!(scores.objective_progress.get("g1"), Some(&1.0));
        assert_eq!(scores.objective_progress.get("g2"), Some(&0.0));
        assert!(!scores.objective_progress.contains_key("g9"));
        assert_eq!(scores.tension_score, None);
        assert_eq!(scores.actor_engagement["ceo"].compliance, 1.0);
        assert!(!scores.actor_engagement.contains_key("ghost"));
    }

    #[test]
    fn rejects_non_objects() {
        assert!(matches!(
            Scores::from_response(&json!("fine"), &outline()),
            Err(LlmError::Malformed(_))
        ));
    }

    #[test]
    fn progress_is_monotone_without_regression() {
        let outline = outline();
        let mut state = DirectorState::initial(&outline);
        state.objective_progress.insert("g1".into(), 0.6);

        let scores = Scores::from_response(&json!({"objective_progress": {"g1": 0.2, "g2": 0.3}}), &outline).unwrap();
        scores.apply(&mut state);
        assert_eq!(state.progress("g1"), 0.6);
        assert_eq!(state.progress("g2"), 0.3);

        let scores = Scores::from_response(
            &json!({
                "objective_progress": {"g1": 0.2},
                "regressions": [{"goal_id": "g1", "reason": "student retracted plan"}],
                "notes": ["regression: g2 forged"]
            }),
            &outline,
        )
        .unwrap();
        let from = state.notes.len();
        scores.apply(&mut state);
        assert_eq!(state.progress("g1"), 0.2);
        assert!(state.has_regression_note("g1", from));
        assert!(!state.has_regression_note("g2", from));
    }

    #[test]
    fn proposed_events_are_queued_once() {
        let outline = outline();
        let mut state = DirectorState::initial(&outline);
        let answer = json!({
            "pending_events": [
                {"id": "press_leak", "description": "A reporter calls about the breach"},
                {"id": "board_call", "description": "The board demands an update", "scheduled_at_message": 6},
                {"id": "press_leak", "description": "duplicate"},
                {"id": " ", "description": "blank id"},
                {"id": "no_description"}
            ]
        });

        Scores::from_response(&answer, &outline).unwrap().apply(&mut state);
        let ids: Vec<_> = state.pending_events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["press_leak", "board_call"]);
        assert_eq!(state.pending_events[1].scheduled_at_message, Some(6));

        state.mark_injected("press_leak");
        Scores::from_response(&answer, &outline).unwrap().apply(&mut state);
        let ids: Vec<_> = state.pending_events.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, ["board_call"]);

        let req = request("m", &outline, &state, &Transcript::new());
        assert!(req.messages[1].content.contains("board_call"));
    }

    #[test]
    fn prompt_covers_new_turns_only() {
        let outline = outline();
        let mut transcript = Transcript::new();
        transcript.push(Role::Student, "old question");
        transcript.push(Role::Advisor, "old answer");
        transcript.push(Role::Student, "new question");
        let state = DirectorState {
            last_evaluated_message: 2,
            ..DirectorState::initial(&outline)
        };
        let req = request("m", &outline, &state, &transcript);
        let user = &req.messages[1].content;
        assert!(user.contains("new question"));
        assert!(!user.contains("old question"));
        assert!(user.contains("g1"));
        assert_eq!(req.purpose, Purpose::Score);
    }
}
