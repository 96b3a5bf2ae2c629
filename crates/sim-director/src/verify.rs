//! Self-check of a chosen intervention with bounded regeneration

use serde_json::Value;
use sim_agents::{LlmClient, LlmRequest, Purpose};
use sim_schema::{
    DirectorSettings, Intervention, InterventionKind, PendingEvent, ScenarioOutline,
    SchemaRegistry, Transcript, VerificationPolicy,
};
use tracing::{debug, warn};

use crate::budget::CostMeter;
use crate::error::DirectorError;
use crate::policy::Candidate;

/// Turns of recent context shown to the checker
const CONTEXT_TURNS: usize = 6;

fn context(transcript: &Transcript) -> String {
    let turns = transcript.turns();
    turns[turns.len().saturating_sub(CONTEXT_TURNS)..]
        .iter()
        .map(|t| format!("{}: {}", t.role, t.content))
        .collect::<Vec<_>>()
        .join("\n")
}

fn goals(outline: &ScenarioOutline) -> String {
    outline
        .goals
        .iter()
        .map(|g| format!("{}: {}", g.id, g.description))
        .collect::<Vec<_>>()
        .join("\n")
}

fn intervention_json(intervention: &Intervention) -> String {
    serde_json::to_string(intervention).unwrap_or_else(|_| intervention.directive().to_string())
}

/// Checker prompt for `intervention`
#[must_use]
pub fn verify_request(
    model: &str,
    intervention: &Intervention,
    outline: &ScenarioOutline,
    transcript: &Transcript,
) -> LlmRequest {
    LlmRequest::new(Purpose::Verify, model)
        .system(
            "You review a director's proposed intervention in an educational simulation. \
             Approve it only if it serves the learning goals and fits the recent conversation. \
             Respond with strict JSON: {\"approved\": boolean, \"reason\": string}.",
        )
        .user(format!(
            "Goals:\n{}\n\nRecent conversation:\n{}\n\nProposed intervention:\n{}",
            goals(outline),
            context(transcript),
            intervention_json(intervention),
        ))
}

/// Regeneration prompt replacing a rejected `intervention`
#[must_use]
pub fn regenerate_request(
    model: &str,
    intervention: &Intervention,
    settings: &DirectorSettings,
    outline: &ScenarioOutline,
    transcript: &Transcript,
) -> LlmRequest {
    let allowed = settings
        .allowed_actor_interventions
        .iter()
        .map(InterventionKind::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    LlmRequest::new(Purpose::Regenerate, model)
        .system(format!(
            "A reviewer rejected the director's intervention. Propose a better one. \
             Respond with a single strict JSON object with a \"type\" field (one of: {allowed}), \
             the fields that type requires, and a \"directive\" for the advisor."
        ))
        .user(format!(
            "Goals:\n{}\n\nRecent conversation:\n{}\n\nRejected intervention:\n{}",
            goals(outline),
            context(transcript),
            intervention_json(intervention),
        ))
}

fn approved(answer: &Value) -> bool {
    answer.get("approved").and_then(Value::as_bool) == Some(true)
}

/// Inputs of one verification run
#[derive(Clone, Copy)]
pub struct Verifier<'a> {
    /// Client
    pub llm: &'a dyn LlmClient,
    /// Model for checks and regenerations
    pub model: &'a str,
    /// Retry policy
    pub policy: &'a VerificationPolicy,
    /// Active settings, for the allowed set
    pub settings: &'a DirectorSettings,
    /// Compiled scenario
    pub outline: &'a ScenarioOutline,
    /// Current transcript
    pub transcript: &'a Transcript,
    /// Events a regenerated trigger may name
    pub pending_events: &'a [PendingEvent],
}

impl Verifier<'_> {
    /// Check `candidate`, regenerating up to `retry_limit` times
    ///
    /// Regenerations use `temperature_override` when set. A regenerated
    /// intervention outside the allowed set, or naming a goal, actor, fact
    /// or event the scenario does not have, is discarded. A replacement
    /// with a different kind or target no longer answers the original
    /// trigger, so the candidate's `trigger_id` is cleared.
    ///
    /// # Errors
    /// [`DirectorError::VerificationFailed`] when nothing was approved,
    /// [`DirectorError::BudgetExceeded`] when the meter trips, and
    /// non-retryable LLM errors as [`DirectorError::Llm`].
    pub async fn verify(
        &self,
        mut candidate: Candidate,
        meter: &mut CostMeter,
    ) -> Result<Candidate, DirectorError> {
        let attempts = u32::from(self.policy.retry_limit) + 1;
        for attempt in 1..=attempts {
            let request = verify_request(self.model, &candidate.intervention, self.outline, self.transcript);
            match self.llm.complete_json(request).await {
                Ok(answer) => {
                    meter.charge(answer.usage)?;
                    if approved(&answer.value) {
                        debug!(attempt, kind = %candidate.kind(), "intervention approved");
                        return Ok(candidate);
                    }
                }
                Err(e) if e.is_retryable() => warn!(attempt, error = %e, "verification call failed"),
                Err(e) => return Err(e.into()),
            }
            if attempt < attempts {
                if let Some(replacement) = self.regenerate(&candidate.intervention, meter).await? {
                    if replacement.kind() != candidate.kind()
                        || replacement.target() != candidate.intervention.target()
                    {
                        candidate.trigger_id = None;
                    }
                    candidate.intervention = replacement;
                }
            }
        }
        Err(DirectorError::VerificationFailed { attempts })
    }

    /// Whether every id `intervention` names exists
    fn resolves(&self, intervention: &Intervention) -> bool {
        match intervention {
            Intervention::GoalShift { goal_id, .. } => self.outline.goal(goal_id).is_some(),
            Intervention::EnterExitActor { actor_id, .. } => self.outline.actor(actor_id).is_some(),
            Intervention::HiddenInfoReveal { fact_id, .. } => {
                self.outline.hidden_fact(fact_id).is_some()
            }
            Intervention::EventTrigger { event_id, .. } => {
                self.pending_events.iter().any(|e| &e.id == event_id)
            }
            Intervention::ToneAdjustment { .. } => true,
        }
    }

    async fn regenerate(
        &self,
        rejected: &Intervention,
        meter: &mut CostMeter,
    ) -> Result<Option<Intervention>, DirectorError> {
        let request = regenerate_request(self.model, rejected, self.settings, self.outline, self.transcript)
            .with_temperature(self.policy.temperature_override);
        let answer = match self.llm.complete_json(request).await {
            Ok(answer) => answer,
            Err(e) if e.is_retryable() => {
                warn!(error = %e, "regeneration call failed");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        meter.charge(answer.usage)?;
        match SchemaRegistry::new().parse::<Intervention>(&answer.value) {
            Ok(i) if !self.settings.allows(i.kind()) => {
                warn!(kind = %i.kind(), "regenerated intervention not allowed");
                Ok(None)
            }
            Ok(i) if !self.resolves(&i) => {
                warn!(kind = %i.kind(), target = ?i.target(), "regenerated intervention references unknown id");
                Ok(None)
            }
            Ok(i) => Ok(Some(i)),
            Err(e) => {
                warn!(error = %e, answer = %answer.value, "regenerated intervention invalid");
                Ok(None)
            }
        }
    }
}
