//! The director loop
//!
//! One evaluation, under the per-decision latency and cost caps:
//!
//! 1. snapshot outline, settings, state and transcript from the blackboard
//! 2. scoring call, folded into the state with monotone progress
//! 3. goal status transitions
//! 4. policy step (see [`crate::policy`])
//! 5. optional verification with bounded regeneration
//! 6. write `director_state` (and `pending_intervention`), broadcast
//!    `director_evaluated`
//!
//! A budget breach discards everything but a `director_budget_exceeded`
//! note; an LLM failure likewise leaves only a note. Both still broadcast
//! `director_evaluated` with no intervention so the cadence never re-runs the
//! same transcript position.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use serde_json::{json, Value};
use sim_agents::LlmClient;
use sim_blackboard::{keys, AgentId, AuditAction, AuditFilter, Blackboard, Caller, Grant, Phase};
use sim_schema::{DirectorSettings, DirectorState, Intervention, ScenarioOutline, Transcript};
use tracing::{debug, info, warn};

use crate::assess::Assessor;
use crate::budget::{BudgetBreach, CostMeter};
use crate::cadence::{self, CadenceInput, CadenceReason};
use crate::error::DirectorError;
use crate::policy::{self, PolicyInput};
use crate::scoring::{self, Scores};
use crate::verify::Verifier;

/// Agent id of the director
pub const DIRECTOR_ID: &str = "director";
/// Event broadcast after every evaluation, aborted or not
pub const DIRECTOR_EVALUATED: &str = "director_evaluated";
/// Event marking a transcript reset; evaluation history before it is ignored
pub const CONVERSATION_CLEARED: &str = "conversation_cleared";
/// Note appended when an evaluation hits a cap
pub const BUDGET_EXCEEDED_NOTE: &str = "director_budget_exceeded";

/// Inputs of one evaluation, read from the blackboard
#[derive(Debug, Clone)]
pub struct Snapshot {
    /// Compiled scenario
    pub outline: ScenarioOutline,
    /// Active settings
    pub settings: DirectorSettings,
    /// Prior state
    pub state: DirectorState,
    /// Transcript
    pub transcript: Transcript,
    /// Events broadcast since the last evaluation
    pub events: Vec<String>,
    /// Transcript seq covered by the last evaluation attempt
    pub last_attempted: Option<u64>,
}

/// Result of one evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    /// Why it ran
    pub reason: CadenceReason,
    /// Last transcript seq it covered
    pub transcript_seq: u64,
    /// Emitted intervention
    pub intervention: Option<Intervention>,
    /// Cap hit, when aborted
    pub aborted: Option<BudgetBreach>,
    /// LLM failure that degraded the round, if any
    pub degraded: Option<String>,
    /// LLM spend
    pub cost_usd: f64,
    /// Wall-clock duration
    pub elapsed_ms: u64,
    /// Audit seq of the `director_state` write
    pub state_seq: u64,
    /// Audit seq of the `director_evaluated` broadcast
    pub broadcast_seq: u64,
}

struct Outcome {
    state: DirectorState,
    intervention: Option<Intervention>,
}

/// Supervises one session's blackboard
#[derive(Clone)]
pub struct Director {
    id: AgentId,
    board: Arc<Blackboard>,
    llm: Arc<dyn LlmClient>,
    model: String,
}

impl std::fmt::Debug for Director {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Director")
            .field("id", &self.id)
            .field("model", &self.model)
            .finish_non_exhaustive()
    }
}

impl Director {
    /// Director over `board` scoring with `model`
    pub fn new(board: Arc<Blackboard>, llm: Arc<dyn LlmClient>, model: impl Into<String>) -> Self {
        Self {
            id: AgentId::new(DIRECTOR_ID),
            board,
            llm,
            model: model.into(),
        }
    }

    /// Agent id used for reads, writes and broadcasts
    #[must_use]
    pub fn id(&self) -> &AgentId {
        &self.id
    }

    /// Footprint of the director
    #[must_use]
    pub fn grant() -> Grant {
        Grant::new()
            .reads([
                keys::SCENARIO_OUTLINE,
                keys::DIRECTOR_SETTINGS,
                keys::DIRECTOR_STATE,
                keys::TRANSCRIPT,
            ])
            .writes([keys::DIRECTOR_STATE, keys::PENDING_INTERVENTION])
            .preserves([keys::SCENARIO_OUTLINE, keys::DIRECTOR_SETTINGS, keys::TRANSCRIPT])
    }

    /// Grant the director its footprint on the blackboard
    pub fn register(&self) {
        self.board.grant_permission(self.id.clone(), Self::grant());
    }

    /// Read everything an evaluation needs
    ///
    /// # Errors
    /// [`DirectorError::MissingInput`] without an outline or settings;
    /// blackboard errors propagate.
    pub fn snapshot(&self) -> Result<Snapshot, DirectorError> {
        let caller = Caller::from(&self.id);
        let outline: ScenarioOutline = self
            .board
            .get(keys::SCENARIO_OUTLINE, &caller)?
            .ok_or(DirectorError::MissingInput(keys::SCENARIO_OUTLINE))?;
        let settings: DirectorSettings = self
            .board
            .get(keys::DIRECTOR_SETTINGS, &caller)?
            .ok_or(DirectorError::MissingInput(keys::DIRECTOR_SETTINGS))?;
        let state = self
            .board
            .get::<DirectorState>(keys::DIRECTOR_STATE, &caller)?
            .unwrap_or_else(|| DirectorState::initial(&outline));
        let transcript = self
            .board
            .get::<Transcript>(keys::TRANSCRIPT, &caller)?
            .unwrap_or_default();
        let (events, last_attempted) = self.history();
        Ok(Snapshot {
            outline,
            settings,
            state,
            transcript,
            events,
            last_attempted,
        })
    }

    /// Broadcasts since the last evaluation and the transcript seq it covered
    fn history(&self) -> (Vec<String>, Option<u64>) {
        let broadcasts = self
            .board
            .audit_log(&AuditFilter::all().action(AuditAction::Broadcast));
        let cleared = broadcasts
            .iter()
            .rev()
            .find(|e| e.event.as_deref() == Some(CONVERSATION_CLEARED))
            .map_or(0, |e| e.seq);
        let last_eval = broadcasts
            .iter()
            .rev()
            .take_while(|e| e.seq > cleared)
            .find(|e| e.event.as_deref() == Some(DIRECTOR_EVALUATED));
        let since = last_eval.map_or(cleared, |e| e.seq);
        let last_attempted = last_eval
            .and_then(|e| e.payload.as_ref())
            .and_then(|p| p.get("transcript_seq"))
            .and_then(Value::as_u64);
        let events = broadcasts
            .iter()
            .filter(|e| e.seq > since)
            .filter_map(|e| e.event.clone())
            .collect();
        (events, last_attempted)
    }

    /// Run an evaluation if the board is RUNNING and a cadence clause holds
    ///
    /// # Errors
    /// Blackboard and schema errors; LLM, verification and budget failures
    /// degrade into the returned [`Evaluation`] instead.
    pub async fn maybe_evaluate(&self) -> Result<Option<Evaluation>, DirectorError> {
        if self.board.phase() != Phase::Running {
            debug!(phase = %self.board.phase(), "director idle outside RUNNING");
            return Ok(None);
        }
        let snapshot = self.snapshot()?;
        let due = cadence::due(&CadenceInput {
            settings: &snapshot.settings,
            state: &snapshot.state,
            transcript: &snapshot.transcript,
            events: &snapshot.events,
            last_attempted: snapshot.last_attempted,
            now: Utc::now(),
        });
        match due {
            Some(reason) => self.run(snapshot, reason).await.map(Some),
            None => Ok(None),
        }
    }

    /// Run an evaluation now, ignoring cadence; a no-op outside RUNNING
    ///
    /// # Errors
    /// As [`Director::maybe_evaluate`].
    pub async fn evaluate(&self) -> Result<Option<Evaluation>, DirectorError> {
        if self.board.phase() != Phase::Running {
            return Ok(None);
        }
        let snapshot = self.snapshot()?;
        self.run(snapshot, CadenceReason::Forced).await.map(Some)
    }

    async fn run(&self, snap: Snapshot, reason: CadenceReason) -> Result<Evaluation, DirectorError> {
        let started = Instant::now();
        let limit_ms = snap.settings.max_latency_ms;
        let mut meter = CostMeter::new(snap.settings.max_cost_per_decision);
        let result = match tokio::time::timeout(
            Duration::from_millis(limit_ms),
            self.pipeline(&snap, &mut meter),
        )
        .await
        {
            Ok(result) => result,
            Err(_) => Err(BudgetBreach::Latency { limit_ms }.into()),
        };

        let transcript_seq = snap.transcript.last_seq();
        let (state, intervention, aborted, degraded) = match result {
            Ok(outcome) => (outcome.state, outcome.intervention, None, None),
            Err(DirectorError::BudgetExceeded(breach)) => {
                warn!(%breach, transcript_seq, "director evaluation aborted");
                let mut state = snap.state;
                state.note(BUDGET_EXCEEDED_NOTE);
                (state, None, Some(breach), None)
            }
            Err(e) if e.degrades() => {
                warn!(error = %e, transcript_seq, "director evaluation degraded");
                let mut state = snap.state;
                state.note(format!("director_error: {e}"));
                (state, None, None, Some(e.to_string()))
            }
            Err(e) => return Err(e),
        };

        let state_seq = self.board.put(keys::DIRECTOR_STATE, &state, &self.id)?;
        if let Some(intervention) = &intervention {
            self.board
                .put(keys::PENDING_INTERVENTION, intervention, &self.id)?;
        }
        let broadcast_seq = self.board.broadcast(
            DIRECTOR_EVALUATED,
            json!({
                "intervention": intervention,
                "transcript_seq": transcript_seq,
                "reason": reason,
                "aborted": aborted,
                "evaluations": state.evaluations,
                "divergence_score": state.divergence_score,
                "tension_score": state.tension_score,
            }),
            &self.id,
        )?;

        let elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        info!(
            %reason,
            transcript_seq,
            intervention = intervention.as_ref().map(|i| i.kind().as_str()),
            cost_usd = meter.spent(),
            elapsed_ms,
            "director evaluated"
        );
        Ok(Evaluation {
            reason,
            transcript_seq,
            intervention,
            aborted,
            degraded,
            cost_usd: meter.spent(),
            elapsed_ms,
            state_seq,
            broadcast_seq,
        })
    }

    async fn pipeline(&self, snap: &Snapshot, meter: &mut CostMeter) -> Result<Outcome, DirectorError> {
        let Snapshot {
            outline,
            settings,
            transcript,
            events,
            ..
        } = snap;

        let scores = self.score(snap, meter).await?;
        let mut state = snap.state.clone();
        state.sync_goals(outline);
        scores.apply(&mut state);

        Assessor {
            llm: self.llm.as_ref(),
            model: &self.model,
        }
        .advance(outline, transcript, &mut state, meter)
        .await?;

        let now = Utc::now();
        let decision = policy::decide(&PolicyInput {
            outline,
            settings,
            state: &state,
            student_messages: transcript.student_turns() as u64,
            events,
            now,
        });

        let chosen = match (decision, settings.verification()) {
            (Some(candidate), Some(verification)) => {
                let verifier = Verifier {
                    llm: self.llm.as_ref(),
                    model: &self.model,
                    policy: verification,
                    settings,
                    outline,
                    transcript,
                    pending_events: &state.pending_events,
                };
                let verdict = verifier.verify(candidate, meter).await;
                match verdict {
                    Ok(candidate) => Some(candidate),
                    Err(DirectorError::VerificationFailed { attempts }) => {
                        warn!(attempts, "intervention dropped after failed verification");
                        state.note(format!(
                            "intervention_dropped: verification failed after {attempts} attempt(s)"
                        ));
                        None
                    }
                    Err(e) => return Err(e),
                }
            }
            (decision, _) => decision,
        };

        if let Some(candidate) = &chosen {
            policy::record(&mut state, candidate);
        }
        state.last_evaluated_message = transcript.last_seq();
        state.last_evaluated_at = Some(now);
        state.evaluations += 1;

        Ok(Outcome {
            state,
            intervention: chosen.map(|c| c.intervention),
        })
    }

    /// Scoring call, retried on transport or parse failures up to the
    /// verification retry limit
    async fn score(&self, snap: &Snapshot, meter: &mut CostMeter) -> Result<Scores, DirectorError> {
        let retries = snap.settings.verification().map_or(0, |p| p.retry_limit);
        let mut attempt = 0u8;
        loop {
            let request = scoring::request(&self.model, &snap.outline, &snap.state, &snap.transcript);
            let failure = match self.llm.complete_json(request).await {
                Ok(answer) => {
                    meter.charge(answer.usage)?;
                    match Scores::from_response(&answer.value, &snap.outline) {
                        Ok(scores) => return Ok(scores),
                        Err(e) => e,
                    }
                }
                Err(e) if e.is_retryable() => e,
                Err(e) => return Err(e.into()),
            };
            if attempt >= retries {
                return Err(failure.into());
            }
            warn!(attempt, error = %failure, "scoring call failed, retrying");
            attempt += 1;
        }
    }
}
