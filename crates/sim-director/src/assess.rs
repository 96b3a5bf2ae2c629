//! Goal completion: pending → in_progress → achieved
//!
//! A goal starts once its first milestone is reached and is achieved at full
//! progress only when its required evidence is demonstrated. `manual_review`
//! goals are never achieved automatically.

use serde_json::Value;
use sim_agents::{LlmClient, LlmRequest, Purpose};
use sim_schema::{
    AssessmentMethod, DirectorState, Goal, GoalStatus, Role, ScenarioOutline, Transcript,
};
use tracing::{info, warn};

use crate::budget::CostMeter;
use crate::error::DirectorError;

/// Assessor prompt for `goal`
#[must_use]
pub fn request(model: &str, goal: &Goal, student_text: &str) -> LlmRequest {
    LlmRequest::new(Purpose::Assess, model)
        .system(
            "You assess whether a student has demonstrated the required evidence for a \
             learning goal. Judge only what the student wrote. Respond with strict JSON: \
             {\"demonstrated\": boolean, \"evidence\": [string]}.",
        )
        .user(format!(
            "Goal {}: {}\nRequired evidence:\n- {}\nMinimum depth: {:?}\n\nStudent messages:\n{}",
            goal.id,
            goal.description,
            goal.success_criteria.required_evidence.join("\n- "),
            goal.success_criteria.minimum_depth,
            student_text,
        ))
        .with_temperature(Some(0.0))
}

fn student_text(transcript: &Transcript) -> String {
    transcript
        .turns()
        .iter()
        .filter(|t| t.role == Role::Student)
        .map(|t| t.content.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Whether every evidence item appears, case-insensitively, in `text`
#[must_use]
pub fn keywords_present(goal: &Goal, text: &str) -> bool {
    let haystack = text.to_lowercase();
    goal.success_criteria
        .required_evidence
        .iter()
        .all(|e| haystack.contains(&e.to_lowercase()))
}

/// Advance goal statuses in `state` after scoring
#[derive(Clone, Copy)]
pub struct Assessor<'a> {
    /// Client for `llm_analysis` goals
    pub llm: &'a dyn LlmClient,
    /// Assessor model
    pub model: &'a str,
}

impl Assessor<'_> {
    /// Apply every allowed status transition, returning the goals that moved
    ///
    /// # Errors
    /// [`DirectorError::BudgetExceeded`] when an assessor call trips the
    /// meter. A failed assessor call leaves the goal in progress.
    pub async fn advance(
        &self,
        outline: &ScenarioOutline,
        transcript: &Transcript,
        state: &mut DirectorState,
        meter: &mut CostMeter,
    ) -> Result<Vec<(String, GoalStatus)>, DirectorError> {
        let text = student_text(transcript);
        let mut moved = Vec::new();
        for goal in &outline.goals {
            let progress = state.progress(&goal.id);
            let mut status = state.status(&goal.id);

            let started = goal
                .progress_tracking
                .first_milestone()
                .map_or(progress > 0.0, |at| progress >= at);
            if status == GoalStatus::Pending && started {
                status = GoalStatus::InProgress;
            }
            if status == GoalStatus::InProgress
                && progress >= 1.0
                && self.demonstrated(goal, &text, meter).await?
            {
                status = GoalStatus::Achieved;
            }

            let previous = state.status(&goal.id);
            if status != previous {
                info!(goal = %goal.id, from = ?previous, to = ?status, "goal status changed");
                state.goal_status.insert(goal.id.clone(), status);
                moved.push((goal.id.clone(), status));
            }
        }
        Ok(moved)
    }

    async fn demonstrated(
        &self,
        goal: &Goal,
        text: &str,
        meter: &mut CostMeter,
    ) -> Result<bool, DirectorError> {
        match goal.success_criteria.assessment_method {
            AssessmentMethod::ManualReview => Ok(false),
            AssessmentMethod::KeywordMatch => Ok(keywords_present(goal, text)),
            AssessmentMethod::LlmAnalysis => {
                match self.llm.complete_json(request(self.model, goal, text)).await {
                    Ok(answer) => {
                        meter.charge(answer.usage)?;
                        Ok(answer.value.get("demonstrated").and_then(Value::as_bool) == Some(true))
                    }
                    Err(e) => {
                        warn!(goal = %goal.id, error = %e, "assessor call failed");
                        Ok(false)
                    }
                }
            }
        }
    }
}
