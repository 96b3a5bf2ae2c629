//! Director Settings contract
//!
//! How aggressively and how often the Director supervises a session, which
//! interventions it may emit, and what it may spend per decision.

use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::intervention::InterventionKind;
use crate::validation::{Validate, Violations};

/// Director intervention intensity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intensity {
    /// Never intervene
    Off,
    /// Intervene only when a required goal lags and the student is drifting
    #[default]
    Assist,
    /// Intervene whenever progress lags or tension is out of band
    Assertive,
}

/// When the Director runs; at least one clause must be set
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EvaluationCadence {
    /// Student messages between evaluations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_interval: Option<u64>,
    /// Scenario events that force an evaluation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_triggers: Option<Vec<String>>,
    /// Wall-clock seconds between evaluations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_interval_seconds: Option<u64>,
}

impl EvaluationCadence {
    /// Cadence that fires every `n` student messages
    #[inline]
    #[must_use]
    pub fn every_messages(n: u64) -> Self {
        Self {
            message_interval: Some(n),
            event_triggers: None,
            time_interval_seconds: None,
        }
    }

    /// Whether `event` is one of the configured event triggers
    #[must_use]
    pub fn triggers_on(&self, event: &str) -> bool {
        self.event_triggers
            .as_deref()
            .is_some_and(|events| events.iter().any(|e| e == event))
    }
}

impl Default for EvaluationCadence {
    fn default() -> Self {
        Self::every_messages(3)
    }
}

/// Relative importance of a learning-objective target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TargetPriority {
    /// Low
    Low,
    /// Medium
    #[default]
    Medium,
    /// High
    High,
}

/// Progress a goal should reach
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ObjectiveTarget {
    /// Progress at or above which the goal is on track
    pub threshold: f64,
    /// Importance
    #[serde(default)]
    pub priority: TargetPriority,
}

/// Second-pass self-check of chosen interventions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VerificationPolicy {
    /// Whether verification runs
    #[serde(default)]
    pub enabled: bool,
    /// Regenerations allowed after a rejection
    #[serde(default)]
    pub retry_limit: u8,
    /// Sampling temperature used for regenerations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature_override: Option<f64>,
}

fn default_allowed() -> Vec<InterventionKind> {
    vec![
        InterventionKind::GoalShift,
        InterventionKind::EnterExitActor,
        InterventionKind::HiddenInfoReveal,
    ]
}

fn default_flexibility() -> f64 {
    50.0
}

fn default_latency() -> u64 {
    3500
}

fn default_cost() -> f64 {
    0.02
}

/// Director configuration for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DirectorSettings {
    /// Intensity gate
    #[serde(default)]
    pub intensity: Intensity,
    /// When to evaluate
    #[serde(default)]
    pub evaluation_cadence: EvaluationCadence,
    /// Per-goal targets
    #[serde(default)]
    pub learning_objective_targets: BTreeMap<String, ObjectiveTarget>,
    /// Intervention kinds the Director may emit
    #[serde(default = "default_allowed")]
    pub allowed_actor_interventions: Vec<InterventionKind>,
    /// 0 (stick to the script) to 100 (improvise freely)
    #[serde(default = "default_flexibility")]
    pub adaptation_flexibility: f64,
    /// Wall-clock cap on a single evaluation
    #[serde(default = "default_latency")]
    pub max_latency_ms: u64,
    /// LLM spend cap on a single evaluation, in USD
    #[serde(default = "default_cost")]
    pub max_cost_per_decision: f64,
    /// Optional self-check
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_policy: Option<VerificationPolicy>,
}

impl Default for DirectorSettings {
    fn default() -> Self {
        Self {
            intensity: Intensity::default(),
            evaluation_cadence: EvaluationCadence::default(),
            learning_objective_targets: BTreeMap::new(),
            allowed_actor_interventions: default_allowed(),
            adaptation_flexibility: default_flexibility(),
            max_latency_ms: default_latency(),
            max_cost_per_decision: default_cost(),
            verification_policy: None,
        }
    }
}

impl DirectorSettings {
    /// Set the intensity
    #[inline]
    #[must_use]
    pub fn with_intensity(mut self, intensity: Intensity) -> Self {
        self.intensity = intensity;
        self
    }

    /// Set the cadence
    #[inline]
    #[must_use]
    pub fn with_cadence(mut self, cadence: EvaluationCadence) -> Self {
        self.evaluation_cadence = cadence;
        self
    }

    /// Add or replace a learning-objective target
    #[must_use]
    pub fn with_target(
        mut self,
        goal_id: impl Into<String>,
        threshold: f64,
        priority: TargetPriority,
    ) -> Self {
        self.learning_objective_targets.insert(
            goal_id.into(),
            ObjectiveTarget {
                threshold,
                priority,
            },
        );
        self
    }

    /// Replace the allowed intervention kinds
    #[must_use]
    pub fn with_allowed(mut self, kinds: impl IntoIterator<Item = InterventionKind>) -> Self {
        self.allowed_actor_interventions = kinds.into_iter().collect();
        self
    }

    /// Set the latency cap
    #[inline]
    #[must_use]
    pub fn with_max_latency_ms(mut self, ms: u64) -> Self {
        self.max_latency_ms = ms;
        self
    }

    /// Set the cost cap
    #[inline]
    #[must_use]
    pub fn with_max_cost(mut self, usd: f64) -> Self {
        self.max_cost_per_decision = usd;
        self
    }

    /// Enable verification
    #[must_use]
    pub fn with_verification(mut self, retry_limit: u8, temperature_override: Option<f64>) -> Self {
        self.verification_policy = Some(VerificationPolicy {
            enabled: true,
            retry_limit,
            temperature_override,
        });
        self
    }

    /// Whether `kind` may be emitted
    #[must_use]
    pub fn allows(&self, kind: InterventionKind) -> bool {
        self.allowed_actor_interventions.contains(&kind)
    }

    /// Threshold for `goal_id`, if a target is configured
    #[must_use]
    pub fn threshold(&self, goal_id: &str) -> Option<f64> {
        self.learning_objective_targets
            .get(goal_id)
            .map(|t| t.threshold)
    }

    /// Verification policy if enabled
    #[must_use]
    pub fn verification(&self) -> Option<&VerificationPolicy> {
        self.verification_policy.as_ref().filter(|p| p.enabled)
    }
}

impl Validate for DirectorSettings {
    fn validate(&self, v: &mut Violations) {
        let cadence = &self.evaluation_cadence;
        if cadence.message_interval.is_none()
            && cadence.event_triggers.is_none()
            && cadence.time_interval_seconds.is_none()
        {
            v.push("evaluation_cadence", "at least one cadence clause is required");
        }
        if cadence.message_interval == Some(0) {
            v.push("evaluation_cadence.message_interval", "must be >= 1");
        }
        if cadence.time_interval_seconds == Some(0) {
            v.push("evaluation_cadence.time_interval_seconds", "must be >= 1");
        }
        if let Some(events) = &cadence.event_triggers {
            if events.is_empty() {
                v.push("evaluation_cadence.event_triggers", "must not be empty");
            }
            for (i, event) in events.iter().enumerate() {
                v.non_blank(format!("evaluation_cadence.event_triggers[{i}]"), event);
            }
        }

        for (goal, target) in &self.learning_objective_targets {
            v.unit_interval(
                format!("learning_objective_targets.{goal}.threshold"),
                target.threshold,
            );
        }

        v.range(
            "adaptation_flexibility",
            self.adaptation_flexibility,
            0.0,
            100.0,
        );
        #[allow(clippy::cast_precision_loss)]
        let latency = self.max_latency_ms as f64;
        v.range("max_latency_ms", latency, 100.0, 10_000.0);
        v.unit_interval("max_cost_per_decision", self.max_cost_per_decision);

        if let Some(policy) = &self.verification_policy {
            if policy.retry_limit > 3 {
                v.push("verification_policy.retry_limit", "must be in [0, 3]");
            }
            if let Some(t) = policy.temperature_override {
                v.range("verification_policy.temperature_override", t, 0.0, 2.0);
            }
        }
    }
}
