//! Scenario Outline contract
//!
//! The compiled, declarative description of a scenario: goals with success
//! criteria and milestones, stakeholders, withheld facts, triggers and a
//! suggested beginning/middle/end structure. Everything else refers to goals
//! by id; there are no object references.

use std::collections::HashSet;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::intervention::{ActorAction, InterventionKind};
use crate::parsed::ScenarioType;
use crate::validation::{Validate, Violations};
use crate::version::SchemaVersion;

fn default_true() -> bool {
    true
}

fn default_priority() -> u32 {
    1
}

fn default_measurement() -> String {
    "transcript_analysis".to_string()
}

/// How deeply a student must engage with a goal's evidence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceDepth {
    /// Mentioned
    Surface,
    /// Discussed with some reasoning
    #[default]
    Moderate,
    /// Analysed with trade-offs
    Deep,
}

/// How evidence for a goal is assessed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum AssessmentMethod {
    /// LLM assessor sub-call
    #[default]
    LlmAnalysis,
    /// Case-insensitive substring match over student turns
    KeywordMatch,
    /// Instructor decides; never achieved automatically
    ManualReview,
}

/// What counts as achieving a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuccessCriteria {
    /// Evidence the student must demonstrate
    pub required_evidence: Vec<String>,
    /// Required depth of engagement
    #[serde(default)]
    pub minimum_depth: EvidenceDepth,
    /// Assessment method
    #[serde(default)]
    pub assessment_method: AssessmentMethod,
    /// Whether partial progress counts
    #[serde(default = "default_true")]
    pub partial_credit: bool,
}

/// A progress checkpoint for a goal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Milestone {
    /// Progress fraction at which this milestone is reached
    pub at: f64,
    /// Observable indicator
    pub indicator: String,
}

/// Milestones and how progress is measured
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ProgressTracking {
    /// Strictly ascending by `at`
    pub milestones: Vec<Milestone>,
    /// Measurement method
    #[serde(default = "default_measurement")]
    pub measurement_method: String,
}

impl ProgressTracking {
    /// Lowest milestone threshold, if any
    #[must_use]
    pub fn first_milestone(&self) -> Option<f64> {
        self.milestones.first().map(|m| m.at)
    }
}

/// A learning objective
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Goal {
    /// Unique id (`g1`, `g2`, ...)
    pub id: String,
    /// What the student should achieve
    pub description: String,
    /// 1 is highest
    #[serde(default = "default_priority")]
    pub priority: u32,
    /// Whether the Director pushes for this goal
    #[serde(default = "default_true")]
    pub required: bool,
    /// Completion criteria
    pub success_criteria: SuccessCriteria,
    /// Milestones
    pub progress_tracking: ProgressTracking,
    /// Ids of outline tests that assess this goal
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<String>,
}

/// A stakeholder the advisor may voice or mention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct OutlineActor {
    /// Unique id
    pub id: String,
    /// Display name
    pub name: String,
    /// Role in the scenario
    pub role: String,
    /// Background
    #[serde(default)]
    pub description: String,
}

/// A fact withheld from the student until revealed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct HiddenFact {
    /// Unique id
    pub id: String,
    /// The fact
    pub fact: String,
    /// Goal this fact helps with
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
}

/// A scripted situation the student may run into
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Encounter {
    /// Unique id
    pub id: String,
    /// What happens
    pub description: String,
    /// Goals exercised
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_ids: Vec<String>,
    /// Student message count at which the encounter is scheduled
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at_message: Option<u64>,
}

/// Teaching content the advisor can draw on
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Lesson {
    /// Unique id
    pub id: String,
    /// Title
    pub title: String,
    /// Body
    #[serde(default)]
    pub content: String,
    /// Goals supported
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_ids: Vec<String>,
}

/// A check-for-understanding question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Assessment {
    /// Unique id
    pub id: String,
    /// Question put to the student
    pub prompt: String,
    /// Goals assessed
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_ids: Vec<String>,
}

/// Condition under which a trigger fires; every set clause must hold
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TriggerCondition {
    /// Fires once this many student messages have been exchanged
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_message: Option<u64>,
    /// Goal whose progress is inspected
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    /// Fires once `goal_id` progress reaches this value
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress_at_least: Option<f64>,
    /// Fires once this event has been observed
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<String>,
}

impl TriggerCondition {
    /// Whether no clause is set
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.after_message.is_none()
            && self.goal_id.is_none()
            && self.progress_at_least.is_none()
            && self.event.is_none()
    }
}

/// Bring an actor in or out when a condition holds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ActorTrigger {
    /// Unique id
    pub id: String,
    /// Outline actor id
    pub actor: String,
    /// Enter or exit
    pub action: ActorAction,
    /// When to fire
    pub condition: TriggerCondition,
    /// Advisor instruction when fired
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directive: Option<String>,
}

/// Map an observed event to a preferred intervention
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct DirectorTrigger {
    /// Unique id
    pub id: String,
    /// Event name
    pub event: String,
    /// Goal concerned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_id: Option<String>,
    /// Preferred intervention kind
    pub intervention: InterventionKind,
}

/// One of the three structure phases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum StructurePhase {
    /// Opening
    Beginning,
    /// Development
    Middle,
    /// Resolution
    End,
}

/// A structure phase's expectations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StructureBlock {
    /// What should happen
    pub description: String,
    /// First student message (1-based count) belonging to this block
    pub start_message: u64,
    /// Goals in focus
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub goal_ids: Vec<String>,
    /// Progress the focus goals should have reached by the end of the block
    pub expected_progress: f64,
}

/// Suggested beginning/middle/end pacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SuggestedStructure {
    /// Opening
    pub beginning: StructureBlock,
    /// Development
    pub middle: StructureBlock,
    /// Resolution
    pub end: StructureBlock,
}

impl SuggestedStructure {
    /// Block in effect after `student_messages` messages
    #[must_use]
    pub fn block_at(&self, student_messages: u64) -> (StructurePhase, &StructureBlock) {
        if student_messages >= self.end.start_message {
            (StructurePhase::End, &self.end)
        } else if student_messages >= self.middle.start_message {
            (StructurePhase::Middle, &self.middle)
        } else {
            (StructurePhase::Beginning, &self.beginning)
        }
    }

    fn blocks(&self) -> [(&'static str, &StructureBlock); 3] {
        [
            ("beginning", &self.beginning),
            ("middle", &self.middle),
            ("end", &self.end),
        ]
    }
}

/// Limits on how far the advisor may adapt
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct AdaptationConstraints {
    /// Permitted adaptations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub can_do: Vec<String>,
    /// Forbidden adaptations
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cannot_do: Vec<String>,
    /// Fallback when the student is completely lost
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_student_completely_lost: Option<String>,
}

/// The compiled scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioOutline {
    /// Contract version; patch is bumped on every edit
    pub schema_version: SchemaVersion,
    /// Title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Scenario type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario_type: Option<ScenarioType>,
    /// Industry
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub industry: Option<String>,
    /// Case narrative shown to the advisor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub narrative: Option<String>,
    /// Instructor's behavioral instructions for the advisor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub instructions: Option<String>,
    /// Learning objectives
    pub goals: Vec<Goal>,
    /// Stakeholders
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actors: Vec<OutlineActor>,
    /// Withheld facts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub hidden_information: Vec<HiddenFact>,
    /// Ground rules
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rules: Vec<String>,
    /// Scripted encounters
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub encounters: Vec<Encounter>,
    /// Lessons
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub lessons: Vec<Lesson>,
    /// Assessments
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tests: Vec<Assessment>,
    /// Actor entry/exit triggers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actor_triggers: Vec<ActorTrigger>,
    /// Event-to-intervention triggers
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub director_triggers: Vec<DirectorTrigger>,
    /// Pacing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggested_structure: Option<SuggestedStructure>,
    /// Adaptation limits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub adaptation_constraints: Option<AdaptationConstraints>,
}

impl ScenarioOutline {
    /// Look up a goal by id
    #[must_use]
    pub fn goal(&self, id: &str) -> Option<&Goal> {
        self.goals.iter().find(|g| g.id == id)
    }

    /// Goal ids in declaration order
    pub fn goal_ids(&self) -> impl Iterator<Item = &str> {
        self.goals.iter().map(|g| g.id.as_str())
    }

    /// Look up an actor by id
    #[must_use]
    pub fn actor(&self, id: &str) -> Option<&OutlineActor> {
        self.actors.iter().find(|a| a.id == id)
    }

    /// Look up a hidden fact by id
    #[must_use]
    pub fn hidden_fact(&self, id: &str) -> Option<&HiddenFact> {
        self.hidden_information.iter().find(|f| f.id == id)
    }
}

impl Validate for ScenarioOutline {
    fn validate(&self, v: &mut Violations) {
        if self.goals.is_empty() {
            v.push("goals", "at least one goal is required");
        }

        let mut goal_ids = HashSet::new();
        for (i, goal) in self.goals.iter().enumerate() {
            let path = format!("goals[{i}]");
            v.non_blank(format!("{path}.id"), &goal.id);
            v.non_blank(format!("{path}.description"), &goal.description);
            if !goal_ids.insert(goal.id.as_str()) {
                v.push(format!("{path}.id"), format!("duplicate goal id '{}'", goal.id));
            }
            if goal.priority < 1 {
                v.push(format!("{path}.priority"), "must be >= 1");
            }
            validate_milestones(&path, &goal.progress_tracking, v);
        }

        let actor_ids: HashSet<&str> = self.actors.iter().map(|a| a.id.as_str()).collect();
        let test_ids: HashSet<&str> = self.tests.iter().map(|t| t.id.as_str()).collect();
        let mut refs = GoalRefs {
            known: &goal_ids,
            violations: v,
        };

        for (i, goal) in self.goals.iter().enumerate() {
            for (j, test) in goal.tests.iter().enumerate() {
                if !test_ids.contains(test.as_str()) {
                    refs.violations.push(
                        format!("goals[{i}].tests[{j}]"),
                        format!("unknown test '{test}'"),
                    );
                }
            }
        }
        for (i, fact) in self.hidden_information.iter().enumerate() {
            refs.optional(&format!("hidden_information[{i}].goal_id"), fact.goal_id.as_deref());
        }
        for (i, encounter) in self.encounters.iter().enumerate() {
            refs.all(&format!("encounters[{i}].goal_ids"), &encounter.goal_ids);
        }
        for (i, lesson) in self.lessons.iter().enumerate() {
            refs.all(&format!("lessons[{i}].goal_ids"), &lesson.goal_ids);
        }
        for (i, test) in self.tests.iter().enumerate() {
            refs.all(&format!("tests[{i}].goal_ids"), &test.goal_ids);
        }
        for (i, trigger) in self.actor_triggers.iter().enumerate() {
            let path = format!("actor_triggers[{i}]");
            if !actor_ids.contains(trigger.actor.as_str()) {
                refs.violations.push(
                    format!("{path}.actor"),
                    format!("unknown actor '{}'", trigger.actor),
                );
            }
            if trigger.condition.is_empty() {
                refs.violations
                    .push(format!("{path}.condition"), "at least one clause is required");
            }
            refs.optional(&format!("{path}.condition.goal_id"), trigger.condition.goal_id.as_deref());
            if let Some(p) = trigger.condition.progress_at_least {
                refs.violations
                    .unit_interval(format!("{path}.condition.progress_at_least"), p);
            }
        }
        for (i, trigger) in self.director_triggers.iter().enumerate() {
            refs.violations
                .non_blank(format!("director_triggers[{i}].event"), &trigger.event);
            refs.optional(&format!("director_triggers[{i}].goal_id"), trigger.goal_id.as_deref());
        }
        if let Some(structure) = &self.suggested_structure {
            for (name, block) in structure.blocks() {
                let path = format!("suggested_structure.{name}");
                refs.all(&format!("{path}.goal_ids"), &block.goal_ids);
                refs.violations
                    .unit_interval(format!("{path}.expected_progress"), block.expected_progress);
            }
            if structure.beginning.start_message > structure.middle.start_message
                || structure.middle.start_message > structure.end.start_message
            {
                refs.violations.push(
                    "suggested_structure",
                    "blocks must start in beginning <= middle <= end order",
                );
            }
        }
    }
}

fn validate_milestones(goal_path: &str, tracking: &ProgressTracking, v: &mut Violations) {
    let path = format!("{goal_path}.progress_tracking.milestones");
    if tracking.milestones.is_empty() {
        v.push(&path, "at least one milestone is required");
    }
    let mut previous: Option<f64> = None;
    for (i, milestone) in tracking.milestones.iter().enumerate() {
        v.unit_interval(format!("{path}[{i}].at"), milestone.at);
        if let Some(prev) = previous {
            if milestone.at <= prev {
                v.push(
                    format!("{path}[{i}].at"),
                    format!("milestones must be strictly ascending ({} after {prev})", milestone.at),
                );
            }
        }
        previous = Some(milestone.at);
    }
}

struct GoalRefs<'a, 'v> {
    known: &'a HashSet<&'a str>,
    violations: &'v mut Violations,
}

impl GoalRefs<'_, '_> {
    fn optional(&mut self, path: &str, id: Option<&str>) {
        if let Some(id) = id {
            if !self.known.contains(id) {
                self.violations.push(path, format!("unknown goal '{id}'"));
            }
        }
    }

    fn all(&mut self, path: &str, ids: &[String]) {
        for (i, id) in ids.iter().enumerate() {
            if !self.known.contains(id.as_str()) {
                self.violations
                    .push(format!("{path}[{i}]"), format!("unknown goal '{id}'"));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::check;
    use serde_json::json;

    fn outline_json() -> serde_json::Value {
        json!({
            "schema_version": "1.0.0",
            "goals": [{
                "id": "g1",
                "description": "Stabilise cash flow",
                "success_criteria": {"required_evidence": ["cash runway"]},
                "progress_tracking": {"milestones": [
                    {"at": 0.33, "indicator": "identifies problem"},
                    {"at": 1.0, "indicator": "commits to plan"}
                ]}
            }],
            "actors": [{"id": "cfo", "name": "Mike Chen", "role": "CFO"}],
            "actor_triggers": [{
                "id": "t1", "actor": "cfo", "action": "enter",
                "condition": {"after_message": 3}
            }]
        })
    }

    #[test]
    fn defaults_are_applied() {
        let outline: ScenarioOutline = serde_json::from_value(outline_json()).unwrap();
        let goal = &outline.goals[0];
        assert_eq!(goal.priority, 1);
        assert!(goal.required);
        assert!(goal.success_criteria.partial_credit);
        assert_eq!(goal.success_criteria.assessment_method, AssessmentMethod::LlmAnalysis);
        assert_eq!(goal.success_criteria.minimum_depth, EvidenceDepth::Moderate);
        assert!(check(&outline).is_ok());
    }

    #[test]
    fn rejects_unsorted_milestones() {
        let mut value = outline_json();
        value["goals"][0]["progress_tracking"]["milestones"] = json!([
            {"at": 0.66, "indicator": "b"},
            {"at": 0.33, "indicator": "a"}
        ]);
        let outline: ScenarioOutline = serde_json::from_value(value).unwrap();
        let errors = check(&outline).unwrap_err();
        assert!(errors
            .iter()
            .any(|e| e.message.contains("strictly ascending")));
    }

    #[test]
    fn rejects_dangling_goal_reference() {
        let mut value = outline_json();
        value["director_triggers"] = json!([
            {"id": "d1", "event": "budget_cut", "goal_id": "g9", "intervention": "goal_shift"}
        ]);
        let outline: ScenarioOutline = serde_json::from_value(value).unwrap();
        let errors = check(&outline).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].path, "director_triggers[0].goal_id");
    }

    #[test]
    fn rejects_unknown_trigger_actor() {
        let mut value = outline_json();
        value["actor_triggers"][0]["actor"] = json!("ceo");
        let outline: ScenarioOutline = serde_json::from_value(value).unwrap();
        assert!(check(&outline).is_err());
    }

    #[test]
    fn structure_block_lookup() {
        let block = |start| StructureBlock {
            description: String::new(),
            start_message: start,
            goal_ids: vec![],
            expected_progress: 0.5,
        };
        let s = SuggestedStructure {
            beginning: block(0),
            middle: block(3),
            end: block(10),
        };
        assert_eq!(s.block_at(0).0, StructurePhase::Beginning);
        assert_eq!(s.block_at(3).0, StructurePhase::Middle);
        assert_eq!(s.block_at(42).0, StructurePhase::End);
    }
}
