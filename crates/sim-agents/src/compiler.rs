//! Scenario compiler: parsed descriptor to Scenario Outline and Director Settings
//!
//! Deterministic; makes no LLM call. Output is validated through the registry
//! before anything is written, so an outline that fails its contract is never
//! published.

use std::collections::HashSet;

use serde_json::{json, Value};
use sim_blackboard::{keys, AgentId};
use sim_schema::{
    ActorAction, ActorTrigger, AdaptationConstraints, AssessmentMethod, DirectorSettings,
    DirectorTrigger, EvidenceDepth, Goal, HiddenFact, InterventionKind, Milestone,
    OutlineActor, ParsedScenario, ProgressTracking, ScenarioOutline, ScenarioType,
    SchemaRegistry, StructureBlock, SuccessCriteria, SuggestedStructure, TargetPriority,
    TriggerCondition, OUTLINE_VERSION,
};
use tracing::info;

use crate::agent::{Agent, AgentDescriptor, AgentInputs, AgentOutput};
use crate::error::AgentError;
use crate::llm::LlmClient;

/// Agent id of the compiler
pub const COMPILER_ID: &str = "compiler";
/// Event broadcast once outline and settings are written
pub const COMPILATION_COMPLETE: &str = "compilation_complete";

/// Progress milestones given to every compiled goal
const MILESTONES: [(f64, &str); 3] = [
    (0.33, "Identifies the core issue"),
    (0.66, "Analyses options and trade-offs"),
    (1.0, "Commits to a justified course of action"),
];

/// Threshold for every compiled learning-objective target
const DEFAULT_THRESHOLD: f64 = 0.8;

/// Pacing per scenario type: start message and expected progress per block
struct Pacing {
    starts: [u64; 3],
    expected: [f64; 3],
    descriptions: [&'static str; 3],
}

fn pacing(scenario_type: ScenarioType) -> Pacing {
    match scenario_type {
        ScenarioType::Crisis => Pacing {
            starts: [0, 3, 11],
            expected: [0.15, 0.6, 1.0],
            descriptions: [
                "Rapid orientation to the emergency",
                "Escalating pressure and competing demands",
                "Resolution under time pressure",
            ],
        },
        ScenarioType::Negotiation => Pacing {
            starts: [0, 5, 15],
            expected: [0.2, 0.6, 1.0],
            descriptions: [
                "Positions and interests are explored",
                "Offers, concessions and pushback",
                "Agreement or walk-away",
            ],
        },
        ScenarioType::Strategy => Pacing {
            starts: [0, 6, 17],
            expected: [0.2, 0.6, 1.0],
            descriptions: [
                "Situation analysis",
                "Option generation and evaluation",
                "Strategic commitment",
            ],
        },
        ScenarioType::Operations | ScenarioType::Leadership | ScenarioType::Other => Pacing {
            starts: [0, 5, 13],
            expected: [0.2, 0.6, 1.0],
            descriptions: [
                "Orientation to the situation",
                "Working through the core challenges",
                "Decision and next steps",
            ],
        },
    }
}

/// Compiled artifacts
#[derive(Debug, Clone, PartialEq)]
pub struct Compilation {
    /// Draft outline
    pub outline: ScenarioOutline,
    /// Default settings with per-goal targets
    pub settings: DirectorSettings,
}

/// Turns `parsed_data` into `scenario_outline` and `director_settings`
#[derive(Debug, Clone, Default)]
pub struct ScenarioCompiler {
    registry: SchemaRegistry,
}

impl ScenarioCompiler {
    /// Compiler validating with the default registry
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile `parsed`, attaching the narrative and instructions when known
    #[must_use]
    pub fn compile(
        &self,
        parsed: &ParsedScenario,
        narrative: Option<&str>,
        instructions: Option<&str>,
    ) -> Compilation {
        let goals = compile_goals(parsed);
        let goal_ids: Vec<String> = goals.iter().map(|g| g.id.clone()).collect();
        let structure = compile_structure(parsed.scenario_type, &goal_ids);
        let actors = compile_actors(parsed);

        let actor_triggers = actors
            .iter()
            .map(|actor| ActorTrigger {
                id: format!("enter_{}", actor.id),
                actor: actor.id.clone(),
                action: ActorAction::Enter,
                condition: TriggerCondition {
                    after_message: Some(structure.middle.start_message),
                    ..TriggerCondition::default()
                },
                directive: Some(format!(
                    "Bring {} ({}) into the conversation.",
                    actor.name, actor.role
                )),
            })
            .collect();

        let challenges_are_goals = parsed.objectives.is_empty();
        let hidden_information = parsed
            .key_challenges
            .iter()
            .enumerate()
            .map(|(i, fact)| HiddenFact {
                id: format!("h{}", i + 1),
                fact: fact.clone(),
                goal_id: challenges_are_goals
                    .then(|| goal_ids.get(i).cloned())
                    .flatten(),
            })
            .collect();

        let director_triggers = goal_ids
            .iter()
            .map(|gid| DirectorTrigger {
                id: format!("stalled_{gid}"),
                event: format!("goal_stalled:{gid}"),
                goal_id: Some(gid.clone()),
                intervention: InterventionKind::GoalShift,
            })
            .collect();

        let title = parsed.title.clone().or_else(|| {
            parsed
                .context
                .company_name
                .as_ref()
                .map(|c| format!("{c} {}", parsed.scenario_type))
        });

        let outline = ScenarioOutline {
            schema_version: OUTLINE_VERSION,
            title,
            scenario_type: Some(parsed.scenario_type),
            industry: Some(parsed.industry.clone()),
            narrative: narrative.map(str::to_string),
            instructions: instructions.map(str::to_string),
            goals,
            actors,
            hidden_information,
            rules: parsed.constraints.clone(),
            encounters: Vec::new(),
            lessons: Vec::new(),
            tests: Vec::new(),
            actor_triggers,
            director_triggers,
            suggested_structure: Some(structure),
            adaptation_constraints: Some(AdaptationConstraints {
                can_do: vec![
                    "Adjust pacing to the student's progress".to_string(),
                    "Voice the stakeholders named in the scenario".to_string(),
                ],
                cannot_do: vec![
                    "Change the facts of the case".to_string(),
                    "Disclose hidden information unless directed".to_string(),
                ],
                if_student_completely_lost: Some(
                    "Offer one concrete next step toward the highest-priority goal".to_string(),
                ),
            }),
        };

        let mut settings = DirectorSettings::default();
        for (i, gid) in goal_ids.iter().enumerate() {
            let priority = if i == 0 {
                TargetPriority::High
            } else {
                TargetPriority::Medium
            };
            settings = settings.with_target(gid.clone(), DEFAULT_THRESHOLD, priority);
        }

        Compilation { outline, settings }
    }

    /// Compile and validate both artifacts
    ///
    /// # Errors
    /// [`AgentError::Schema`] when either artifact fails its contract.
    pub fn compile_checked(
        &self,
        parsed: &ParsedScenario,
        narrative: Option<&str>,
        instructions: Option<&str>,
    ) -> Result<(Value, Value), AgentError> {
        let compilation = self.compile(parsed, narrative, instructions);
        let outline = self.registry.to_value(&compilation.outline)?;
        let settings = self.registry.to_value(&compilation.settings)?;
        Ok((outline, settings))
    }
}

fn compile_goals(parsed: &ParsedScenario) -> Vec<Goal> {
    let sources: Vec<String> = if !parsed.objectives.is_empty() {
        parsed.objectives.clone()
    } else if !parsed.key_challenges.is_empty() {
        parsed
            .key_challenges
            .iter()
            .map(|c| format!("Address: {c}"))
            .collect()
    } else {
        vec![format!("Resolve the situation: {}", parsed.context.situation)]
    };

    sources
        .into_iter()
        .enumerate()
        .map(|(i, description)| Goal {
            id: format!("g{}", i + 1),
            priority: u32::try_from(i + 1).unwrap_or(u32::MAX),
            required: true,
            success_criteria: SuccessCriteria {
                required_evidence: vec![description.clone()],
                minimum_depth: EvidenceDepth::Moderate,
                assessment_method: AssessmentMethod::LlmAnalysis,
                partial_credit: true,
            },
            progress_tracking: ProgressTracking {
                milestones: MILESTONES
                    .iter()
                    .map(|(at, indicator)| Milestone {
                        at: *at,
                        indicator: (*indicator).to_string(),
                    })
                    .collect(),
                measurement_method: "transcript_analysis".to_string(),
            },
            tests: Vec::new(),
            description,
        })
        .collect()
}

fn compile_structure(scenario_type: ScenarioType, goal_ids: &[String]) -> SuggestedStructure {
    let pacing = pacing(scenario_type);
    let per_block = goal_ids.len().div_ceil(3).max(1);
    let mut chunks = goal_ids.chunks(per_block);
    let mut block = |i: usize| {
        let focus = chunks
            .next()
            .map_or_else(|| goal_ids.to_vec(), <[String]>::to_vec);
        StructureBlock {
            description: pacing.descriptions[i].to_string(),
            start_message: pacing.starts[i],
            goal_ids: focus,
            expected_progress: pacing.expected[i],
        }
    };
    SuggestedStructure {
        beginning: block(0),
        middle: block(1),
        end: block(2),
    }
}

/// Lower-case, underscore-separated id derived from `name`
fn slug(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if c.is_ascii_alphanumeric() {
            out.push(c.to_ascii_lowercase());
        } else if !out.ends_with('_') && !out.is_empty() {
            out.push('_');
        }
    }
    while out.ends_with('_') {
        out.pop();
    }
    if out.is_empty() {
        "actor".to_string()
    } else {
        out
    }
}

fn compile_actors(parsed: &ParsedScenario) -> Vec<OutlineActor> {
    let mut seen = HashSet::new();
    parsed
        .actors
        .iter()
        .map(|actor| {
            let base = slug(&actor.name);
            let mut id = base.clone();
            let mut n = 2;
            while !seen.insert(id.clone()) {
                id = format!("{base}_{n}");
                n += 1;
            }
            OutlineActor {
                id,
                name: actor.name.clone(),
                role: actor.role.clone(),
                description: actor.description.clone(),
            }
        })
        .collect()
}

#[async_trait::async_trait]
impl Agent for ScenarioCompiler {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::new(COMPILER_ID),
            inputs: vec![keys::PARSED_DATA],
            optional_inputs: vec![keys::RAW_INPUT, keys::INSTRUCTIONS],
            outputs: vec![keys::SCENARIO_OUTLINE, keys::DIRECTOR_SETTINGS],
            preserves: vec![keys::PARSED_DATA],
            completion_event: COMPILATION_COMPLETE,
        }
    }

    async fn run(&self, inputs: AgentInputs, _llm: &dyn LlmClient) -> Result<AgentOutput, AgentError> {
        let parsed: ParsedScenario = self
            .registry
            .parse(inputs.get(keys::PARSED_DATA).unwrap_or(&Value::Null))?;
        let (outline, settings) = self.compile_checked(
            &parsed,
            inputs.text(keys::RAW_INPUT),
            inputs.text(keys::INSTRUCTIONS),
        )?;

        let goals = outline["goals"].as_array().map_or(0, Vec::len);
        info!(goals, scenario_type = %parsed.scenario_type, "scenario compiled");
        Ok(AgentOutput::default()
            .write(keys::SCENARIO_OUTLINE, outline)
            .write(keys::DIRECTOR_SETTINGS, settings)
            .with_payload(json!({ "goals": goals })))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sim_schema::{check, Intensity, ParsedActor, ScenarioContext};

    fn parsed(objectives: &[&str], challenges: &[&str]) -> ParsedScenario {
        ParsedScenario {
            title: None,
            scenario_type: ScenarioType::Crisis,
            industry: "technology".into(),
            context: ScenarioContext {
                company_name: Some("TechCorp".into()),
                ..ScenarioContext::default()
            },
            actors: vec![
                ParsedActor {
                    role: "CEO".into(),
                    name: "Sarah Johnson".into(),
                    description: "Founder".into(),
                },
                ParsedActor {
                    role: "VP Engineering".into(),
                    name: "Mike Chen".into(),
                    description: "Owns the platform".into(),
                },
            ],
            constraints: vec!["$50M budget impact".into()],
            objectives: objectives.iter().map(|s| (*s).to_string()).collect(),
            key_challenges: challenges.iter().map(|s| (*s).to_string()).collect(),
        }
    }

    #[test]
    fn goals_follow_objectives() {
        let c = ScenarioCompiler::new().compile(&parsed(&["Contain", "Communicate"], &[]), None, None);
        let ids: Vec<_> = c.outline.goal_ids().collect();
        assert_eq!(ids, vec!["g1", "g2"]);
        let g2 = &c.outline.goals[1];
        assert_eq!(g2.priority, 2);
        assert!(g2.required);
        assert_eq!(g2.success_criteria.required_evidence, vec!["Communicate"]);
        let ats: Vec<_> = g2.progress_tracking.milestones.iter().map(|m| m.at).collect();
        assert_eq!(ats, vec![0.33, 0.66, 1.0]);
        assert!(check(&c.outline).is_ok());
    }

    #[test]
    fn settings_defaults_and_targets() {
        let c = ScenarioCompiler::new().compile(&parsed(&["A", "B"], &[]), None, None);
        let s = &c.settings;
        assert_eq!(s.intensity, Intensity::Assist);
        assert_eq!(s.evaluation_cadence.message_interval, Some(3));
        assert_eq!(
            s.allowed_actor_interventions,
            vec![
                InterventionKind::GoalShift,
                InterventionKind::EnterExitActor,
                InterventionKind::HiddenInfoReveal
            ]
        );
        assert_eq!(s.adaptation_flexibility, 50.0);
        assert_eq!(s.max_latency_ms, 3500);
        assert_eq!(s.max_cost_per_decision, 0.02);
        assert_eq!(s.learning_objective_targets["g1"].priority, TargetPriority::High);
        assert_eq!(s.learning_objective_targets["g2"].priority, TargetPriority::Medium);
        assert_eq!(s.threshold("g2"), Some(0.8));
    }

    #[test]
    fn falls_back_to_challenges_then_situation() {
        let c = ScenarioCompiler::new().compile(&parsed(&[], &["Press leak"]), None, None);
        assert_eq!(c.outline.goals.len(), 1);
        assert!(c.outline.goals[0].description.contains("Press leak"));
        assert_eq!(c.outline.hidden_information[0].goal_id.as_deref(), Some("g1"));

        let c = ScenarioCompiler::new().compile(&parsed(&[], &[]), None, None);
        assert_eq!(c.outline.goals.len(), 1);
        assert!(c.outline.goals[0].description.contains("No description provided"));
    }

    #[test]
    fn crisis_structure_and_actor_triggers() {
        let c = ScenarioCompiler::new().compile(&parsed(&["A", "B", "C", "D"], &[]), None, None);
        let s = c.outline.suggested_structure.as_ref().unwrap();
        assert_eq!(s.beginning.start_message, 0);
        assert_eq!(s.middle.start_message, 3);
        assert_eq!(s.end.start_message, 11);
        assert_eq!(s.beginning.goal_ids, vec!["g1", "g2"]);
        assert_eq!(s.middle.goal_ids, vec!["g3", "g4"]);
        assert_eq!(s.end.goal_ids, vec!["g1", "g2", "g3", "g4"]);

        let ids: Vec<_> = c.outline.actors.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["sarah_johnson", "mike_chen"]);
        assert_eq!(c.outline.actor_triggers.len(), 2);
        assert_eq!(c.outline.actor_triggers[0].condition.after_message, Some(3));
        assert_eq!(c.outline.director_triggers[3].event, "goal_stalled:g4");
        assert_eq!(c.outline.rules, vec!["$50M budget impact"]);
    }

    #[test]
    fn slugs_are_unique() {
        assert_eq!(slug("Sarah  Johnson!"), "sarah_johnson");
        assert_eq!(slug("???"), "actor");
        let mut p = parsed(&["A"], &[]);
        p.actors[1].name = "Sarah Johnson".into();
        let c = ScenarioCompiler::new().compile(&p, None, None);
        assert_eq!(c.outline.actors[1].id, "sarah_johnson_2");
    }
}
