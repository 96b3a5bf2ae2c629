use std::sync::Arc;

use serde_json::{json, Value};
use sim_agents::ScenarioCompiler;
use sim_blackboard::{keys, AgentId, Blackboard, Grant, Phase};
use sim_schema::{
    DirectorSettings, DirectorState, EvaluationCadence, Intensity, ParsedScenario,
    ScenarioOutline, TargetPriority, Transcript,
};

/// Agent every fixture board grants full access to.
pub const FIXTURE_AGENT: &str = "fixture";

/// Ransomware crisis narrative used across tests.
pub const SAMPLE_NARRATIVE: &str = "TechCorp, a mid-sized technology company, has suffered a \
ransomware attack that took its customer platform offline. CEO Sarah Johnson must decide within \
30 days whether to pay, rebuild, or disclose, with a $50M budget impact on the line. VP of \
Engineering Mike Chen leads the recovery effort.";

/// Advisor instructions paired with [`SAMPLE_NARRATIVE`].
pub const SAMPLE_INSTRUCTIONS: &str = "Act as a Socratic advisor. Ask questions, never hand out answers.";

/// What a well-behaved parser model returns for [`SAMPLE_NARRATIVE`].
pub fn sample_parse_response() -> Value {
    json!({
        "title": "TechCorp Ransomware Crisis",
        "scenario_type": "Crisis",
        "industry": "technology",
        "context": {
            "company_name": "TechCorp",
            "situation": "Ransomware attack took the customer platform offline",
            "timeframe": "30 days",
            "stakes": "$50M and customer trust"
        },
        "actors": [
            {"role": "CEO", "name": "Sarah Johnson", "description": "Chief executive deciding the response"},
            {"role": "VP of Engineering", "name": "Mike Chen", "description": "Leads the technical recovery"}
        ],
        "constraints": ["$50M budget impact", "30 day deadline"],
        "objectives": [
            "Assess the operational impact of the attack",
            "Decide whether to pay the ransom",
            "Plan stakeholder communication"
        ],
        "key_challenges": ["Backups are partially corrupted", "Regulators expect disclosure"]
    })
}

/// [`sample_parse_response`] repaired into a parsed scenario.
pub fn sample_parsed() -> ParsedScenario {
    ParsedScenario::repair(&sample_parse_response()).into_scenario()
}

/// Compiled outline of the sample scenario, with narrative and instructions.
pub fn sample_outline() -> ScenarioOutline {
    ScenarioCompiler::new()
        .compile(&sample_parsed(), Some(SAMPLE_NARRATIVE), Some(SAMPLE_INSTRUCTIONS))
        .outline
}

/// Compiled director settings of the sample scenario.
pub fn sample_settings() -> DirectorSettings {
    ScenarioCompiler::new()
        .compile(&sample_parsed(), None, None)
        .settings
}

/// Single-goal outline, for tests that steer one objective.
pub fn single_goal_outline() -> ScenarioOutline {
    let mut parsed = sample_parsed();
    parsed.objectives.truncate(1);
    ScenarioCompiler::new()
        .compile(&parsed, Some(SAMPLE_NARRATIVE), Some(SAMPLE_INSTRUCTIONS))
        .outline
}

/// Default settings targeting every goal of `outline` at 0.8.
pub fn settings_for(
    outline: &ScenarioOutline,
    intensity: Intensity,
    message_interval: u64,
) -> DirectorSettings {
    let base = DirectorSettings::default()
        .with_intensity(intensity)
        .with_cadence(EvaluationCadence::every_messages(message_interval));
    outline.goals.iter().enumerate().fold(base, |settings, (i, goal)| {
        let priority = if i == 0 {
            TargetPriority::High
        } else {
            TargetPriority::Medium
        };
        settings.with_target(goal.id.clone(), 0.8, priority)
    })
}

/// Director scoring answer.
pub fn score_json(progress: &[(&str, f64)], divergence: f64, tension: f64) -> Value {
    let progress: serde_json::Map<String, Value> = progress
        .iter()
        .map(|(goal, p)| ((*goal).to_string(), json!(p)))
        .collect();
    json!({
        "objective_progress": progress,
        "divergence_score": divergence,
        "tension_score": tension,
        "notes": []
    })
}

/// Self-check answer.
pub fn verify_json(approved: bool) -> Value {
    json!({ "approved": approved, "reason": if approved { "fits the situation" } else { "off target" } })
}

/// Evidence assessment answer.
pub fn assess_json(demonstrated: bool) -> Value {
    json!({ "demonstrated": demonstrated, "evidence": [] })
}

/// Id of [`FIXTURE_AGENT`].
pub fn fixture_agent() -> AgentId {
    AgentId::new(FIXTURE_AGENT)
}

/// Standard board where [`FIXTURE_AGENT`] may read and write everything.
pub fn open_board() -> Arc<Blackboard> {
    let board = Blackboard::standard().unwrap();
    board.grant_permission(
        fixture_agent(),
        Grant::new().reads_all().writes([
            keys::RAW_INPUT,
            keys::INSTRUCTIONS,
            keys::PARSED_DATA,
            keys::SCENARIO_OUTLINE,
            keys::DIRECTOR_SETTINGS,
            keys::DIRECTOR_STATE,
            keys::TRANSCRIPT,
            keys::PENDING_INTERVENTION,
        ]),
    );
    Arc::new(board)
}

/// Board in RUNNING with outline, settings, initial state and an empty transcript.
pub fn running_board(outline: &ScenarioOutline, settings: &DirectorSettings) -> Arc<Blackboard> {
    let board = open_board();
    let agent = fixture_agent();
    board.put(keys::SCENARIO_OUTLINE, outline, &agent).unwrap();
    board.put(keys::DIRECTOR_SETTINGS, settings, &agent).unwrap();
    board.transition(Phase::Running).unwrap();
    board
        .put(keys::DIRECTOR_STATE, &DirectorState::initial(outline), &agent)
        .unwrap();
    board
        .put(keys::TRANSCRIPT, &Transcript::new(), &agent)
        .unwrap();
    board
}
