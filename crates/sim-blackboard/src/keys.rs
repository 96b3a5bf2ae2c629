//! Well-known blackboard keys and their schema bindings

use sim_schema::SchemaKind;

/// Instructor's narrative text
pub const RAW_INPUT: &str = "raw_input";
/// Instructor's behavioral instructions for the advisor
pub const INSTRUCTIONS: &str = "instructions";
/// Parser output
pub const PARSED_DATA: &str = "parsed_data";
/// Compiled outline
pub const SCENARIO_OUTLINE: &str = "scenario_outline";
/// Director configuration
pub const DIRECTOR_SETTINGS: &str = "director_settings";
/// Director assessment
pub const DIRECTOR_STATE: &str = "director_state";
/// Session transcript
pub const TRANSCRIPT: &str = "transcript";
/// Intervention awaiting the next advisor turn
pub const PENDING_INTERVENTION: &str = "pending_intervention";

/// Grant wildcard matching every key
pub const ANY_KEY: &str = "*";

/// Key to contract bindings used by every session blackboard
pub const STANDARD_BINDINGS: [(&str, SchemaKind); 6] = [
    (PARSED_DATA, SchemaKind::ParsedScenario),
    (SCENARIO_OUTLINE, SchemaKind::ScenarioOutline),
    (DIRECTOR_SETTINGS, SchemaKind::DirectorSettings),
    (DIRECTOR_STATE, SchemaKind::DirectorState),
    (TRANSCRIPT, SchemaKind::Transcript),
    (PENDING_INTERVENTION, SchemaKind::Intervention),
];
