//! Parsed scenario descriptor
//!
//! LLM parser output is untrusted. [`ParsedScenario::repair`] turns any JSON
//! value into a well-formed descriptor, filling sentinels and recording each
//! fix. A descriptor that needed no fixes comes back as [`ParsedData::Clean`].

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::validation::{Validate, Violations};

/// Industry used when none is given
pub const DEFAULT_INDUSTRY: &str = "general";
/// Situation used when none is given
pub const NO_SITUATION: &str = "No description provided";
/// Timeframe or stakes used when none is given
pub const NOT_SPECIFIED: &str = "Not specified";
/// Actor description used when none is given
pub const NO_ACTOR_DESCRIPTION: &str = "No description";
/// Actor role used when none is given
pub const UNKNOWN_ROLE: &str = "Unknown role";

/// Context sub-fields and the sentinel each falls back to
const CONTEXT_DEFAULTS: [(&str, &str); 3] = [
    ("situation", NO_SITUATION),
    ("timeframe", NOT_SPECIFIED),
    ("stakes", NOT_SPECIFIED),
];

/// Fields that must be lists of strings
const LIST_FIELDS: [&str; 3] = ["constraints", "objectives", "key_challenges"];

/// Kind of scenario
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScenarioType {
    /// Time-critical emergency
    Crisis,
    /// Bargaining between parties
    Negotiation,
    /// Long-horizon planning
    Strategy,
    /// Day-to-day execution
    Operations,
    /// People management
    Leadership,
    /// Anything else
    #[default]
    Other,
}

impl ScenarioType {
    /// Every type, as listed in parser prompts
    pub const ALL: [ScenarioType; 6] = [
        Self::Crisis,
        Self::Negotiation,
        Self::Strategy,
        Self::Operations,
        Self::Leadership,
        Self::Other,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Crisis => "crisis",
            Self::Negotiation => "negotiation",
            Self::Strategy => "strategy",
            Self::Operations => "operations",
            Self::Leadership => "leadership",
            Self::Other => "other",
        }
    }

    /// Lower-case `value` and map it to a type; anything unrecognised is `Other`
    #[must_use]
    pub fn coerce(value: &Value) -> Self {
        value
            .as_str()
            .and_then(|s| s.parse().ok())
            .unwrap_or(Self::Other)
    }
}

impl fmt::Display for ScenarioType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScenarioType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lowered)
            .ok_or_else(|| format!("unknown scenario type '{s}'"))
    }
}

/// Where and when the scenario takes place
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ScenarioContext {
    /// Organisation name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    /// What is going on
    pub situation: String,
    /// Time pressure
    pub timeframe: String,
    /// What is at risk
    pub stakes: String,
}

impl Default for ScenarioContext {
    fn default() -> Self {
        Self {
            company_name: None,
            situation: NO_SITUATION.to_string(),
            timeframe: NOT_SPECIFIED.to_string(),
            stakes: NOT_SPECIFIED.to_string(),
        }
    }
}

/// A stakeholder named in the narrative
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedActor {
    /// Position or function
    pub role: String,
    /// Person's name, or the role when unnamed
    pub name: String,
    /// Background
    pub description: String,
}

/// Normalized scenario descriptor
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ParsedScenario {
    /// Short title, when the narrative suggests one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Kind of scenario
    pub scenario_type: ScenarioType,
    /// Industry
    pub industry: String,
    /// Setting
    pub context: ScenarioContext,
    /// Stakeholders
    pub actors: Vec<ParsedActor>,
    /// Hard limits
    pub constraints: Vec<String>,
    /// Learning objectives
    pub objectives: Vec<String>,
    /// Difficulties the student must work through
    pub key_challenges: Vec<String>,
}

/// One fix applied while repairing parser output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Repair {
    /// Dotted path of the repaired field
    pub path: String,
    /// What was done
    pub action: String,
}

impl Repair {
    fn new(path: impl Into<String>, action: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            action: action.into(),
        }
    }
}

impl fmt::Display for Repair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.path, self.action)
    }
}

/// Result of normalizing parser output
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedData {
    /// Output was already well-formed
    Clean(ParsedScenario),
    /// Output needed fixes
    Repaired {
        /// Normalized descriptor
        scenario: ParsedScenario,
        /// Every fix applied
        repairs: Vec<Repair>,
    },
}

impl ParsedData {
    /// The normalized descriptor
    #[must_use]
    pub fn scenario(&self) -> &ParsedScenario {
        match self {
            Self::Clean(s) | Self::Repaired { scenario: s, .. } => s,
        }
    }

    /// Consume into the normalized descriptor
    #[must_use]
    pub fn into_scenario(self) -> ParsedScenario {
        match self {
            Self::Clean(s) | Self::Repaired { scenario: s, .. } => s,
        }
    }

    /// Fixes applied, empty when clean
    #[must_use]
    pub fn repairs(&self) -> &[Repair] {
        match self {
            Self::Clean(_) => &[],
            Self::Repaired { repairs, .. } => repairs,
        }
    }
}

/// Non-blank trimmed string at `value`, if any
fn text(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

struct Repairer {
    repairs: Vec<Repair>,
}

impl Repairer {
    fn text_or(&mut self, obj: &Map<String, Value>, field: &str, path: &str, default: &str) -> String {
        text(obj.get(field)).unwrap_or_else(|| {
            self.repairs
                .push(Repair::new(path, format!("missing, set to '{default}'")));
            default.to_string()
        })
    }

    fn context(&mut self, value: Option<&Value>) -> ScenarioContext {
        let empty = Map::new();
        let obj = match value {
            Some(Value::Object(obj)) => obj,
            _ => {
                self.repairs
                    .push(Repair::new("context", "not an object, using sentinels"));
                &empty
            }
        };
        let [situation, timeframe, stakes] = CONTEXT_DEFAULTS
            .map(|(field, default)| self.text_or(obj, field, &format!("context.{field}"), default));
        ScenarioContext {
            company_name: text(obj.get("company_name")),
            situation,
            timeframe,
            stakes,
        }
    }

    fn actors(&mut self, value: Option<&Value>) -> Vec<ParsedActor> {
        let Some(Value::Array(items)) = value else {
            self.repairs.push(Repair::new("actors", "not an array, set to []"));
            return Vec::new();
        };
        let mut actors = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let path = format!("actors[{i}]");
            match item {
                Value::Object(obj) => {
                    let role = self.text_or(obj, "role", &format!("{path}.role"), UNKNOWN_ROLE);
                    let name = text(obj.get("name")).unwrap_or_else(|| {
                        self.repairs
                            .push(Repair::new(format!("{path}.name"), "missing, set to role"));
                        role.clone()
                    });
                    let description = self.text_or(
                        obj,
                        "description",
                        &format!("{path}.description"),
                        NO_ACTOR_DESCRIPTION,
                    );
                    actors.push(ParsedActor {
                        role,
                        name,
                        description,
                    });
                }
                Value::String(s) if !s.trim().is_empty() => {
                    self.repairs
                        .push(Repair::new(path, "bare string, used as role and name"));
                    actors.push(ParsedActor {
                        role: s.trim().to_string(),
                        name: s.trim().to_string(),
                        description: NO_ACTOR_DESCRIPTION.to_string(),
                    });
                }
                _ => self.repairs.push(Repair::new(path, "not an actor, dropped")),
            }
        }
        actors
    }

    fn list(&mut self, field: &str, value: Option<&Value>) -> Vec<String> {
        let Some(Value::Array(items)) = value else {
            self.repairs
                .push(Repair::new(field, "not an array, set to []"));
            return Vec::new();
        };
        let mut out = Vec::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            match item {
                Value::String(s) if !s.trim().is_empty() => out.push(s.trim().to_string()),
                Value::Number(n) => {
                    self.repairs
                        .push(Repair::new(format!("{field}[{i}]"), "number stringified"));
                    out.push(n.to_string());
                }
                Value::Bool(b) => {
                    self.repairs
                        .push(Repair::new(format!("{field}[{i}]"), "bool stringified"));
                    out.push(b.to_string());
                }
                _ => self
                    .repairs
                    .push(Repair::new(format!("{field}[{i}]"), "not a string, dropped")),
            }
        }
        out
    }
}

impl ParsedScenario {
    /// Normalize arbitrary parser output
    #[must_use]
    pub fn repair(raw: &Value) -> ParsedData {
        let mut r = Repairer {
            repairs: Vec::new(),
        };
        let empty = Map::new();
        let obj = match raw {
            Value::Object(obj) => obj,
            _ => {
                r.repairs.push(Repair::new("$", "not an object"));
                &empty
            }
        };

        let raw_type = obj.get("scenario_type").unwrap_or(&Value::Null);
        let scenario_type = ScenarioType::coerce(raw_type);
        if raw_type.as_str() != Some(scenario_type.as_str()) {
            r.repairs.push(Repair::new(
                "scenario_type",
                format!("{raw_type} coerced to '{scenario_type}'"),
            ));
        }

        let industry = r.text_or(obj, "industry", "industry", DEFAULT_INDUSTRY);
        let context = r.context(obj.get("context"));
        let actors = r.actors(obj.get("actors"));
        let [constraints, objectives, key_challenges] =
            LIST_FIELDS.map(|field| r.list(field, obj.get(field)));

        let scenario = Self {
            title: text(obj.get("title")),
            scenario_type,
            industry,
            context,
            actors,
            constraints,
            objectives,
            key_challenges,
        };
        if r.repairs.is_empty() {
            ParsedData::Clean(scenario)
        } else {
            ParsedData::Repaired {
                scenario,
                repairs: r.repairs,
            }
        }
    }
}

impl Validate for ParsedScenario {
    fn validate(&self, v: &mut Violations) {
        v.non_blank("industry", &self.industry);
        v.non_blank("context.situation", &self.context.situation);
        v.non_blank("context.timeframe", &self.context.timeframe);
        v.non_blank("context.stakes", &self.context.stakes);
        for (i, actor) in self.actors.iter().enumerate() {
            v.non_blank(format!("actors[{i}].role"), &actor.role);
            v.non_blank(format!("actors[{i}].name"), &actor.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::check;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn scenario_type_coercion() {
        assert_eq!(ScenarioType::coerce(&json!("NEGOTIATION")), ScenarioType::Negotiation);
        assert_eq!(ScenarioType::coerce(&json!("invalid_type")), ScenarioType::Other);
        assert_eq!(ScenarioType::coerce(&Value::Null), ScenarioType::Other);
        assert_eq!(ScenarioType::coerce(&json!(7)), ScenarioType::Other);
    }

    #[test]
    fn actor_normalization() {
        let raw = json!({
            "actors": [
                {"role": "CEO", "name": "John Doe", "description": "Leader"},
                {"role": "CFO"},
                {"name": "Jane Smith"}
            ]
        });
        let actors = ParsedScenario::repair(&raw).into_scenario().actors;
        assert_eq!(actors.len(), 3);
        assert_eq!(actors[0].name, "John Doe");
        assert_eq!(actors[1].name, "CFO");
        assert_eq!(actors[1].description, "No description");
        assert_eq!(actors[2].role, "Unknown role");
        assert_eq!(actors[2].name, "Jane Smith");
    }

    #[test]
    fn non_array_fields_become_empty() {
        let raw = json!({
            "actors": null,
            "constraints": "tight budget",
            "objectives": {"a": 1},
            "key_challenges": 3
        });
        let data = ParsedScenario::repair(&raw);
        let s = data.scenario();
        assert!(s.actors.is_empty());
        assert!(s.constraints.is_empty());
        assert!(s.objectives.is_empty());
        assert!(s.key_challenges.is_empty());
        assert!(data.repairs().iter().any(|r| r.path == "objectives"));
    }

    #[test]
    fn missing_context_gets_sentinels() {
        let s = ParsedScenario::repair(&json!({"context": {"company_name": "TechCorp"}}))
            .into_scenario();
        assert_eq!(s.industry, DEFAULT_INDUSTRY);
        assert_eq!(s.context.company_name.as_deref(), Some("TechCorp"));
        assert_eq!(s.context.situation, NO_SITUATION);
        assert_eq!(s.context.timeframe, NOT_SPECIFIED);
        assert_eq!(s.context.stakes, NOT_SPECIFIED);
        assert!(check(&s).is_ok());
    }

    #[test]
    fn well_formed_output_is_clean() {
        let raw = json!({
            "scenario_type": "crisis",
            "industry": "technology",
            "context": {"situation": "Breach", "timeframe": "30 days", "stakes": "$50M"},
            "actors": [{"role": "CEO", "name": "Sarah Johnson", "description": "Founder"}],
            "constraints": ["$50M budget impact"],
            "objectives": ["Contain the breach"],
            "key_challenges": ["Press leak"]
        });
        assert!(matches!(ParsedScenario::repair(&raw), ParsedData::Clean(_)));
    }

    #[test]
    fn list_items_are_stringified_or_dropped() {
        let raw = json!({"constraints": ["a", 5, true, null, {"x": 1}, "  "]});
        let s = ParsedScenario::repair(&raw).into_scenario();
        assert_eq!(s.constraints, vec!["a", "5", "true"]);
    }

    #[test]
    fn bare_string_actor_is_promoted() {
        let s = ParsedScenario::repair(&json!({"actors": ["Regulator", 42]})).into_scenario();
        assert_eq!(s.actors.len(), 1);
        assert_eq!(s.actors[0].role, "Regulator");
        assert_eq!(s.actors[0].name, "Regulator");
    }

    #[test]
    fn non_object_input_is_fully_defaulted() {
        let data = ParsedScenario::repair(&json!("garbage"));
        assert_eq!(data.scenario().scenario_type, ScenarioType::Other);
        assert_eq!(data.repairs()[0].path, "$");
    }
}
