//! Schema registry
//!
//! Single entry point for validating contract payloads. A payload is
//! deserialized into its typed contract (applying defaults), checked with
//! [`Validate`], and re-serialized; the re-serialized value is what callers
//! store. Unknown fields are dropped and logged at `debug`.

use std::fmt;
use std::str::FromStr;

use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{FieldError, SchemaError};
use crate::intervention::Intervention;
use crate::outline::ScenarioOutline;
use crate::parsed::ParsedScenario;
use crate::settings::DirectorSettings;
use crate::state::DirectorState;
use crate::transcript::Transcript;
use crate::validation::{check, Validate};
use crate::version::SchemaVersion;

/// Contract version implemented by this registry
pub const OUTLINE_VERSION: SchemaVersion = SchemaVersion::new(1, 0, 0);

/// The registered contracts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SchemaKind {
    /// [`ScenarioOutline`]
    ScenarioOutline,
    /// [`DirectorSettings`]
    DirectorSettings,
    /// [`DirectorState`]
    DirectorState,
    /// [`ParsedScenario`]
    ParsedScenario,
    /// [`Transcript`]
    Transcript,
    /// [`Intervention`]
    Intervention,
}

impl SchemaKind {
    /// Every registered kind
    pub const ALL: [SchemaKind; 6] = [
        Self::ScenarioOutline,
        Self::DirectorSettings,
        Self::DirectorState,
        Self::ParsedScenario,
        Self::Transcript,
        Self::Intervention,
    ];

    /// Wire name
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ScenarioOutline => "scenario_outline",
            Self::DirectorSettings => "director_settings",
            Self::DirectorState => "director_state",
            Self::ParsedScenario => "parsed_scenario",
            Self::Transcript => "transcript",
            Self::Intervention => "intervention",
        }
    }
}

impl fmt::Display for SchemaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SchemaKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().replace('-', "_");
        Self::ALL
            .into_iter()
            .find(|k| k.as_str() == wanted)
            .ok_or_else(|| format!("unknown schema kind '{s}'"))
    }
}

/// A typed contract known to the registry
pub trait Contract: Serialize + DeserializeOwned + Validate + JsonSchema {
    /// Registry kind of this contract
    const KIND: SchemaKind;
}

impl Contract for ScenarioOutline {
    const KIND: SchemaKind = SchemaKind::ScenarioOutline;
}

impl Contract for DirectorSettings {
    const KIND: SchemaKind = SchemaKind::DirectorSettings;
}

impl Contract for DirectorState {
    const KIND: SchemaKind = SchemaKind::DirectorState;
}

impl Contract for ParsedScenario {
    const KIND: SchemaKind = SchemaKind::ParsedScenario;
}

impl Contract for Transcript {
    const KIND: SchemaKind = SchemaKind::Transcript;
}

impl Contract for Intervention {
    const KIND: SchemaKind = SchemaKind::Intervention;
}

/// Outcome of [`SchemaRegistry::validate`]
#[derive(Debug, Clone, PartialEq)]
pub enum Validation {
    /// Payload accepted; normalized value with defaults applied
    Valid(Value),
    /// Payload rejected
    Invalid(Vec<FieldError>),
}

impl Validation {
    /// Whether the payload was accepted
    #[inline]
    #[must_use]
    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    /// Normalized value, if accepted
    #[must_use]
    pub fn value(&self) -> Option<&Value> {
        match self {
            Self::Valid(v) => Some(v),
            Self::Invalid(_) => None,
        }
    }
}

/// Validates payloads against the registered contracts
#[derive(Debug, Clone)]
pub struct SchemaRegistry {
    version: SchemaVersion,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SchemaRegistry {
    /// Registry implementing [`OUTLINE_VERSION`]
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self {
            version: OUTLINE_VERSION,
        }
    }

    /// Registry implementing `version`
    #[inline]
    #[must_use]
    pub fn with_version(mut self, version: SchemaVersion) -> Self {
        self.version = version;
        self
    }

    /// Contract version implemented
    #[inline]
    #[must_use]
    pub fn version(&self) -> SchemaVersion {
        self.version
    }

    /// Validate `payload` as `kind`
    #[must_use]
    pub fn validate(&self, kind: SchemaKind, payload: &Value) -> Validation {
        match self.strict(kind, payload) {
            Ok(value) => Validation::Valid(value),
            Err(err) => Validation::Invalid(err.field_errors()),
        }
    }

    /// Validate `payload` as `kind`, failing with [`SchemaError`]
    ///
    /// # Errors
    /// Returns [`SchemaError::Invalid`] listing every violation, or
    /// [`SchemaError::IncompatibleSchemaVersion`] for a cross-major outline.
    pub fn strict(&self, kind: SchemaKind, payload: &Value) -> Result<Value, SchemaError> {
        match kind {
            SchemaKind::ScenarioOutline => self.normalize::<ScenarioOutline>(payload),
            SchemaKind::DirectorSettings => self.normalize::<DirectorSettings>(payload),
            SchemaKind::DirectorState => self.normalize::<DirectorState>(payload),
            SchemaKind::ParsedScenario => self.normalize::<ParsedScenario>(payload),
            SchemaKind::Transcript => self.normalize::<Transcript>(payload),
            SchemaKind::Intervention => self.normalize::<Intervention>(payload),
        }
    }

    /// Deserialize and validate `payload` as `T`
    ///
    /// # Errors
    /// Same as [`SchemaRegistry::strict`].
    pub fn parse<T: Contract>(&self, payload: &Value) -> Result<T, SchemaError> {
        if T::KIND == SchemaKind::ScenarioOutline {
            self.check_version(payload)?;
        }
        let typed: T = serde_json::from_value(payload.clone()).map_err(|e| {
            SchemaError::invalid(T::KIND, vec![FieldError::new("$", e.to_string())])
        })?;
        check(&typed).map_err(|errors| SchemaError::invalid(T::KIND, errors))?;
        Ok(typed)
    }

    /// Validate a typed value and serialize it
    ///
    /// # Errors
    /// Returns [`SchemaError::Invalid`] listing every violation.
    pub fn to_value<T: Contract>(&self, typed: &T) -> Result<Value, SchemaError> {
        check(typed).map_err(|errors| SchemaError::invalid(T::KIND, errors))?;
        serde_json::to_value(typed).map_err(|e| {
            SchemaError::invalid(T::KIND, vec![FieldError::new("$", e.to_string())])
        })
    }

    /// JSON Schema of `kind`
    #[must_use]
    pub fn json_schema(kind: SchemaKind) -> Value {
        let schema = match kind {
            SchemaKind::ScenarioOutline => schemars::schema_for!(ScenarioOutline),
            SchemaKind::DirectorSettings => schemars::schema_for!(DirectorSettings),
            SchemaKind::DirectorState => schemars::schema_for!(DirectorState),
            SchemaKind::ParsedScenario => schemars::schema_for!(ParsedScenario),
            SchemaKind::Transcript => schemars::schema_for!(Transcript),
            SchemaKind::Intervention => schemars::schema_for!(Intervention),
        };
        serde_json::to_value(schema).unwrap_or_default()
    }

    fn normalize<T: Contract>(&self, payload: &Value) -> Result<Value, SchemaError> {
        let typed: T = self.parse(payload)?;
        let value = self.to_value(&typed)?;
        let mut unknown = Vec::new();
        unknown_fields(payload, &value, "$", &mut unknown);
        for path in unknown {
            debug!(kind = %T::KIND, field = %path, "ignoring unknown field");
        }
        Ok(value)
    }

    fn check_version(&self, payload: &Value) -> Result<(), SchemaError> {
        let Some(raw) = payload.get("schema_version").and_then(Value::as_str) else {
            return Ok(());
        };
        let found: SchemaVersion = raw.parse()?;
        if found.check_compatibility(&self.version).is_accepted() {
            Ok(())
        } else {
            Err(SchemaError::IncompatibleSchemaVersion {
                expected: self.version,
                found,
            })
        }
    }
}

/// Collect paths present in `input` but absent from the normalized `output`
fn unknown_fields(input: &Value, output: &Value, path: &str, out: &mut Vec<String>) {
    match (input, output) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, value) in a {
                let child = format!("{path}.{key}");
                match b.get(key) {
                    Some(normalized) => unknown_fields(value, normalized, &child, out),
                    None if !is_empty_value(value) => out.push(child),
                    None => {}
                }
            }
        }
        (Value::Array(a), Value::Array(b)) => {
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                unknown_fields(x, y, &format!("{path}[{i}]"), out);
            }
        }
        _ => {}
    }
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn outline() -> Value {
        json!({
            "schema_version": "1.0.0",
            "goals": [{
                "id": "g1",
                "description": "Decide on layoffs",
                "success_criteria": {"required_evidence": ["headcount plan"]},
                "progress_tracking": {"milestones": [{"at": 1.0, "indicator": "decides"}]}
            }]
        })
    }

    #[test]
    fn validate_applies_defaults() {
        let registry = SchemaRegistry::new();
        let Validation::Valid(value) = registry.validate(SchemaKind::DirectorSettings, &json!({}))
        else {
            panic!("default settings must validate");
        };
        assert_eq!(value["intensity"], json!("assist"));
        assert_eq!(value["max_cost_per_decision"], json!(0.02));
    }

    #[test]
    fn validate_reports_errors() {
        let registry = SchemaRegistry::new();
        let result = registry.validate(
            SchemaKind::DirectorSettings,
            &json!({"max_latency_ms": 20_000, "adaptation_flexibility": -1}),
        );
        match result {
            Validation::Invalid(errors) => assert_eq!(errors.len(), 2),
            Validation::Valid(_) => panic!("should be rejected"),
        }
    }

    #[test]
    fn unknown_fields_are_dropped() {
        let registry = SchemaRegistry::new();
        let mut payload = outline();
        payload["mood"] = json!("sunny");
        let value = registry.strict(SchemaKind::ScenarioOutline, &payload).unwrap();
        assert!(value.get("mood").is_none());

        let mut found = Vec::new();
        unknown_fields(&payload, &value, "$", &mut found);
        assert_eq!(found, vec!["$.mood".to_string()]);
    }

    #[test]
    fn same_major_accepted_cross_major_rejected() {
        let registry = SchemaRegistry::new();
        let mut payload = outline();
        payload["schema_version"] = json!("1.4.7");
        assert!(registry.validate(SchemaKind::ScenarioOutline, &payload).is_valid());

        payload["schema_version"] = json!("2.0.0");
        let err = registry
            .strict(SchemaKind::ScenarioOutline, &payload)
            .unwrap_err();
        assert!(matches!(err, SchemaError::IncompatibleSchemaVersion { .. }));
    }

    #[test]
    fn strict_typed_parse() {
        let registry = SchemaRegistry::new();
        let parsed: ScenarioOutline = registry.parse(&outline()).unwrap();
        assert_eq!(parsed.goals[0].id, "g1");
        assert!(registry.parse::<ScenarioOutline>(&json!({"goals": []})).is_err());
    }

    #[test]
    fn kind_names_parse() {
        for kind in SchemaKind::ALL {
            assert_eq!(kind.as_str().parse::<SchemaKind>().unwrap(), kind);
        }
        assert_eq!(
            "director-settings".parse::<SchemaKind>().unwrap(),
            SchemaKind::DirectorSettings
        );
    }

    #[test]
    fn json_schema_export_names_fields() {
        let schema = SchemaRegistry::json_schema(SchemaKind::DirectorSettings);
        let props = &schema["properties"];
        assert!(props.get("intensity").is_some());
        assert!(props.get("evaluation_cadence").is_some());
    }
}
