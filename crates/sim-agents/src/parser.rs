//! Parser agent: narrative text to a normalized scenario descriptor
//!
//! The LLM is asked for strict JSON; whatever comes back is repaired into a
//! [`ParsedScenario`] rather than failing the turn.

use serde_json::{json, Value};
use sim_blackboard::{keys, AgentId};
use sim_schema::{FieldError, ParsedData, ParsedScenario, ScenarioType, SchemaError, SchemaKind};
use tracing::{debug, info};

use crate::agent::{Agent, AgentDescriptor, AgentInputs, AgentOutput};
use crate::error::AgentError;
use crate::llm::{LlmClient, LlmRequest, Purpose};

/// Agent id of the parser
pub const PARSER_ID: &str = "parser";
/// Event broadcast once `parsed_data` is written
pub const PARSING_COMPLETE: &str = "parsing_complete";

/// Turns `raw_input` into `parsed_data`
#[derive(Debug, Clone)]
pub struct ParserAgent {
    model: String,
}

impl ParserAgent {
    /// Parser calling `model`
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
        }
    }

    /// Prompt sent for `narrative`
    #[must_use]
    pub fn request(&self, narrative: &str) -> LlmRequest {
        LlmRequest::new(Purpose::Parse, &self.model)
            .system(system_prompt())
            .user(format!("Scenario narrative:\n\n{narrative}"))
            .with_temperature(Some(0.0))
    }
}

fn system_prompt() -> String {
    let types = ScenarioType::ALL
        .iter()
        .map(ScenarioType::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "You extract a structured scenario description from a business case narrative.\n\
         Respond with a single strict JSON object and nothing else: no prose, no markdown fences.\n\
         Required fields:\n\
         - title: short title for the case\n\
         - scenario_type: one of [{types}]\n\
         - industry: the industry the case takes place in\n\
         - context: object with company_name, situation, timeframe, stakes\n\
         - actors: array of objects with role, name, description\n\
         - constraints: array of strings\n\
         - objectives: array of strings (what the student should achieve)\n\
         - key_challenges: array of strings\n\
         Use empty arrays rather than omitting list fields."
    )
}

#[async_trait::async_trait]
impl Agent for ParserAgent {
    fn descriptor(&self) -> AgentDescriptor {
        AgentDescriptor {
            id: AgentId::new(PARSER_ID),
            inputs: vec![keys::RAW_INPUT],
            optional_inputs: vec![],
            outputs: vec![keys::PARSED_DATA],
            preserves: vec![keys::RAW_INPUT],
            completion_event: PARSING_COMPLETE,
        }
    }

    async fn run(&self, inputs: AgentInputs, llm: &dyn LlmClient) -> Result<AgentOutput, AgentError> {
        let narrative = match inputs.get(keys::RAW_INPUT) {
            Some(Value::String(s)) => s.clone(),
            Some(other) => other.to_string(),
            None => String::new(),
        };
        let request = self.request(&narrative);
        debug!(chars = request.prompt_chars(), "parser prompt built");

        let response = llm.complete_json(request).await?;
        let parsed = ParsedScenario::repair(&response.value);
        let repairs = parsed.repairs().len();
        if let ParsedData::Repaired { repairs, .. } = &parsed {
            for repair in repairs {
                debug!(%repair, "parser output repaired");
            }
        }
        let scenario = parsed.into_scenario();
        info!(
            scenario_type = %scenario.scenario_type,
            actors = scenario.actors.len(),
            objectives = scenario.objectives.len(),
            repairs,
            "narrative parsed"
        );

        let payload = json!({
            "scenario_type": scenario.scenario_type,
            "actors": scenario.actors.len(),
            "repairs": repairs,
        });
        let value = serde_json::to_value(&scenario).map_err(|e| {
            SchemaError::invalid(
                SchemaKind::ParsedScenario,
                vec![FieldError::new("$", e.to_string())],
            )
        })?;
        Ok(AgentOutput::default()
            .write(keys::PARSED_DATA, value)
            .with_payload(payload))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prompt_lists_fields_and_types() {
        let req = ParserAgent::new("m").request("TechCorp is in trouble.");
        let system = req.system_prompt();
        for field in [
            "scenario_type",
            "industry",
            "context",
            "actors",
            "constraints",
            "objectives",
            "key_challenges",
        ] {
            assert!(system.contains(field), "prompt should mention {field}");
        }
        for t in ScenarioType::ALL {
            assert!(system.contains(t.as_str()));
        }
        assert!(system.contains("strict JSON"));
        assert_eq!(req.purpose, Purpose::Parse);
    }

    #[test]
    fn descriptor_grant_preserves_raw_input() {
        let grant = ParserAgent::new("m").descriptor().grant();
        assert!(grant.can_read(keys::RAW_INPUT));
        assert!(!grant.can_write(keys::RAW_INPUT));
        assert!(grant.can_write(keys::PARSED_DATA));
    }
}
