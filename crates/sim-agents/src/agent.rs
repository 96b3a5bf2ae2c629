//! Agent base
//!
//! An agent declares the keys it reads and writes; [`AgentRunner`] owns the
//! execute template around it:
//!
//! 1. read declared inputs as the agent (`MissingInput` if a required one is absent)
//! 2. [`Agent::run`], which may call the LLM
//! 3. write declared outputs as the agent
//! 4. broadcast the completion event
//!
//! Agents never touch the blackboard directly, so every effect they have goes
//! through the permission and audit layer.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use sim_blackboard::{AgentId, Blackboard, Caller, Grant};
use tracing::{debug, info};

use crate::error::AgentError;
use crate::llm::LlmClient;

/// Static description of an agent's blackboard footprint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentDescriptor {
    /// Agent id used for grants and audit records
    pub id: AgentId,
    /// Keys that must hold a value before the agent runs
    pub inputs: Vec<&'static str>,
    /// Keys read when present
    pub optional_inputs: Vec<&'static str>,
    /// Keys the agent may write
    pub outputs: Vec<&'static str>,
    /// Keys the agent must leave untouched
    pub preserves: Vec<&'static str>,
    /// Event broadcast after outputs are written
    pub completion_event: &'static str,
}

impl AgentDescriptor {
    /// Grant matching this footprint
    #[must_use]
    pub fn grant(&self) -> Grant {
        Grant::new()
            .reads(self.inputs.iter().chain(&self.optional_inputs).copied())
            .writes(self.outputs.iter().copied())
            .preserves(self.preserves.iter().copied())
    }
}

/// Values read for an agent run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentInputs {
    values: BTreeMap<&'static str, Value>,
}

impl AgentInputs {
    /// Value of `key`, if it was present
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// String value of `key`, if present and a string
    #[must_use]
    pub fn text(&self, key: &str) -> Option<&str> {
        self.get(key).and_then(Value::as_str)
    }

    /// Insert a value
    pub fn insert(&mut self, key: &'static str, value: Value) {
        self.values.insert(key, value);
    }
}

/// What an agent run produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AgentOutput {
    /// Key/value pairs to write, in order
    pub writes: Vec<(&'static str, Value)>,
    /// Completion event payload
    pub payload: Value,
}

impl AgentOutput {
    /// Output with one write
    #[must_use]
    pub fn write(mut self, key: &'static str, value: Value) -> Self {
        self.writes.push((key, value));
        self
    }

    /// Set the completion payload
    #[must_use]
    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Summary of one execution
#[derive(Debug, Clone, PartialEq)]
pub struct AgentReport {
    /// Executing agent
    pub agent: AgentId,
    /// Keys written, with their audit seq
    pub written: Vec<(&'static str, u64)>,
    /// Audit seq of the completion broadcast
    pub broadcast_seq: u64,
    /// Completion payload
    pub payload: Value,
}

/// A blackboard agent
#[async_trait::async_trait]
pub trait Agent: Send + Sync {
    /// Footprint of this agent
    fn descriptor(&self) -> AgentDescriptor;

    /// Turn inputs into outputs; the only place an agent may call the LLM
    ///
    /// # Errors
    /// LLM errors propagate unchanged; contract failures surface as
    /// [`AgentError::Schema`].
    async fn run(&self, inputs: AgentInputs, llm: &dyn LlmClient) -> Result<AgentOutput, AgentError>;
}

/// Runs agents against one blackboard
#[derive(Clone)]
pub struct AgentRunner {
    board: Arc<Blackboard>,
    llm: Arc<dyn LlmClient>,
}

impl std::fmt::Debug for AgentRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentRunner")
            .field("board", &self.board)
            .finish_non_exhaustive()
    }
}

impl AgentRunner {
    /// Runner over `board` calling `llm`
    pub fn new(board: Arc<Blackboard>, llm: Arc<dyn LlmClient>) -> Self {
        Self { board, llm }
    }

    /// Blackboard in use
    #[must_use]
    pub fn board(&self) -> &Arc<Blackboard> {
        &self.board
    }

    /// Grant `agent` the permissions its descriptor declares
    pub fn register(&self, agent: &dyn Agent) {
        let descriptor = agent.descriptor();
        self.board
            .grant_permission(descriptor.id.clone(), descriptor.grant());
    }

    /// Execute the template for `agent`
    ///
    /// # Errors
    /// [`AgentError::MissingInput`] for an absent required input; blackboard,
    /// LLM and schema errors propagate unchanged.
    pub async fn execute(&self, agent: &dyn Agent) -> Result<AgentReport, AgentError> {
        let descriptor = agent.descriptor();
        let caller = Caller::from(&descriptor.id);

        let mut inputs = AgentInputs::default();
        for key in &descriptor.inputs {
            let value = self
                .board
                .read(key, &caller)?
                .ok_or_else(|| AgentError::MissingInput {
                    agent: descriptor.id.clone(),
                    key: (*key).to_string(),
                })?;
            inputs.insert(key, value);
        }
        for key in &descriptor.optional_inputs {
            if let Some(value) = self.board.read(key, &caller)? {
                inputs.insert(key, value);
            }
        }

        debug!(agent = %descriptor.id, "agent run started");
        let output = agent.run(inputs, self.llm.as_ref()).await?;

        let mut written = Vec::with_capacity(output.writes.len());
        for (key, value) in output.writes {
            let seq = self.board.write(key, value, &descriptor.id)?;
            written.push((key, seq));
        }
        let broadcast_seq = self.board.broadcast(
            descriptor.completion_event,
            output.payload.clone(),
            &descriptor.id,
        )?;
        info!(
            agent = %descriptor.id,
            event = descriptor.completion_event,
            writes = written.len(),
            "agent completed"
        );

        Ok(AgentReport {
            agent: descriptor.id,
            written,
            broadcast_seq,
            payload: output.payload,
        })
    }
}
