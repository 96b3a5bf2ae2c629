//! Scenario Agents
//!
//! Blackboard agents and the LLM seam they share.
//!
//! # Core Concepts
//!
//! - [`Agent`]: declares its key footprint and turns inputs into outputs
//! - [`AgentRunner`]: read, run, write, broadcast; everything goes through
//!   the blackboard's permission and audit layer
//! - [`ParserAgent`]: narrative text to `parsed_data`
//! - [`ScenarioCompiler`]: `parsed_data` to outline and director settings
//! - [`LlmClient`]: provider contract with per-call usage reporting
//!
//! # Example
//!
//! ```rust,ignore
//! use sim_agents::{AgentRunner, ParserAgent, ScenarioCompiler};
//!
//! let runner = AgentRunner::new(board, llm);
//! let parser = ParserAgent::new(&models.parser);
//! let compiler = ScenarioCompiler::new();
//! runner.register(&parser);
//! runner.register(&compiler);
//! runner.execute(&parser).await?;
//! runner.execute(&compiler).await?;
//! ```

mod agent;
mod compiler;
mod error;
mod llm;
mod parser;

pub use agent::{Agent, AgentDescriptor, AgentInputs, AgentOutput, AgentReport, AgentRunner};
pub use compiler::{Compilation, ScenarioCompiler, COMPILATION_COMPLETE, COMPILER_ID};
pub use error::{AgentError, LlmError};
pub use llm::{
    ChatMessage, ChatRole, LlmClient, LlmRequest, LlmResponse, ModelConfig, Purpose, TokenUsage,
};
pub use parser::{ParserAgent, PARSER_ID, PARSING_COMPLETE};
