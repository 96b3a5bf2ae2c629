//! Testing utilities for the scenario workspace
//!
//! Shared fixtures and a scripted LLM client.

#![allow(clippy::missing_panics_doc, clippy::must_use_candidate)]

mod fixtures;
mod llm;

pub use fixtures::*;
pub use llm::{JsonHandler, ScriptedLlm, DEFAULT_ADVISOR_REPLY};
