//! LLM client seam
//!
//! Providers are external collaborators. The core only depends on
//! [`LlmClient`]: a JSON-mode completion for structured output and a plain
//! completion for advisor prose. Every response reports its usage so the
//! Director can enforce its per-decision cost cap.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::LlmError;

/// Speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChatRole {
    /// Instructions
    System,
    /// Learner or agent input
    User,
    /// Model output
    Assistant,
}

/// One chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Speaker
    pub role: ChatRole,
    /// Text
    pub content: String,
}

impl ChatMessage {
    /// System message
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::System,
            content: content.into(),
        }
    }

    /// User message
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    /// Assistant message
    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

/// Why a call is made; lets test doubles and providers route by use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Purpose {
    /// Narrative parsing
    Parse,
    /// Advisor reply
    Advise,
    /// Director scoring
    Score,
    /// Director intervention self-check
    Verify,
    /// Director intervention regeneration
    Regenerate,
    /// Goal evidence assessment
    Assess,
}

impl fmt::Display for Purpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Parse => "parse",
            Self::Advise => "advise",
            Self::Score => "score",
            Self::Verify => "verify",
            Self::Regenerate => "regenerate",
            Self::Assess => "assess",
        })
    }
}

/// A completion request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmRequest {
    /// Why the call is made
    pub purpose: Purpose,
    /// Provider model name
    pub model: String,
    /// Conversation
    pub messages: Vec<ChatMessage>,
    /// Sampling temperature; provider default when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

impl LlmRequest {
    /// Empty request
    pub fn new(purpose: Purpose, model: impl Into<String>) -> Self {
        Self {
            purpose,
            model: model.into(),
            messages: Vec::new(),
            temperature: None,
        }
    }

    /// Append a system message
    #[must_use]
    pub fn system(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::system(content));
        self
    }

    /// Append a user message
    #[must_use]
    pub fn user(mut self, content: impl Into<String>) -> Self {
        self.messages.push(ChatMessage::user(content));
        self
    }

    /// Append messages
    #[must_use]
    pub fn messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.messages.extend(messages);
        self
    }

    /// Set the temperature
    #[inline]
    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Concatenated system messages
    #[must_use]
    pub fn system_prompt(&self) -> String {
        self.messages
            .iter()
            .filter(|m| m.role == ChatRole::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    /// Total characters across messages
    #[must_use]
    pub fn prompt_chars(&self) -> usize {
        self.messages.iter().map(|m| m.content.len()).sum()
    }
}

/// Usage reported for one call
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    /// Prompt tokens
    pub prompt_tokens: u64,
    /// Completion tokens
    pub completion_tokens: u64,
    /// Spend in USD
    pub cost_usd: f64,
}

impl TokenUsage {
    /// Sum of two usages
    #[must_use]
    pub fn combined(self, other: TokenUsage) -> Self {
        Self {
            prompt_tokens: self.prompt_tokens + other.prompt_tokens,
            completion_tokens: self.completion_tokens + other.completion_tokens,
            cost_usd: self.cost_usd + other.cost_usd,
        }
    }
}

/// A completion with its usage
#[derive(Debug, Clone, PartialEq)]
pub struct LlmResponse<T> {
    /// Parsed JSON or prose
    pub value: T,
    /// Reported usage
    pub usage: TokenUsage,
}

impl<T> LlmResponse<T> {
    /// Response with zero usage
    pub fn new(value: T) -> Self {
        Self {
            value,
            usage: TokenUsage::default(),
        }
    }

    /// Attach usage
    #[must_use]
    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// LLM provider contract
#[async_trait::async_trait]
pub trait LlmClient: Send + Sync {
    /// JSON-mode completion; the provider parses the body
    ///
    /// # Errors
    /// [`LlmError::Transport`] when the provider is unavailable,
    /// [`LlmError::Malformed`] when the body is not JSON.
    async fn complete_json(&self, request: LlmRequest) -> Result<LlmResponse<Value>, LlmError>;

    /// Plain-text completion
    ///
    /// # Errors
    /// [`LlmError::Transport`] when the provider is unavailable.
    async fn complete(&self, request: LlmRequest) -> Result<LlmResponse<String>, LlmError>;
}

/// Models used per role, plus provider credentials passed through untouched
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Model for the parser agent
    pub parser: String,
    /// Model for advisor replies
    pub advisor: String,
    /// Model for director scoring, verification and assessment
    pub director: String,
    /// Provider API key
    pub api_key: Option<String>,
    /// Provider base URL
    pub base_url: Option<String>,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            parser: "gpt-4o-mini".to_string(),
            advisor: "gpt-4o".to_string(),
            director: "gpt-4o-mini".to_string(),
            api_key: None,
            base_url: None,
        }
    }
}

impl ModelConfig {
    /// Defaults overridden by `SIM_PARSER_MODEL`, `SIM_ADVISOR_MODEL`,
    /// `SIM_DIRECTOR_MODEL`, `SIM_LLM_API_KEY` and `SIM_LLM_BASE_URL`
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        Self {
            parser: get("SIM_PARSER_MODEL").unwrap_or(defaults.parser),
            advisor: get("SIM_ADVISOR_MODEL").unwrap_or(defaults.advisor),
            director: get("SIM_DIRECTOR_MODEL").unwrap_or(defaults.director),
            api_key: get("SIM_LLM_API_KEY"),
            base_url: get("SIM_LLM_BASE_URL"),
        }
    }

    /// Use `model` for every role
    #[must_use]
    pub fn uniform(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            parser: model.clone(),
            advisor: model.clone(),
            director: model,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder_collects_messages() {
        let req = LlmRequest::new(Purpose::Advise, "m")
            .system("be kind")
            .system("stay in character")
            .user("hi")
            .with_temperature(Some(0.3));
        assert_eq!(req.messages.len(), 3);
        assert_eq!(req.system_prompt(), "be kind\n\nstay in character");
        assert_eq!(req.temperature, Some(0.3));
    }

    #[test]
    fn usage_adds_up() {
        let a = TokenUsage {
            prompt_tokens: 10,
            completion_tokens: 5,
            cost_usd: 0.01,
        };
        let total = a.combined(a);
        assert_eq!(total.prompt_tokens, 20);
        assert!((total.cost_usd - 0.02).abs() < 1e-12);
    }

    #[test]
    fn model_config_lookup() {
        let cfg = ModelConfig::from_lookup(|name| match name {
            "SIM_ADVISOR_MODEL" => Some("advisor-x".to_string()),
            "SIM_PARSER_MODEL" => Some("   ".to_string()),
            "SIM_LLM_API_KEY" => Some("secret".to_string()),
            _ => None,
        });
        assert_eq!(cfg.advisor, "advisor-x");
        assert_eq!(cfg.parser, ModelConfig::default().parser);
        assert_eq!(cfg.api_key.as_deref(), Some("secret"));
        assert!(cfg.base_url.is_none());
    }
}
