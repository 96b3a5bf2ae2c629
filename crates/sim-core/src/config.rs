//! Session configuration

use sim_agents::ModelConfig;
use tracing::warn;

/// Default transcript cap, in turns
pub const DEFAULT_MAX_TRANSCRIPT_TURNS: usize = 400;
/// Default advisor deadline
pub const DEFAULT_TURN_TIMEOUT_MS: u64 = 30_000;

/// Runtime limits and models for sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Models per role
    pub models: ModelConfig,
    /// Transcript cap; a turn that would exceed it is rejected
    pub max_transcript_turns: usize,
    /// Deadline for the advisor call of one turn
    pub turn_timeout_ms: u64,
    /// Run the director after every student turn
    pub auto_direct: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            models: ModelConfig::default(),
            max_transcript_turns: DEFAULT_MAX_TRANSCRIPT_TURNS,
            turn_timeout_ms: DEFAULT_TURN_TIMEOUT_MS,
            auto_direct: true,
        }
    }
}

fn parsed<T: std::str::FromStr>(name: &str, raw: Option<String>, default: T) -> T {
    match raw {
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!(variable = name, value = %raw, "ignoring unparsable setting");
            default
        }),
        None => default,
    }
}

impl SessionConfig {
    /// Default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `SIM_MAX_TRANSCRIPT_TURNS`, `SIM_TURN_TIMEOUT_MS`
    /// and the model variables read by [`ModelConfig::from_env`]
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Defaults overridden by whatever `lookup` returns
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        Self {
            models: ModelConfig::from_lookup(&lookup),
            max_transcript_turns: parsed(
                "SIM_MAX_TRANSCRIPT_TURNS",
                lookup("SIM_MAX_TRANSCRIPT_TURNS"),
                defaults.max_transcript_turns,
            ),
            turn_timeout_ms: parsed(
                "SIM_TURN_TIMEOUT_MS",
                lookup("SIM_TURN_TIMEOUT_MS"),
                defaults.turn_timeout_ms,
            ),
            auto_direct: defaults.auto_direct,
        }
    }

    /// With models
    #[inline]
    #[must_use]
    pub fn with_models(mut self, models: ModelConfig) -> Self {
        self.models = models;
        self
    }

    /// With transcript cap
    #[inline]
    #[must_use]
    pub fn with_max_transcript_turns(mut self, turns: usize) -> Self {
        self.max_transcript_turns = turns;
        self
    }

    /// With advisor deadline
    #[inline]
    #[must_use]
    pub fn with_turn_timeout_ms(mut self, ms: u64) -> Self {
        self.turn_timeout_ms = ms;
        self
    }

    /// Whether `post_student` runs the director itself
    #[inline]
    #[must_use]
    pub fn with_auto_direct(mut self, enabled: bool) -> Self {
        self.auto_direct = enabled;
        self
    }
}
