//! Per-evaluation spend and latency caps

use std::fmt;

use serde::{Deserialize, Serialize};
use sim_agents::TokenUsage;

/// Which cap an evaluation hit
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cap", rename_all = "snake_case")]
pub enum BudgetBreach {
    /// Wall-clock time exceeded `max_latency_ms`
    Latency {
        /// Configured cap
        limit_ms: u64,
    },
    /// Cumulative LLM spend exceeded `max_cost_per_decision`
    Cost {
        /// Spend at the time of the breach
        spent_usd: f64,
        /// Configured cap
        limit_usd: f64,
    },
}

impl fmt::Display for BudgetBreach {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Latency { limit_ms } => write!(f, "latency over {limit_ms}ms"),
            Self::Cost {
                spent_usd,
                limit_usd,
            } => write!(f, "cost ${spent_usd:.4} over ${limit_usd:.4}"),
        }
    }
}

/// Running LLM spend for one evaluation
#[derive(Debug, Clone, Default)]
pub struct CostMeter {
    limit_usd: f64,
    usage: TokenUsage,
    calls: u32,
}

impl CostMeter {
    /// Meter capped at `limit_usd`
    #[must_use]
    pub fn new(limit_usd: f64) -> Self {
        Self {
            limit_usd,
            ..Self::default()
        }
    }

    /// Record one call's usage
    ///
    /// # Errors
    /// [`BudgetBreach::Cost`] once the total exceeds the cap.
    pub fn charge(&mut self, usage: TokenUsage) -> Result<(), BudgetBreach> {
        self.usage = self.usage.combined(usage);
        self.calls += 1;
        if self.usage.cost_usd > self.limit_usd {
            return Err(BudgetBreach::Cost {
                spent_usd: self.usage.cost_usd,
                limit_usd: self.limit_usd,
            });
        }
        Ok(())
    }

    /// Spend so far
    #[must_use]
    pub fn spent(&self) -> f64 {
        self.usage.cost_usd
    }

    /// LLM calls so far
    #[must_use]
    pub fn calls(&self) -> u32 {
        self.calls
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(cost_usd: f64) -> TokenUsage {
        TokenUsage {
            cost_usd,
            ..TokenUsage::default()
        }
    }

    #[test]
    fn charges_until_cap() {
        let mut meter = CostMeter::new(0.02);
        assert!(meter.charge(usage(0.01)).is_ok());
        assert!(meter.charge(usage(0.01)).is_ok());
        let breach = meter.charge(usage(0.005)).unwrap_err();
        assert!(matches!(breach, BudgetBreach::Cost { .. }));
        assert_eq!(meter.calls(), 3);
        assert!(breach.to_string().starts_with("cost $0.0250"));
    }

    #[test]
    fn zero_cap_allows_free_calls() {
        let mut meter = CostMeter::new(0.0);
        assert!(meter.charge(usage(0.0)).is_ok());
        assert!(meter.charge(usage(0.001)).is_err());
    }
}
