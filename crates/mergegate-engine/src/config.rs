//! Engine configuration.
//!
//! Loadable from a JSON file with in-code defaults; binaries layer env
//! overrides on top where it matters (database URL, tokens).

use std::path::Path;

use serde::{Deserialize, Serialize};

use mergegate_core::{default_plan, StepName, StepSpec};
use mergegate_gateway::{BreakerConfig, RetryPolicy};
use mergegate_tickets::{ResolverConfig, TicketConfig};

/// Configuration for one external checker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckerConfig {
    /// The step this checker serves.
    pub step: StepName,

    /// Endpoint the HTTP client posts check requests to.
    pub endpoint: String,

    /// Disabled checkers are skipped without being called.
    pub enabled: bool,
}

/// Human review gate configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewConfig {
    /// Minimum distinct approvals required.
    pub min_approvals: u32,

    /// Review deadline in seconds; escalation thresholds fire at 50% and
    /// 87.5% of this window.
    pub deadline_secs: u64,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            min_approvals: 1,
            deadline_secs: 4 * 60 * 60,
        }
    }
}

/// Top-level engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Declared step order and conditions.
    #[serde(default = "default_plan")]
    pub plan: Vec<StepSpec>,

    /// Whole-workflow deadline in seconds.
    pub workflow_deadline_secs: u64,

    /// Maximum concurrently executing instances per repository.
    pub max_concurrent_per_repo: usize,

    /// Human review gate settings.
    pub review: ReviewConfig,

    /// Checker endpoints, one per checker step.
    pub checkers: Vec<CheckerConfig>,

    /// Retry/backoff bounds for the gateway.
    pub retry: RetryPolicy,

    /// Circuit breaker thresholds for the gateway.
    pub breaker: BreakerConfig,

    /// Hard per-attempt timeout for outbound calls, in milliseconds.
    pub attempt_timeout_ms: u64,

    /// Identity resolver settings.
    pub resolver: ResolverConfig,

    /// Ticket subsystem settings.
    pub tickets: TicketConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            plan: default_plan(),
            workflow_deadline_secs: 6 * 60 * 60,
            max_concurrent_per_repo: 8,
            review: ReviewConfig::default(),
            checkers: Vec::new(),
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            attempt_timeout_ms: 30_000,
            resolver: ResolverConfig::default(),
            tickets: TicketConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let config: EngineConfig = serde_json::from_str(&raw)?;
        Ok(config)
    }

    /// The step timeout declared in the plan, in seconds.
    pub fn step_timeout_secs(&self, step: StepName) -> Option<u64> {
        self.plan.iter().find(|s| s.name == step).map(|s| s.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_has_full_plan() {
        let config = EngineConfig::default();
        assert_eq!(config.plan.len(), 5);
        assert_eq!(config.plan.last().unwrap().name, StepName::HumanReview);
    }

    #[test]
    fn test_config_json_round_trip() {
        let config = EngineConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let back: EngineConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }

    #[test]
    fn test_step_timeout_lookup() {
        let config = EngineConfig::default();
        assert_eq!(config.step_timeout_secs(StepName::StandardsCheck), Some(300));
        assert_eq!(
            config.step_timeout_secs(StepName::HumanReview),
            Some(4 * 60 * 60)
        );
    }
}
