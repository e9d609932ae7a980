//! Retry policy: exponential backoff with full jitter.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Bounded exponential backoff configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,

    /// Base delay before the second attempt.
    pub base_delay_ms: u64,

    /// Cap on the computed backoff delay.
    pub max_delay_ms: u64,

    /// Exponential growth factor.
    pub multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 200,
            max_delay_ms: 5_000,
            multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// Delay to sleep after `completed_attempts` failed attempts.
    ///
    /// Full jitter: a uniform sample from zero up to the capped exponential
    /// envelope. A server-provided `retry_after_ms` hint acts as a floor —
    /// we never call back sooner than the server asked.
    pub fn backoff_delay(&self, completed_attempts: u32, retry_after_ms: Option<u64>) -> Duration {
        let exponent = completed_attempts.saturating_sub(1);
        let envelope = (self.base_delay_ms as f64) * self.multiplier.powi(exponent as i32);
        let capped = envelope.min(self.max_delay_ms as f64).max(0.0) as u64;

        let jittered = if capped == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=capped)
        };

        let delay_ms = match retry_after_ms {
            Some(hint) => jittered.max(hint),
            None => jittered,
        };
        Duration::from_millis(delay_ms)
    }
}
