//! The gateway call wrapper: retry, backoff, and circuit breaking around a
//! plain async operation.
//!
//! Callers stay retry-agnostic: they hand the gateway a closure producing
//! one attempt and get back either a value or a classified error. All
//! cross-cutting retry and breaker behavior lives here and nowhere else.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::breaker::{BreakerConfig, BreakerRegistry, CircuitBreakerState};
use crate::error::{GatewayError, GatewayResult};
use crate::retry::RetryPolicy;

/// Gateway configuration.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Retry/backoff bounds.
    pub retry: RetryPolicy,

    /// Circuit breaker thresholds.
    pub breaker: BreakerConfig,

    /// Hard timeout for a single attempt, independent of step-level SLAs.
    pub attempt_timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            breaker: BreakerConfig::default(),
            attempt_timeout_ms: 30_000,
        }
    }
}

/// Uniform wrapper for all outbound dependency calls.
pub struct Gateway {
    retry: RetryPolicy,
    attempt_timeout: Duration,
    breakers: BreakerRegistry,
}

impl Gateway {
    pub fn new(config: GatewayConfig) -> Self {
        Self {
            retry: config.retry,
            attempt_timeout: Duration::from_millis(config.attempt_timeout_ms),
            breakers: BreakerRegistry::new(config.breaker),
        }
    }

    /// Call a dependency with retry, backoff, and circuit breaking.
    ///
    /// `op` produces one attempt. Retryable failures (transient errors,
    /// rate limits, attempt timeouts) are retried up to the policy bound
    /// with jittered exponential backoff, honoring any server retry-after
    /// hint. Definitive errors return immediately; unauthorized errors
    /// additionally raise an operational alarm. An open breaker
    /// short-circuits without invoking `op` at all.
    pub async fn call<T, F, Fut>(&self, dependency: &str, mut op: F) -> GatewayResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = GatewayResult<T>>,
    {
        let breaker = self.breakers.breaker_for(dependency);
        let mut attempts = 0u32;

        loop {
            if !breaker.allow_request(Utc::now()) {
                warn!(alarm = true, dependency, "short-circuiting call: circuit open");
                return Err(GatewayError::CircuitOpen {
                    dependency: dependency.to_string(),
                });
            }

            attempts += 1;
            let outcome = match tokio::time::timeout(self.attempt_timeout, op()).await {
                Ok(result) => result,
                Err(_) => Err(GatewayError::AttemptTimeout {
                    dependency: dependency.to_string(),
                    attempt_timeout_ms: self.attempt_timeout.as_millis() as u64,
                }),
            };

            match outcome {
                Ok(value) => {
                    breaker.record_success();
                    return Ok(value);
                }
                Err(err) if err.is_retryable() => {
                    breaker.record_failure(Utc::now());

                    if attempts >= self.retry.max_attempts {
                        warn!(
                            dependency,
                            attempts,
                            error = %err,
                            "retries exhausted"
                        );
                        return Err(GatewayError::RetriesExhausted {
                            dependency: dependency.to_string(),
                            attempts,
                            detail: err.to_string(),
                        });
                    }

                    let delay = self.retry.backoff_delay(attempts, err.retry_after_ms());
                    debug!(
                        dependency,
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err @ GatewayError::Unauthorized { .. }) => {
                    error!(alarm = true, dependency, error = %err, "credentials rejected");
                    return Err(err);
                }
                Err(err) => {
                    // Definitive client error: the dependency is healthy,
                    // so the breaker is not touched.
                    return Err(err);
                }
            }
        }
    }

    /// Breaker snapshots for diagnostics.
    pub fn breaker_snapshots(&self) -> Vec<CircuitBreakerState> {
        self.breakers.snapshots()
    }
}
