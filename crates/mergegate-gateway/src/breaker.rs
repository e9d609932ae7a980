//! Per-dependency circuit breakers.
//!
//! After a threshold of consecutive failures the breaker opens and
//! short-circuits calls for a cooldown window, then allows a single probe
//! (half-open) to decide whether to close or re-open. State transitions
//! take an injected `now` so tests replay time deterministically.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// State of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests flow normally.
    Closed,

    /// Requests are short-circuited.
    Open,

    /// A single probe request is allowed through.
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,

    /// Seconds the circuit stays open before allowing a probe.
    pub cooldown_secs: u64,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
        }
    }
}

/// Observable snapshot of one breaker, shared across all workflow instances
/// calling the dependency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitBreakerState {
    pub dependency_name: String,
    pub state: CircuitState,
    pub consecutive_failures: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<DateTime<Utc>>,
    probe_in_flight: bool,
}

/// Circuit breaker for a single dependency.
#[derive(Debug)]
pub struct CircuitBreaker {
    dependency: String,
    config: BreakerConfig,
    inner: Mutex<BreakerInner>,
}

impl CircuitBreaker {
    pub fn new(dependency: impl Into<String>, config: BreakerConfig) -> Self {
        Self {
            dependency: dependency.into(),
            config,
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                consecutive_failures: 0,
                opened_at: None,
                probe_in_flight: false,
            }),
        }
    }

    /// Whether a request may proceed at `now`.
    ///
    /// Transitions Open → HalfOpen once the cooldown has elapsed; in
    /// half-open only the first caller gets the probe slot.
    pub fn allow_request(&self, now: DateTime<Utc>) -> bool {
        let mut inner = self.inner.lock().unwrap();

        if inner.state == CircuitState::Open {
            let cooled_down = inner.opened_at.is_some_and(|opened| {
                now >= opened + chrono::Duration::seconds(self.config.cooldown_secs as i64)
            });
            if cooled_down {
                info!(
                    dependency = %self.dependency,
                    "circuit breaker half-open after cooldown"
                );
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = false;
            }
        }

        match inner.state {
            CircuitState::Closed => true,
            CircuitState::Open => false,
            CircuitState::HalfOpen => {
                if inner.probe_in_flight {
                    false
                } else {
                    inner.probe_in_flight = true;
                    true
                }
            }
        }
    }

    /// Record a successful call.
    pub fn record_success(&self) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures = 0;
            }
            CircuitState::HalfOpen => {
                info!(
                    dependency = %self.dependency,
                    "circuit breaker closing after successful probe"
                );
                inner.state = CircuitState::Closed;
                inner.consecutive_failures = 0;
                inner.opened_at = None;
                inner.probe_in_flight = false;
            }
            CircuitState::Open => {
                // Late success from a call that raced the open transition.
            }
        }
    }

    /// Record a failed call at `now`.
    pub fn record_failure(&self, now: DateTime<Utc>) {
        let mut inner = self.inner.lock().unwrap();
        match inner.state {
            CircuitState::Closed => {
                inner.consecutive_failures += 1;
                if inner.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        dependency = %self.dependency,
                        failures = inner.consecutive_failures,
                        "circuit breaker opening"
                    );
                    inner.state = CircuitState::Open;
                    inner.opened_at = Some(now);
                }
            }
            CircuitState::HalfOpen => {
                warn!(
                    dependency = %self.dependency,
                    "circuit breaker re-opening after failed probe"
                );
                inner.state = CircuitState::Open;
                inner.opened_at = Some(now);
                inner.probe_in_flight = false;
            }
            CircuitState::Open => {}
        }
    }

    /// Current state, applying any due Open → HalfOpen transition.
    pub fn state(&self, now: DateTime<Utc>) -> CircuitState {
        // allow_request performs the timed transition; peek without
        // consuming the probe slot.
        let mut inner = self.inner.lock().unwrap();
        if inner.state == CircuitState::Open {
            let cooled_down = inner.opened_at.is_some_and(|opened| {
                now >= opened + chrono::Duration::seconds(self.config.cooldown_secs as i64)
            });
            if cooled_down {
                inner.state = CircuitState::HalfOpen;
                inner.probe_in_flight = false;
            }
        }
        inner.state
    }

    /// Observable snapshot for diagnostics.
    pub fn snapshot(&self) -> CircuitBreakerState {
        let inner = self.inner.lock().unwrap();
        CircuitBreakerState {
            dependency_name: self.dependency.clone(),
            state: inner.state,
            consecutive_failures: inner.consecutive_failures,
            opened_at: inner.opened_at,
        }
    }
}

/// Process-wide registry of breakers, one per dependency name.
#[derive(Debug)]
pub struct BreakerRegistry {
    config: BreakerConfig,
    breakers: Mutex<HashMap<String, Arc<CircuitBreaker>>>,
}

impl BreakerRegistry {
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            breakers: Mutex::new(HashMap::new()),
        }
    }

    /// The breaker for a dependency, created on first use.
    pub fn breaker_for(&self, dependency: &str) -> Arc<CircuitBreaker> {
        let mut breakers = self.breakers.lock().unwrap();
        breakers
            .entry(dependency.to_string())
            .or_insert_with(|| {
                Arc::new(CircuitBreaker::new(dependency, self.config.clone()))
            })
            .clone()
    }

    /// Snapshots of every known breaker, sorted by dependency name.
    pub fn snapshots(&self) -> Vec<CircuitBreakerState> {
        let breakers = self.breakers.lock().unwrap();
        let mut out: Vec<CircuitBreakerState> =
            breakers.values().map(|b| b.snapshot()).collect();
        out.sort_by(|a, b| a.dependency_name.cmp(&b.dependency_name));
        out
    }
}
