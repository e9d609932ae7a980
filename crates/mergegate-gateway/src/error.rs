//! Gateway error taxonomy.
//!
//! The distinction that matters everywhere downstream: transient errors are
//! retried by the gateway, definitive errors are not, and an open circuit
//! short-circuits without touching the dependency at all.

use thiserror::Error;

/// Errors surfaced by outbound dependency calls.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// Network failure, 5xx, or other condition worth retrying.
    #[error("transient failure calling {dependency}: {detail}")]
    Transient { dependency: String, detail: String },

    /// Rate limited; the server may have told us how long to wait.
    #[error("rate limited by {dependency}")]
    RateLimited {
        dependency: String,
        retry_after_ms: Option<u64>,
    },

    /// One attempt exceeded the request-level timeout.
    #[error("request to {dependency} timed out after {attempt_timeout_ms}ms")]
    AttemptTimeout {
        dependency: String,
        attempt_timeout_ms: u64,
    },

    /// Definitive client error (bad request, conflict). Never retried.
    #[error("definitive failure calling {dependency}: {detail}")]
    Definitive { dependency: String, detail: String },

    /// The requested resource does not exist. Never retried.
    #[error("{dependency} has no such resource: {detail}")]
    NotFound { dependency: String, detail: String },

    /// Credentials rejected. Never retried; raises an immediate alarm.
    #[error("unauthorized calling {dependency}: {detail}")]
    Unauthorized { dependency: String, detail: String },

    /// The circuit breaker for this dependency is open.
    #[error("circuit open for {dependency}")]
    CircuitOpen { dependency: String },

    /// All retry attempts exhausted; wraps the last transient failure.
    #[error("retries exhausted calling {dependency} after {attempts} attempts: {detail}")]
    RetriesExhausted {
        dependency: String,
        attempts: u32,
        detail: String,
    },
}

impl GatewayError {
    /// Whether the gateway may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Transient { .. }
                | GatewayError::RateLimited { .. }
                | GatewayError::AttemptTimeout { .. }
        )
    }

    /// Server-provided retry-after hint, when present.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            GatewayError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }

    /// The dependency the error belongs to.
    pub fn dependency(&self) -> &str {
        match self {
            GatewayError::Transient { dependency, .. }
            | GatewayError::RateLimited { dependency, .. }
            | GatewayError::AttemptTimeout { dependency, .. }
            | GatewayError::Definitive { dependency, .. }
            | GatewayError::NotFound { dependency, .. }
            | GatewayError::Unauthorized { dependency, .. }
            | GatewayError::CircuitOpen { dependency }
            | GatewayError::RetriesExhausted { dependency, .. } => dependency,
        }
    }
}

/// Result type for gateway operations.
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
