//! Mergegate Gateway - External Dependency Access
//!
//! Uniform client abstraction wrapping calls to the code host, ticketing
//! system, and checker services. Owns all retry/backoff and circuit-breaking
//! so the engine and ticket subsystem stay retry-agnostic:
//!
//! - `Gateway::call` — retry with jittered exponential backoff, honoring
//!   server retry-after hints, around a per-dependency circuit breaker
//! - `CheckerClient` / `CodeHostClient` / `TicketClient` — dependency
//!   contracts with HTTP implementations and in-memory fakes

pub mod breaker;
pub mod clients;
mod error;
pub mod fakes;
mod gateway;
pub mod http;
mod retry;

pub use breaker::{
    BreakerConfig, BreakerRegistry, CircuitBreaker, CircuitBreakerState, CircuitState,
};
pub use clients::{
    CheckRequest, CheckerClient, CodeHostClient, StatusCheck, StatusState, TicketClient,
    TicketCreate,
};
pub use error::{GatewayError, GatewayResult};
pub use gateway::{Gateway, GatewayConfig};
pub use http::{HttpCheckerClient, HttpCodeHostClient, HttpTicketClient};
pub use retry::RetryPolicy;
