//! Mergegate Engine - Workflow Orchestration
//!
//! The top-level state machine for the review pipeline:
//! - sequences checkers in declared order with conditional branching
//! - suspends on human review and resumes on votes or SLA breaches
//! - aggregates failures and drives idempotent ticket filing
//! - renders the deterministic merge decision and its side effects

pub mod config;
mod engine;
mod error;
mod limiter;
pub mod render;
pub mod sla;

pub use config::{CheckerConfig, EngineConfig, ReviewConfig};
pub use engine::{StepAdvance, WorkflowEngine};
pub use error::{EngineError, EngineResult};
pub use limiter::RepoLimiter;
pub use sla::{SlaEvent, SlaMonitor, REVIEW_THRESHOLDS};
