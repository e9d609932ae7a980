//! Mergegate Core Library
//!
//! Domain model and pure decision logic for the review orchestration
//! pipeline:
//! - change identity and inbound events
//! - workflow instances, step results, and findings
//! - branching predicates and the deterministic merge decision
//! - error aggregation and human-review gate evaluation

pub mod aggregate;
pub mod change;
pub mod decision;
pub mod error;
pub mod finding;
pub mod instance;
pub mod plan;
pub mod predicate;
pub mod review;
pub mod step;
pub mod telemetry;
pub mod ticket;

pub use aggregate::{aggregate, AggregatedReport, OverallSeverity};
pub use change::{AuthorIdentity, ChangeEvent, ChangeRef};
pub use decision::{decide, MergeDecision};
pub use error::{CoreError, Result, ReviewError};
pub use finding::{Finding, Severity};
pub use instance::{
    FailureReason, WorkflowId, WorkflowInstance, WorkflowPath, WorkflowStatus,
};
pub use plan::{default_plan, StepSpec};
pub use predicate::StepPredicate;
pub use review::{
    evaluate_gate, submit_vote, ReviewDecision, ReviewGate, ReviewStatus, ReviewVote,
};
pub use step::{CheckerStatus, CheckerVerdict, StepHint, StepName, StepResult, StepStatus};
pub use telemetry::init_tracing;
pub use ticket::{
    ExternalLink, LinkKind, ResolutionCacheEntry, ResolutionMethod, Ticket,
};

/// Mergegate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
