//! The merge decision: a pure function of recorded step results.
//!
//! Recomputing the decision from the same inputs always yields the same
//! answer; audit and test replay depend on this. Human review resolution is
//! recorded as an ordinary `StepResult` before the decision is computed, so
//! no review state leaks into this function.

use serde::{Deserialize, Serialize};

use crate::plan::StepSpec;
use crate::step::StepResult;

/// The authoritative outcome for a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeDecision {
    /// Every required step passed or was skipped; the change may merge.
    Approved,

    /// A step failed, timed out, or review was rejected.
    Blocked,

    /// Required steps remain unresolved (instance is suspended).
    WaitingReview,
}

impl std::fmt::Display for MergeDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MergeDecision::Approved => write!(f, "approved"),
            MergeDecision::Blocked => write!(f, "blocked"),
            MergeDecision::WaitingReview => write!(f, "waiting_review"),
        }
    }
}

/// Compute the merge decision for a plan from the accumulated step results.
///
/// Rules:
/// - any `Fail` or `TimedOut` result forces `Blocked`;
/// - if every required step in the plan has a `Pass`/`Skipped` result, the
///   decision is `Approved`;
/// - otherwise required work remains and the decision is `WaitingReview`.
pub fn decide(plan: &[StepSpec], steps: &[StepResult]) -> MergeDecision {
    if steps.iter().any(|s| s.status.halts_pipeline()) {
        return MergeDecision::Blocked;
    }

    for spec in plan {
        let recorded = steps.iter().find(|s| s.step == spec.name);
        match recorded {
            Some(result) if result.status.is_passing() => {}
            // halts_pipeline above already caught Fail/TimedOut.
            Some(_) => return MergeDecision::Blocked,
            None if spec.required => return MergeDecision::WaitingReview,
            None => {}
        }
    }

    MergeDecision::Approved
}
