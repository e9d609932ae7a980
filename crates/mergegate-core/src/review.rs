//! Human review gate: votes, policy, and resolution.
//!
//! The review step never executes inline. The engine suspends the instance
//! in `WaitingReview`, and this module evaluates accumulated votes against
//! the approval policy whenever a vote arrives or the deadline passes.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ReviewError;
use crate::instance::WorkflowId;

/// A single approval or rejection vote on a review gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewVote {
    /// Who cast this vote (reviewer identifier).
    pub reviewer: String,

    /// The workflow instance this vote applies to.
    pub workflow_id: WorkflowId,

    /// The decision.
    pub decision: ReviewDecision,

    /// When the vote was cast.
    pub voted_at: DateTime<Utc>,

    /// Optional comment.
    pub comment: Option<String>,
}

impl ReviewVote {
    pub fn new(
        reviewer: impl Into<String>,
        workflow_id: WorkflowId,
        decision: ReviewDecision,
        comment: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            reviewer: reviewer.into(),
            workflow_id,
            decision,
            voted_at: now,
            comment,
        }
    }
}

/// The decision of a single vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewDecision {
    /// Approve the change.
    Approve,

    /// Reject the change. Terminal for the workflow instance.
    Reject,
}

impl ReviewDecision {
    pub fn is_approval(self) -> bool {
        matches!(self, Self::Approve)
    }
}

/// Resolution state of a review gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewStatus {
    /// Waiting for the required approvals.
    Pending,

    /// Enough approvals accumulated.
    Approved,

    /// Rejected by a reviewer. Rejection is terminal; re-submission means a
    /// fresh change revision and therefore a fresh workflow instance.
    Rejected { reason: String },

    /// The deadline passed without resolution.
    Expired,
}

impl ReviewStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}

/// The review gate for one suspended workflow instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReviewGate {
    /// The instance this gate belongs to.
    pub workflow_id: WorkflowId,

    /// Minimum number of distinct approvals required.
    pub min_approvals: u32,

    /// When the gate was opened.
    pub opened_at: DateTime<Utc>,

    /// Deadline after which the gate expires (treated like a timeout).
    pub deadline: DateTime<Utc>,

    /// Current status.
    pub status: ReviewStatus,
}

impl ReviewGate {
    pub fn new(
        workflow_id: WorkflowId,
        min_approvals: u32,
        opened_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        Self {
            workflow_id,
            min_approvals,
            opened_at,
            deadline,
            status: ReviewStatus::Pending,
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.deadline
    }
}

/// Validate a vote against a gate and the votes already recorded.
///
/// # Errors
///
/// Returns `ReviewError::WrongInstance` if the vote targets another gate,
/// `ReviewError::GateClosed` if the gate already resolved,
/// `ReviewError::Expired` if the deadline has passed, and
/// `ReviewError::DuplicateVote` if the reviewer already voted.
pub fn submit_vote(
    gate: &mut ReviewGate,
    vote: &ReviewVote,
    existing_votes: &[ReviewVote],
    now: DateTime<Utc>,
) -> Result<(), ReviewError> {
    if vote.workflow_id != gate.workflow_id {
        return Err(ReviewError::WrongInstance {
            expected: gate.workflow_id.to_string(),
            got: vote.workflow_id.to_string(),
        });
    }

    if gate.status.is_terminal() {
        return Err(ReviewError::GateClosed {
            workflow_id: gate.workflow_id.to_string(),
        });
    }

    if gate.is_expired_at(now) {
        gate.status = ReviewStatus::Expired;
        return Err(ReviewError::Expired {
            workflow_id: gate.workflow_id.to_string(),
        });
    }

    if existing_votes.iter().any(|v| v.reviewer == vote.reviewer) {
        return Err(ReviewError::DuplicateVote {
            reviewer: vote.reviewer.clone(),
        });
    }

    Ok(())
}

/// Evaluate whether the gate should transition based on accumulated votes.
///
/// Returns the new status if a transition should happen, `None` otherwise.
/// Pure over its inputs: re-evaluating the same votes at the same `now`
/// yields the same answer.
pub fn evaluate_gate(
    gate: &ReviewGate,
    votes: &[ReviewVote],
    now: DateTime<Utc>,
) -> Option<ReviewStatus> {
    if gate.status.is_terminal() {
        return None;
    }

    if gate.is_expired_at(now) {
        return Some(ReviewStatus::Expired);
    }

    // Any rejection is an immediate block.
    for vote in votes {
        if vote.decision == ReviewDecision::Reject {
            let reason = vote
                .comment
                .clone()
                .unwrap_or_else(|| format!("rejected by {}", vote.reviewer));
            return Some(ReviewStatus::Rejected { reason });
        }
    }

    let approvals = votes.iter().filter(|v| v.decision.is_approval()).count() as u32;
    if approvals >= gate.min_approvals {
        return Some(ReviewStatus::Approved);
    }

    None
}
