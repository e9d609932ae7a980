//! Author-facing rendering: status checks and the single authoritative
//! summary comment.
//!
//! The author always sees exactly one comment per terminal instance. On a
//! ticket-creation failure, the comment is a standard decline message — no
//! internal error detail leaks.

use mergegate_core::{AggregatedReport, MergeDecision, WorkflowInstance};
use mergegate_gateway::{StatusCheck, StatusState};

/// The status check posted for a terminal (or draft-approved) instance.
pub fn status_check(instance: &WorkflowInstance, decision: MergeDecision) -> StatusCheck {
    match decision {
        MergeDecision::Approved if instance.is_draft => StatusCheck {
            state: StatusState::Pending,
            summary: format!("{}: approved (draft, not merged)", instance.change_ref),
        },
        MergeDecision::Approved => StatusCheck {
            state: StatusState::Success,
            summary: format!("{}: all required checks passed", instance.change_ref),
        },
        MergeDecision::Blocked => StatusCheck {
            state: StatusState::Failure,
            summary: format!("{}: review pipeline blocked this change", instance.change_ref),
        },
        MergeDecision::WaitingReview => StatusCheck {
            state: StatusState::Pending,
            summary: format!("{}: awaiting human review", instance.change_ref),
        },
    }
}

/// The authoritative author comment for an approved instance.
pub fn approved_comment(instance: &WorkflowInstance) -> String {
    let passed = instance.steps.iter().filter(|s| s.passed()).count();
    let skipped = instance
        .steps
        .iter()
        .filter(|s| s.status == mergegate_core::StepStatus::Skipped)
        .count();
    format!(
        "Review pipeline approved this change: {} step(s) passed, {} skipped.",
        passed, skipped
    )
}

/// The authoritative author comment for a blocked instance.
///
/// Includes the findings summary and, when a ticket exists, its reference.
pub fn blocked_comment(report: &AggregatedReport, ticket_key: Option<&str>) -> String {
    let mut comment = format!("Review pipeline blocked this change. {}", report.summary);
    match ticket_key {
        Some(key) => {
            comment.push_str(&format!(" Tracked as {}.", key));
        }
        None => {
            // Standard decline-with-explanation: the block stands even
            // though tracking failed; never surface internals here.
            comment.push_str(
                " A tracking ticket could not be filed; the on-call team has been alerted.",
            );
        }
    }
    comment
}

/// Escalation nag posted while a review approaches its deadline.
pub fn review_escalation_comment(pct: u8) -> String {
    format!(
        "Reminder: this change is still awaiting review ({}% of the review window has elapsed).",
        pct
    )
}
