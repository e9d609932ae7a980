//! Workflow instances: one per inbound change event.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::change::{AuthorIdentity, ChangeEvent, ChangeRef};
use crate::decision::MergeDecision;
use crate::error::CoreError;
use crate::step::StepResult;

/// Unique identifier for a workflow instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    /// Generate a new random id.
    pub fn new() -> Self {
        WorkflowId(Uuid::new_v4().to_string())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a workflow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Created, not yet picked up.
    Pending,

    /// Steps executing.
    InProgress,

    /// Suspended awaiting human review resolution.
    WaitingReview,

    /// All required steps passed; merge signalled.
    Completed,

    /// A step failed or review was rejected; ticket filed.
    Blocked,

    /// The instance did not run to a decision (e.g. superseded).
    Failed,
}

impl WorkflowStatus {
    /// Active instances can still mutate; terminal ones are immutable.
    pub fn is_active(self) -> bool {
        matches!(
            self,
            WorkflowStatus::Pending | WorkflowStatus::InProgress | WorkflowStatus::WaitingReview
        )
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }
}

/// Which execution route the instance took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowPath {
    /// Conditional steps were skipped.
    Fast,

    /// All declared steps ran.
    Full,
}

/// Why an instance ended in `Failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "reason")]
pub enum FailureReason {
    /// A newer event for the same change arrived; this instance was
    /// cancelled and must not produce a ticket or merge action.
    Superseded,

    /// Ticket filing exhausted retries; the block is surfaced but untracked.
    TicketCreationFailed { detail: String },

    /// Unrecoverable internal error.
    Internal { detail: String },
}

/// A workflow instance. Mutated only by the engine; terminal instances are
/// retained immutable for audit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowInstance {
    /// Unique instance id.
    pub id: WorkflowId,

    /// Identity of the reviewed change revision.
    pub change_ref: ChangeRef,

    /// Change author, used for ticket assignment.
    pub author: AuthorIdentity,

    /// Paths touched by the change.
    pub changed_paths: Vec<String>,

    /// Draft changes report status but are never auto-merged.
    pub is_draft: bool,

    /// Current lifecycle status.
    pub status: WorkflowStatus,

    /// Execution route taken so far.
    pub path: WorkflowPath,

    /// Recorded step results in declaration order. Append-only.
    pub steps: Vec<StepResult>,

    /// When the instance was created.
    pub started_at: DateTime<Utc>,

    /// Whole-workflow deadline.
    pub deadline: DateTime<Utc>,

    /// Final merge decision, set on terminal transition.
    pub result: Option<MergeDecision>,

    /// Set when `status == Failed`.
    pub failure_reason: Option<FailureReason>,
}

impl WorkflowInstance {
    /// Create a fresh `Pending` instance from an inbound event.
    pub fn from_event(event: ChangeEvent, deadline: DateTime<Utc>) -> Self {
        Self {
            id: WorkflowId::new(),
            change_ref: event.change_ref,
            author: event.author,
            changed_paths: event.changed_paths,
            is_draft: event.is_draft,
            status: WorkflowStatus::Pending,
            path: WorkflowPath::Full,
            steps: Vec::new(),
            started_at: event.received_at,
            deadline,
            result: None,
            failure_reason: None,
        }
    }

    /// Append a step result. Fails on terminal instances (they are immutable).
    pub fn record_step(&mut self, result: StepResult) -> Result<(), CoreError> {
        if self.status.is_terminal() {
            return Err(CoreError::TerminalInstance {
                id: self.id.to_string(),
                status: format!("{:?}", self.status),
            });
        }
        self.steps.push(result);
        Ok(())
    }

    /// Mark this instance superseded by a newer event for the same change.
    pub fn mark_superseded(&mut self) {
        self.status = WorkflowStatus::Failed;
        self.failure_reason = Some(FailureReason::Superseded);
        self.result = None;
    }

    /// Whether this instance was superseded.
    pub fn is_superseded(&self) -> bool {
        matches!(self.failure_reason, Some(FailureReason::Superseded))
    }
}
