//! Dependency client contracts: checkers, the code host, and ticketing.
//!
//! These traits are the only surface the engine and ticket subsystem see;
//! transports live behind them. HTTP implementations are in `http`, test
//! fakes in `fakes`.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use mergegate_core::{ChangeRef, CheckerVerdict};

use crate::error::GatewayResult;

/// Request payload sent to a checker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckRequest {
    pub change_id: String,
    pub revision: String,
    pub changed_paths: Vec<String>,
}

impl CheckRequest {
    pub fn for_change(change: &ChangeRef, changed_paths: &[String]) -> Self {
        Self {
            change_id: change.change_id.clone(),
            revision: change.head_revision.clone(),
            changed_paths: changed_paths.to_vec(),
        }
    }
}

/// An external verdict-producing checker.
///
/// Contract: returns a definitive `CheckerVerdict` within its declared
/// timeout. Transport failures surface as `GatewayError`, never as a
/// verdict — a verdict is final and is not retried.
#[async_trait]
pub trait CheckerClient: Send + Sync {
    async fn run_check(&self, request: &CheckRequest) -> GatewayResult<CheckerVerdict>;
}

/// State reported back to the code host's status-check API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusState {
    Pending,
    Success,
    Failure,
}

/// Status-check result posted to the code host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCheck {
    pub state: StatusState,
    pub summary: String,
}

/// The code-hosting platform.
#[async_trait]
pub trait CodeHostClient: Send + Sync {
    /// Publish a status check for the change's head revision.
    async fn post_status(&self, change: &ChangeRef, status: &StatusCheck) -> GatewayResult<()>;

    /// Post an author-facing comment on the change.
    async fn post_comment(&self, change: &ChangeRef, body: &str) -> GatewayResult<()>;

    /// Ask the code host to merge an approved change.
    async fn request_merge(&self, change: &ChangeRef) -> GatewayResult<()>;
}

/// Ticket creation payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TicketCreate {
    pub project: String,
    pub issue_type: String,
    pub summary: String,
    pub body: String,
    pub assignee: Option<String>,
    pub labels: Vec<String>,
}

/// The ticketing system.
#[async_trait]
pub trait TicketClient: Send + Sync {
    /// Create a ticket, returning its external key. Non-idempotent: callers
    /// must check for an existing ticket first (see the ticket subsystem).
    async fn create(&self, request: &TicketCreate) -> GatewayResult<String>;

    /// Link a ticket to an external reference. Idempotent, safe to retry.
    async fn link(&self, ticket_key: &str, external_ref: &str) -> GatewayResult<()>;

    /// Add a comment to a ticket. Idempotent enough to retry.
    async fn comment(&self, ticket_key: &str, body: &str) -> GatewayResult<()>;

    /// Look up an account by identifier. Read-only, safe to retry.
    async fn search_account(&self, identifier: &str) -> GatewayResult<Option<String>>;
}
