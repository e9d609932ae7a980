//! Error types for the ticket subsystem.

use thiserror::Error;

use mergegate_state::StorageError;

/// Errors surfaced by ticket filing.
///
/// Most degraded conditions (link failures, unresolved assignees) are
/// absorbed into warnings on the filing result; only the conditions below
/// are errors, and only `CreationFailed` blocks the merge as a hard failure.
#[derive(Debug, Error)]
pub enum TicketError {
    /// The ticket itself could not be created after exhausting retries.
    /// The one case that must still block the merge and raise an alert.
    #[error("ticket creation failed: {detail}")]
    CreationFailed { detail: String },

    /// The ticket store failed; idempotency cannot be guaranteed.
    #[error("ticket storage error: {0}")]
    Storage(#[from] StorageError),
}

/// Result type for ticket operations.
pub type TicketResult<T> = std::result::Result<T, TicketError>;
