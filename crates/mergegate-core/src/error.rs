//! Domain-level error taxonomy for Mergegate.

/// Errors produced by review gate operations.
#[derive(Debug, thiserror::Error)]
pub enum ReviewError {
    #[error("vote targets instance {got}, gate belongs to {expected}")]
    WrongInstance { expected: String, got: String },

    #[error("review gate for {workflow_id} already resolved")]
    GateClosed { workflow_id: String },

    #[error("review gate for {workflow_id} expired")]
    Expired { workflow_id: String },

    #[error("reviewer {reviewer} already voted")]
    DuplicateVote { reviewer: String },
}

/// Mergegate domain errors.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("instance {id} is terminal ({status}) and immutable")]
    TerminalInstance { id: String, status: String },

    #[error("invalid change event: {0}")]
    InvalidEvent(String),

    #[error("review error: {0}")]
    Review(#[from] ReviewError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for domain operations.
pub type Result<T> = std::result::Result<T, CoreError>;
