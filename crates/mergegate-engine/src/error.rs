//! Engine error taxonomy.

use thiserror::Error;

use mergegate_core::{CoreError, ReviewError};
use mergegate_state::StorageError;

/// Errors surfaced by the orchestration engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("domain error: {0}")]
    Core(#[from] CoreError),

    #[error("review error: {0}")]
    Review(#[from] ReviewError),

    #[error("no review gate open for instance {workflow_id}")]
    NoReviewGate { workflow_id: String },

    #[error("internal engine error: {0}")]
    Internal(String),
}

/// Result type for engine operations.
pub type EngineResult<T> = std::result::Result<T, EngineError>;
