//! Error taxonomy for store and orchestration operations.

use thiserror::Error;

/// Errors surfaced by the memory core.
///
/// Batch operations do not abort on per-item failures; they log, skip, and
/// report the subset that succeeded. Single-item operations surface these
/// directly.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("duplicate entity: {0}")]
    DuplicateEntity(String),

    #[error("duplicate branch: {0}")]
    DuplicateBranch(String),

    #[error("branch 'main' cannot be deleted")]
    CannotDeleteMain,

    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MemoryError>;
