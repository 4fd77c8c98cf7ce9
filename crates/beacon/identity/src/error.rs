use std::time::Duration;
use thiserror::Error;

/// Result type for identity store operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Identity store errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("connection error: {0}")]
    Connection(String),

    #[error("query error: {0}")]
    Query(String),

    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}
