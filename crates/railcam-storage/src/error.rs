//! Error types for durable storage.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur while persisting batches.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record file {0} does not hold a JSON array")]
    NotAnArray(PathBuf),

    #[error("Write task failed: {0}")]
    WriteTask(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn write_task(msg: impl Into<String>) -> Self {
        Self::WriteTask(msg.into())
    }
}
