//! Error types for worker supervision.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for supervision operations.
pub type MediaResult<T> = Result<T, MediaError>;

/// Errors that can occur while supervising workers and segments.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error("Worker program not found in PATH: {0}")]
    ProgramNotFound(String),

    #[error("Worker {0} is already running")]
    WorkerAlreadyRunning(String),

    #[error("Worker not found: {0}")]
    WorkerNotFound(String),

    #[error("Failed to spawn worker {name}: {source}")]
    SpawnFailed {
        name: String,
        #[source]
        source: std::io::Error,
    },

    #[error("UDP port pool exhausted ({pool_size} ports configured)")]
    PortPoolExhausted { pool_size: usize },

    #[error("Invalid port list: {0}")]
    InvalidPortList(String),

    #[error("Invalid worker command: {0}")]
    InvalidCommand(String),

    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl MediaError {
    pub fn spawn_failed(name: impl Into<String>, source: std::io::Error) -> Self {
        Self::SpawnFailed {
            name: name.into(),
            source,
        }
    }

    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }

    /// Check if this error must end the run rather than be logged.
    pub fn is_fatal(&self) -> bool {
        matches!(self, MediaError::PortPoolExhausted { .. })
    }
}
