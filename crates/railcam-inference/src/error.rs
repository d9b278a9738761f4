//! Error types for the inference worker.

use railcam_media::MediaError;
use thiserror::Error;

/// Result type for inference operations.
pub type InferenceResult<T> = Result<T, InferenceError>;

/// Errors that can occur in the inference worker.
#[derive(Debug, Error)]
pub enum InferenceError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Pipeline error: {0}")]
    Pipeline(#[from] MediaError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl InferenceError {
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }
}
