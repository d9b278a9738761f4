//! Control process error types.

use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Inference worker exited (code {0:?})")]
    InferenceExited(Option<i32>),

    #[error("Invalid pid file: {0}")]
    InvalidPidFile(String),

    #[error("Media error: {0}")]
    Media(#[from] railcam_media::MediaError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl WorkerError {
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }

    pub fn invalid_pid_file(msg: impl Into<String>) -> Self {
        Self::InvalidPidFile(msg.into())
    }

    /// Process exit status for an error that ended the run.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConfigError(_) => 2,
            Self::InferenceExited(_) => 3,
            Self::Media(e) if e.is_fatal() => 4,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railcam_media::MediaError;

    #[test]
    fn test_exit_codes() {
        assert_eq!(WorkerError::config_error("bad").exit_code(), 2);
        assert_eq!(WorkerError::InferenceExited(Some(1)).exit_code(), 3);
        assert_eq!(
            WorkerError::from(MediaError::PortPoolExhausted { pool_size: 3 }).exit_code(),
            4
        );
        assert_eq!(
            WorkerError::from(MediaError::WorkerNotFound("x".into())).exit_code(),
            1
        );
    }
}
