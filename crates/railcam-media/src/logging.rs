//! Structured worker lifecycle logging.
//!
//! Provides consistent, structured logging for supervised workers so every
//! lifecycle record carries the worker name and the component that owns it.

use tracing::{error, info, warn};

/// Logger for one supervised worker.
#[derive(Debug, Clone)]
pub struct WorkerLogger {
    worker: String,
    component: String,
}

impl WorkerLogger {
    /// Create a logger for a worker owned by `component` (e.g. "supervisor", "segments").
    pub fn new(worker: &str, component: &str) -> Self {
        Self {
            worker: worker.to_string(),
            component: component.to_string(),
        }
    }

    pub fn log_start(&self, pid: Option<u32>) {
        info!(
            worker = %self.worker,
            component = %self.component,
            pid = pid.unwrap_or_default(),
            "Worker started"
        );
    }

    pub fn log_interrupt(&self) {
        info!(
            worker = %self.worker,
            component = %self.component,
            "Sending interrupt, waiting for worker to terminate"
        );
    }

    /// Forced termination is a degraded outcome, not an error.
    pub fn log_forced(&self, grace_secs: f64) {
        warn!(
            worker = %self.worker,
            component = %self.component,
            grace_secs,
            "Forcing termination of worker"
        );
    }

    pub fn log_terminated(&self, code: Option<i32>) {
        info!(
            worker = %self.worker,
            component = %self.component,
            exit_code = ?code,
            "Worker terminated"
        );
    }

    pub fn log_error(&self, message: &str) {
        error!(
            worker = %self.worker,
            component = %self.component,
            "Worker error: {}", message
        );
    }

    pub fn worker(&self) -> &str {
        &self.worker
    }

    pub fn component(&self) -> &str {
        &self.component
    }
}
