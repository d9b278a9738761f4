//! Railcam control process.
//!
//! This crate provides:
//! - Configuration from the environment
//! - Alert evaluation over statistics batches
//! - The link to the inference worker
//! - The control loop supervising every worker
//! - The pid file used by external triggers
//! - Prometheus metrics

pub mod alerting;
pub mod config;
pub mod controller;
pub mod error;
pub mod inference;
pub mod metrics;
pub mod pidfile;

pub use alerting::{evaluate_alert, AlertThresholds};
pub use config::RunConfig;
pub use controller::{
    Controller, FILESERVER_WORKER, INFERENCE_WORKER, SERIAL_WORKER, STREAMING_WORKER,
};
pub use error::{WorkerError, WorkerResult};
pub use inference::{InferenceLink, InferenceQueues};
pub use pidfile::{find_closest, read_pid, PidFile};
