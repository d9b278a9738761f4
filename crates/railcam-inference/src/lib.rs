//! Inference side of the railcam controller.
//!
//! This crate provides:
//! - The per-track defect vote state machine and its vote policy
//! - The grass presence hysteresis monitor
//! - The statistics reporter (each defective track is emitted once)
//! - The bridge that turns pipeline frames into protocol messages

pub mod bridge;
pub mod config;
pub mod error;
pub mod grass;
pub mod reporter;
pub mod tracks;
pub mod votes;

pub use bridge::{BridgeSummary, InferenceBridge};
pub use config::InferenceConfig;
pub use error::{InferenceError, InferenceResult};
pub use grass::GrassMonitor;
pub use reporter::StatisticsReporter;
pub use tracks::{TrackDefectStateMachine, TrackVoteRecord};
pub use votes::VotePolicy;
