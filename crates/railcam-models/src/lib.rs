//! Shared data models for the railcam controller.
//!
//! This crate provides Serde-serializable types for:
//! - The control command vocabulary
//! - Statistics batches and defect records
//! - Grass presence events
//! - Per-frame tracker observations
//! - Messages emitted by the inference worker

pub mod command;
pub mod detection;
pub mod grass;
pub mod message;
pub mod statistics;

pub use command::{Command, CommandParseError};
pub use detection::{FrameObservation, TrackId, TrackedDetection};
pub use grass::{GrassEvent, GrassEventType};
pub use message::InferenceMessage;
pub use statistics::{DefectRecord, StatisticsBatch};
