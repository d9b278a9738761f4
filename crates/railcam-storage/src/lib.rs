//! Durable persistence for the railcam controller.
//!
//! This crate provides:
//! - A non-blocking drain from bounded queues into an accumulator
//! - A JSON array record file written with read-merge-write
//! - A batch persister that flushes on a timer without blocking the caller

pub mod drain;
pub mod error;
pub mod persist;
pub mod store;

pub use drain::drain;
pub use error::{StorageError, StorageResult};
pub use persist::BatchPersister;
pub use store::{grass_events_path, statistics_path, JsonArrayStore};
