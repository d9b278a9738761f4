//! Bounded queues for the control process.
//!
//! This crate provides:
//! - Multi-producer single-consumer queues that never block either side
//! - The bounded control command queue with drop-on-full semantics

pub mod bounded;
pub mod command_queue;
pub mod error;

pub use bounded::{bounded, QueueReceiver, QueueSender};
pub use command_queue::{CommandQueue, CommandSender, COMMAND_QUEUE_CAPACITY};
pub use error::{QueueError, QueueResult};
