//! Queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("Queue {queue} is full (capacity {capacity})")]
    Full { queue: String, capacity: usize },

    #[error("Queue {0} is closed")]
    Closed(String),
}

impl QueueError {
    pub fn full(queue: impl Into<String>, capacity: usize) -> Self {
        Self::Full {
            queue: queue.into(),
            capacity,
        }
    }

    pub fn closed(queue: impl Into<String>) -> Self {
        Self::Closed(queue.into())
    }

    /// Check if the entry was dropped because of backpressure.
    pub fn is_full(&self) -> bool {
        matches!(self, QueueError::Full { .. })
    }
}
