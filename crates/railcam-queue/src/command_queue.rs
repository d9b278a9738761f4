//! Bounded control command queue.
//!
//! Commands are advisory: when the queue is full a new command is logged
//! and dropped so the control loop is never held up by its own intake.
//! The loop pops at most one command per iteration.

use railcam_models::Command;
use tracing::{error, info};

use crate::bounded::{bounded, QueueReceiver, QueueSender};

/// Default number of pending commands.
pub const COMMAND_QUEUE_CAPACITY: usize = 4;

/// Producer handle for commands arriving from other tasks (signals, alerts).
#[derive(Debug, Clone)]
pub struct CommandSender {
    tx: QueueSender<String>,
}

impl CommandSender {
    /// Enqueue a command, dropping it if the queue is full.
    ///
    /// Returns true if the command was accepted.
    pub fn enqueue(&self, command: impl Into<String>) -> bool {
        let command = command.into();
        match self.tx.try_push(command.clone()) {
            Ok(()) => {
                info!(command = %command, "Received command");
                true
            }
            Err(e) => {
                error!(command = %command, "Command ignored: {}", e);
                false
            }
        }
    }

    pub fn enqueue_command(&self, command: Command) -> bool {
        self.enqueue(command.as_str())
    }
}

/// The queue owned by the control loop.
#[derive(Debug)]
pub struct CommandQueue {
    sender: CommandSender,
    rx: QueueReceiver<String>,
}

impl Default for CommandQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::with_capacity(COMMAND_QUEUE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, rx) = bounded("commands", capacity);
        Self {
            sender: CommandSender { tx },
            rx,
        }
    }

    /// Enqueue a command, dropping it if the queue is full.
    pub fn enqueue(&self, command: impl Into<String>) -> bool {
        self.sender.enqueue(command)
    }

    pub fn enqueue_command(&self, command: Command) -> bool {
        self.sender.enqueue_command(command)
    }

    /// Pop the oldest pending command, if any.
    pub fn pop(&mut self) -> Option<String> {
        self.rx.try_pop()
    }

    /// A producer handle that can be moved to another task.
    pub fn sender(&self) -> CommandSender {
        self.sender.clone()
    }

    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.sender.tx.capacity()
    }
}
