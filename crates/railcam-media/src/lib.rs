//! Worker process supervision for the railcam controller.
//!
//! This crate provides:
//! - Worker command templates and the OS process launcher
//! - The process supervisor with cooperative-then-forced termination
//! - The UDP port pool for segment workers
//! - The rolling segment manager (RAM to disk promotion)
//! - Cross-device file moves

pub mod command;
pub mod error;
pub mod fs_utils;
pub mod logging;
pub mod ports;
pub mod process;
pub mod segments;
pub mod supervisor;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use command::{CommandTemplate, InterruptMode, LineSink, WorkerCommand};
pub use error::{MediaError, MediaResult};
pub use fs_utils::{move_file, remove_if_exists};
pub use logging::WorkerLogger;
pub use ports::PortPool;
pub use process::{
    send_signal, CommandLauncher, Signal, WorkerExit, WorkerLauncher, WorkerProcess,
};
pub use segments::{SegmentManager, SegmentPolicy, SegmentSnapshot, TickReport, VideoSegment};
pub use supervisor::{
    ProcessInfo, Supervisor, TerminationOutcome, WorkerRef, WorkerState, DEFAULT_GRACE_PERIOD,
};
