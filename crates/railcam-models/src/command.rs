//! Control command vocabulary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// A control command understood by the run loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Start the streaming worker
    StreamingStart,
    /// Stop the streaming worker
    StreamingStop,
    /// Terminate and start the inference worker again
    InferenceRestart,
    /// Terminate and start the fileserver worker again
    FileserverRestart,
    /// Keep every segment that is currently recording
    FileSave,
    /// Log the process registry
    StatusRequest,
}

impl Command {
    pub const ALL: [Command; 6] = [
        Command::StreamingStart,
        Command::StreamingStop,
        Command::InferenceRestart,
        Command::FileserverRestart,
        Command::FileSave,
        Command::StatusRequest,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Command::StreamingStart => "streaming_start",
            Command::StreamingStop => "streaming_stop",
            Command::InferenceRestart => "inference_restart",
            Command::FileserverRestart => "fileserver_restart",
            Command::FileSave => "file_save",
            Command::StatusRequest => "status_request",
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a command string is not part of the vocabulary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized command: {0}")]
pub struct CommandParseError(pub String);

impl FromStr for Command {
    type Err = CommandParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        Command::ALL
            .iter()
            .copied()
            .find(|c| c.as_str() == s)
            .ok_or_else(|| CommandParseError(s.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_round_trips_through_str() {
        for command in Command::ALL {
            assert_eq!(command.as_str().parse::<Command>().unwrap(), command);
        }
    }

    #[test]
    fn test_unknown_command_rejected() {
        let err = "reboot".parse::<Command>().unwrap_err();
        assert_eq!(err, CommandParseError("reboot".to_string()));
    }

    #[test]
    fn test_command_serializes_snake_case() {
        let json = serde_json::to_string(&Command::FileSave).unwrap();
        assert_eq!(json, "\"file_save\"");
    }
}
