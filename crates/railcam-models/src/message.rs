//! Line protocol spoken by the inference worker on stdout.
//!
//! Each line is one JSON object tagged by `message`. Lines that do not
//! parse are pipeline chatter and are logged by the reader, not rejected.

use serde::{Deserialize, Serialize};

use crate::{GrassEvent, StatisticsBatch};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "message", rename_all = "snake_case")]
pub enum InferenceMessage {
    /// The pipeline is live and producing frames
    Ready,
    /// One reporting window of track statistics
    Statistics(StatisticsBatch),
    /// A grass presence transition
    Grass(GrassEvent),
}

impl InferenceMessage {
    /// Parse one output line, returning `None` for non-protocol output.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        if !line.starts_with('{') {
            return None;
        }
        serde_json::from_str(line).ok()
    }

    /// Encode as a single line without the trailing newline.
    pub fn to_line(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::GrassEventType;

    #[test]
    fn test_ready_line() {
        let line = InferenceMessage::Ready.to_line().unwrap();
        assert_eq!(line, r#"{"message":"ready"}"#);
        assert_eq!(InferenceMessage::parse_line(&line), Some(InferenceMessage::Ready));
    }

    #[test]
    fn test_grass_line_keeps_type_field() {
        let line = r#"{"message":"grass","type":"grass_stopped","time":"2025-05-01T10:00:00Z"}"#;
        match InferenceMessage::parse_line(line) {
            Some(InferenceMessage::Grass(event)) => {
                assert_eq!(event.kind, GrassEventType::GrassStopped)
            }
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[test]
    fn test_pipeline_chatter_is_not_a_message() {
        assert!(InferenceMessage::parse_line("Setting pipeline to PLAYING ...").is_none());
        assert!(InferenceMessage::parse_line(r#"{"message":"unknown"}"#).is_none());
    }
}
