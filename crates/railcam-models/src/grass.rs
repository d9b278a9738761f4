//! Grass presence events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrassEventType {
    GrassDetected,
    GrassStopped,
}

impl GrassEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrassEventType::GrassDetected => "grass_detected",
            GrassEventType::GrassStopped => "grass_stopped",
        }
    }
}

/// A debounced grass presence transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrassEvent {
    #[serde(rename = "type")]
    pub kind: GrassEventType,
    pub time: DateTime<Utc>,
}

impl GrassEvent {
    pub fn detected(time: DateTime<Utc>) -> Self {
        Self {
            kind: GrassEventType::GrassDetected,
            time,
        }
    }

    pub fn stopped(time: DateTime<Utc>) -> Self {
        Self {
            kind: GrassEventType::GrassStopped,
            time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grass_event_wire_format() {
        let time = DateTime::parse_from_rfc3339("2025-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let value = serde_json::to_value(GrassEvent::detected(time)).unwrap();
        assert_eq!(value["type"], "grass_detected");
        assert_eq!(value["time"], "2025-05-01T10:00:00Z");
    }
}
