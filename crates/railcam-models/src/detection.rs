//! Tracker observations handed to the inference worker.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identity assigned by the external object tracker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TrackId(pub u64);

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TrackId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// One tracked object in one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDetection {
    pub track_id: TrackId,
    /// Classifier label of the latest detection matched to this track
    pub label: String,
    /// Classifier score in [0, 1]
    pub score: f32,
}

impl TrackedDetection {
    pub fn new(track_id: impl Into<TrackId>, label: impl Into<String>, score: f32) -> Self {
        Self {
            track_id: track_id.into(),
            label: label.into(),
            score,
        }
    }
}

/// Everything the opaque pipeline reports for one processed frame.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameObservation {
    /// Frame sequence number
    #[serde(default)]
    pub frame: u64,
    /// Tracked objects with live points in this frame
    #[serde(default)]
    pub detections: Vec<TrackedDetection>,
    /// Per-frame grass signal from the pixel analysis
    #[serde(default)]
    pub grass: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_observation_defaults_missing_fields() {
        let obs: FrameObservation = serde_json::from_str(r#"{"frame": 7}"#).unwrap();
        assert_eq!(obs.frame, 7);
        assert!(obs.detections.is_empty());
        assert!(!obs.grass);
    }

    #[test]
    fn test_observation_parses_detections() {
        let line = r#"{"frame":1,"grass":true,"detections":[{"track_id":4,"label":"defective","score":0.9}]}"#;
        let obs: FrameObservation = serde_json::from_str(line).unwrap();
        assert!(obs.grass);
        assert_eq!(obs.detections[0].track_id, TrackId(4));
        assert_eq!(obs.detections[0].label, "defective");
    }
}
