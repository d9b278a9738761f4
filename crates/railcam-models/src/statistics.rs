//! Statistics produced by the inference worker.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::TrackId;

/// A track that crossed the defect reporting threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DefectRecord {
    pub track_id: TrackId,
    /// When the track's vote first crossed the reporting threshold
    pub detection_time: DateTime<Utc>,
    /// |votes| / max votes, in [0, 1]
    pub confidence: f64,
}

/// Statistics for one reporting window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatisticsBatch {
    /// End of the reporting window
    pub time: DateTime<Utc>,
    /// Identities seen during the window
    pub tracks_total: u32,
    /// Identities whose vote is at or below the negative threshold
    pub tracks_defective: u32,
    /// Identities whose vote is at or above the positive threshold
    pub tracks_non_defective: u32,
    /// Defects not reported in any earlier window
    #[serde(default)]
    pub defects: Vec<DefectRecord>,
}

impl StatisticsBatch {
    /// Create a batch with counts only.
    pub fn with_counts(total: u32, defective: u32, non_defective: u32) -> Self {
        Self {
            time: Utc::now(),
            tracks_total: total,
            tracks_defective: defective,
            tracks_non_defective: non_defective,
            defects: Vec::new(),
        }
    }

    /// Tracks with a decided label.
    pub fn visible_tracks(&self) -> u32 {
        // Counts come from another process
        self.tracks_defective.saturating_add(self.tracks_non_defective)
    }

    /// Fraction of visible tracks that are defective, if any are visible.
    pub fn defective_fraction(&self) -> Option<f64> {
        let visible = self.visible_tracks();
        if visible == 0 {
            return None;
        }
        Some(f64::from(self.tracks_defective) / f64::from(visible))
    }
}
