//! Alert evaluation over statistics batches.

use railcam_models::StatisticsBatch;
use serde::{Deserialize, Serialize};

/// Thresholds that turn a statistics batch into an alert.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlertThresholds {
    /// Alert when more tracks than this were seen in one window
    pub max_total_tracks: u32,
    /// Visible tracks needed before the defective fraction is considered
    pub min_visible_tracks: u32,
    /// Alert when defective / visible exceeds this
    pub max_defective_fraction: f64,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            max_total_tracks: 20,
            min_visible_tracks: 4,
            max_defective_fraction: 0.3,
        }
    }
}

/// Whether `batch` should retain the segments currently being recorded.
pub fn evaluate_alert(batch: &StatisticsBatch, thresholds: &AlertThresholds) -> bool {
    if batch.tracks_total > thresholds.max_total_tracks {
        return true;
    }
    batch.visible_tracks() >= thresholds.min_visible_tracks
        && batch
            .defective_fraction()
            .is_some_and(|fraction| fraction > thresholds.max_defective_fraction)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_total_over_max_alerts() {
        let batch = StatisticsBatch::with_counts(10, 4, 3);
        let thresholds = AlertThresholds {
            max_total_tracks: 8,
            ..AlertThresholds::default()
        };
        assert!(evaluate_alert(&batch, &thresholds));
    }

    #[test]
    fn test_too_few_visible_tracks() {
        let batch = StatisticsBatch::with_counts(10, 4, 3);
        let thresholds = AlertThresholds {
            max_total_tracks: 20,
            min_visible_tracks: 10,
            max_defective_fraction: 0.5,
        };
        assert!(!evaluate_alert(&batch, &thresholds));
    }

    #[test]
    fn test_defective_fraction_over_max() {
        // 4 of 7 visible tracks are defective
        let batch = StatisticsBatch::with_counts(7, 4, 3);
        let thresholds = AlertThresholds {
            max_total_tracks: 20,
            min_visible_tracks: 5,
            max_defective_fraction: 0.5,
        };
        assert!(evaluate_alert(&batch, &thresholds));

        let relaxed = AlertThresholds {
            max_defective_fraction: 0.6,
            ..thresholds
        };
        assert!(!evaluate_alert(&batch, &relaxed));
    }

    #[test]
    fn test_empty_window_never_alerts() {
        let thresholds = AlertThresholds {
            min_visible_tracks: 0,
            max_defective_fraction: 0.0,
            ..AlertThresholds::default()
        };
        assert!(!evaluate_alert(&StatisticsBatch::with_counts(0, 0, 0), &thresholds));
    }
}
