//! Periodic statistics reporting with exactly-once defect emission.

use std::collections::HashSet;

use railcam_models::{StatisticsBatch, TrackId};
use tracing::debug;

use crate::tracks::TrackDefectStateMachine;

/// Turns statistics windows into batches, emitting each defective track once.
#[derive(Debug, Default)]
pub struct StatisticsReporter {
    reported: HashSet<TrackId>,
}

impl StatisticsReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current window.
    ///
    /// Returns `None` when the window saw no tracks and has no new defects.
    pub fn report(&mut self, machine: &TrackDefectStateMachine) -> Option<StatisticsBatch> {
        let mut batch = machine.get_instant_statistics(true);
        batch.defects.retain(|d| self.reported.insert(d.track_id));
        for defect in &batch.defects {
            machine.mark_reported(defect.track_id);
        }

        debug!(
            tracks_total = batch.tracks_total,
            new_defects = batch.defects.len(),
            "Statistics window closed"
        );
        if batch.tracks_total == 0 && batch.defects.is_empty() {
            None
        } else {
            Some(batch)
        }
    }

    /// Number of tracks emitted so far.
    pub fn reported_count(&self) -> usize {
        self.reported.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::votes::VotePolicy;

    fn voting() -> TrackDefectStateMachine {
        TrackDefectStateMachine::new(VotePolicy {
            enabled: true,
            ..VotePolicy::default()
        })
    }

    #[test]
    fn test_defect_reported_once_across_windows() {
        let machine = voting();
        let mut reporter = StatisticsReporter::new();

        machine.add_detection(TrackId(4), "defective", 0.9);
        let first = reporter.report(&machine).unwrap();
        assert_eq!(first.defects.len(), 1);

        // Same track, still defective, next window
        machine.add_detection(TrackId(4), "defective", 0.9);
        let second = reporter.report(&machine).unwrap();
        assert_eq!(second.tracks_total, 1);
        assert_eq!(second.tracks_defective, 1);
        assert!(second.defects.is_empty());

        assert_eq!(reporter.reported_count(), 1);
        assert!(machine.record(TrackId(4)).unwrap().reported);
    }

    #[test]
    fn test_empty_window_not_emitted() {
        let machine = voting();
        let mut reporter = StatisticsReporter::new();
        assert!(reporter.report(&machine).is_none());
    }

    #[test]
    fn test_window_with_tracks_emitted_without_defects() {
        let machine = TrackDefectStateMachine::new(VotePolicy::default());
        let mut reporter = StatisticsReporter::new();
        machine.add_detection(TrackId(1), "defective", 0.9);

        let batch = reporter.report(&machine).unwrap();
        assert_eq!(batch.tracks_total, 1);
        assert!(batch.defects.is_empty());
    }
}
