//! Per-track defect vote state machine.
//!
//! The frame path calls [`TrackDefectStateMachine::add_detection`] for every
//! tracked object while the reporting timer reads statistics. One mutex
//! covers both the vote table and the set of tracks seen in the current
//! reporting window.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use railcam_models::{DefectRecord, StatisticsBatch, TrackId};
use tracing::{debug, info};

use crate::votes::VotePolicy;

/// State of one tracked identity.
#[derive(Debug, Clone, PartialEq)]
pub struct TrackVoteRecord {
    /// Accumulator in [-max_votes, max_votes]
    pub votes: i32,
    /// When votes first reached -min_votes; never changed afterwards
    pub first_crossing: Option<DateTime<Utc>>,
    /// Set once, after the track was emitted in a statistics batch
    pub reported: bool,
    last_seen: u64,
}

#[derive(Debug, Default)]
struct TrackTable {
    records: HashMap<TrackId, TrackVoteRecord>,
    current: HashSet<TrackId>,
    sequence: u64,
}

impl TrackTable {
    fn defects(&self, policy: &VotePolicy, filter: Option<&HashSet<TrackId>>) -> Vec<DefectRecord> {
        let mut defects: Vec<DefectRecord> = self
            .records
            .iter()
            .filter(|(id, _)| filter.map_or(true, |f| f.contains(*id)))
            .filter(|(_, r)| policy.is_defective(r.votes))
            .filter_map(|(id, r)| {
                r.first_crossing.map(|time| DefectRecord {
                    track_id: *id,
                    detection_time: time,
                    confidence: policy.confidence(r.votes),
                })
            })
            .collect();
        defects.sort_by_key(|d| d.track_id);
        defects
    }

    fn evict_least_recent(&mut self) {
        let oldest = self
            .records
            .iter()
            .min_by_key(|(_, r)| r.last_seen)
            .map(|(id, _)| *id);
        if let Some(id) = oldest {
            self.records.remove(&id);
            self.current.remove(&id);
            debug!(track_id = %id, "Evicted track");
        }
    }
}

/// Vote table shared by the frame path and the reporting timer.
#[derive(Debug)]
pub struct TrackDefectStateMachine {
    policy: VotePolicy,
    capacity: Option<usize>,
    table: Mutex<TrackTable>,
}

impl TrackDefectStateMachine {
    pub fn new(policy: VotePolicy) -> Self {
        Self {
            policy,
            capacity: None,
            table: Mutex::new(TrackTable::default()),
        }
    }

    /// Bound the vote table, evicting the least recently seen track.
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity.max(1));
        self
    }

    pub fn policy(&self) -> &VotePolicy {
        &self.policy
    }

    fn lock(&self) -> MutexGuard<'_, TrackTable> {
        // A panic while holding the lock leaves the table consistent
        self.table.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Record one tracked detection.
    pub fn add_detection(&self, track_id: TrackId, label: &str, score: f32) {
        let delta = self.policy.delta(label, score);
        let mut table = self.lock();

        if !table.records.contains_key(&track_id) {
            if let Some(capacity) = self.capacity {
                if table.records.len() >= capacity {
                    table.evict_least_recent();
                }
            }
        }

        table.sequence += 1;
        let sequence = table.sequence;
        table.current.insert(track_id);
        let record = table.records.entry(track_id).or_insert(TrackVoteRecord {
            votes: 0,
            first_crossing: None,
            reported: false,
            last_seen: sequence,
        });
        record.last_seen = sequence;

        if delta == 0 {
            return;
        }
        let previous = record.votes;
        record.votes = self.policy.clamp(previous + delta);
        if !self.policy.is_defective(previous)
            && self.policy.is_defective(record.votes)
            && record.first_crossing.is_none()
        {
            record.first_crossing = Some(Utc::now());
            info!(track_id = %track_id, votes = record.votes, "Track crossed defect threshold");
        }
    }

    /// Statistics for the tracks seen since the previous call.
    ///
    /// With `refresh` the window is swapped for an empty one under the same
    /// lock, so every detection lands in exactly one window.
    pub fn get_instant_statistics(&self, refresh: bool) -> StatisticsBatch {
        let mut table = self.lock();
        let window = if refresh {
            std::mem::take(&mut table.current)
        } else {
            table.current.clone()
        };

        let (mut defective, mut non_defective) = (0u32, 0u32);
        for id in &window {
            if let Some(record) = table.records.get(id) {
                if self.policy.is_defective(record.votes) {
                    defective += 1;
                } else if self.policy.is_non_defective(record.votes) {
                    non_defective += 1;
                }
            }
        }

        let total = u32::try_from(window.len()).unwrap_or(u32::MAX);
        let mut batch = StatisticsBatch::with_counts(total, defective, non_defective);
        batch.defects = table.defects(&self.policy, Some(&window));
        batch
    }

    /// Defect records for the selected tracks, or all tracks without a filter.
    ///
    /// Already reported tracks are included; deduplication is the caller's job.
    pub fn get_statistics(&self, filter: Option<&HashSet<TrackId>>) -> Vec<DefectRecord> {
        self.lock().defects(&self.policy, filter)
    }

    /// Flag a track as reported. Returns true only on the first call for a
    /// track that has crossed the threshold.
    pub fn mark_reported(&self, track_id: TrackId) -> bool {
        let mut table = self.lock();
        match table.records.get_mut(&track_id) {
            Some(record) if record.first_crossing.is_some() && !record.reported => {
                record.reported = true;
                true
            }
            _ => false,
        }
    }

    pub fn record(&self, track_id: TrackId) -> Option<TrackVoteRecord> {
        self.lock().records.get(&track_id).cloned()
    }

    /// Number of tracks in the vote table.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }
}
