//! Vote policy for tracked objects.

/// How detections move a track's vote.
///
/// Disabled by default: votes stay at zero and no track is ever reported.
#[derive(Debug, Clone, PartialEq)]
pub struct VotePolicy {
    pub enabled: bool,
    /// Detections scoring at or below this do not vote
    pub vote_threshold: f32,
    /// Label voting -1
    pub defective_label: String,
    /// Label voting +1
    pub non_defective_label: String,
    /// |votes| needed for a decided label
    pub min_votes: i32,
    /// Vote bound in both directions
    pub max_votes: i32,
}

impl Default for VotePolicy {
    fn default() -> Self {
        Self {
            enabled: false,
            vote_threshold: 0.5,
            defective_label: "defective".to_string(),
            non_defective_label: "non_defective".to_string(),
            min_votes: 1,
            max_votes: 50,
        }
    }
}

impl VotePolicy {
    /// Vote delta for one detection.
    pub fn delta(&self, label: &str, score: f32) -> i32 {
        if !self.enabled || score <= self.vote_threshold {
            return 0;
        }
        if label == self.non_defective_label {
            1
        } else if label == self.defective_label {
            -1
        } else {
            0
        }
    }

    pub fn clamp(&self, votes: i32) -> i32 {
        votes.clamp(-self.max_votes, self.max_votes)
    }

    pub fn is_defective(&self, votes: i32) -> bool {
        votes <= -self.min_votes
    }

    pub fn is_non_defective(&self, votes: i32) -> bool {
        votes >= self.min_votes
    }

    /// Reporting confidence in [0, 1].
    pub fn confidence(&self, votes: i32) -> f64 {
        if self.max_votes <= 0 {
            return 0.0;
        }
        f64::from(votes.unsigned_abs()) / f64::from(self.max_votes)
    }
}
