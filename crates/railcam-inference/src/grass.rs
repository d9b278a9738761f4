//! Grass presence hysteresis.
//!
//! The per-frame grass signal is noisy. A signed counter clamped to
//! [-T, T] turns it into presence events: `grass_detected` once the counter
//! reaches T while absent, `grass_stopped` once it reaches -T while present.
//! The counter is not reset after `grass_stopped`, so grass has to be seen
//! for 2T frames before it is reported again.

use chrono::{DateTime, Utc};
use railcam_models::GrassEvent;
use tracing::info;

#[derive(Debug, Clone)]
pub struct GrassMonitor {
    counter: i64,
    present: bool,
    threshold: i64,
}

impl GrassMonitor {
    /// `threshold` is the number of consecutive frames (at least 1).
    pub fn new(threshold: u32) -> Self {
        Self {
            counter: 0,
            present: false,
            threshold: i64::from(threshold.max(1)),
        }
    }

    /// Feed one frame's signal. Returns an event on a state transition.
    pub fn observe(&mut self, grass: bool, time: DateTime<Utc>) -> Option<GrassEvent> {
        if grass {
            self.counter = (self.counter + 1).min(self.threshold);
        } else if self.present {
            self.counter = (self.counter - 1).max(-self.threshold);
        }

        if !self.present && self.counter >= self.threshold {
            self.present = true;
            info!(time = %time, "Grass detected");
            return Some(GrassEvent::detected(time));
        }
        if self.present && self.counter <= -self.threshold {
            self.present = false;
            info!(time = %time, "Grass stopped");
            return Some(GrassEvent::stopped(time));
        }
        None
    }

    pub fn is_present(&self) -> bool {
        self.present
    }

    pub fn counter(&self) -> i64 {
        self.counter
    }

    pub fn threshold(&self) -> i64 {
        self.threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use railcam_models::GrassEventType;

    fn feed(monitor: &mut GrassMonitor, frames: &[bool]) -> Vec<GrassEventType> {
        frames
            .iter()
            .filter_map(|&g| monitor.observe(g, Utc::now()))
            .map(|e| e.kind)
            .collect()
    }

    #[test]
    fn test_threshold_true_frames_emit_once() {
        let mut monitor = GrassMonitor::new(5);
        assert_eq!(feed(&mut monitor, &[true; 5]), vec![GrassEventType::GrassDetected]);
        assert!(monitor.is_present());

        // Pinned at T, no repeats
        assert!(feed(&mut monitor, &[true; 20]).is_empty());
        assert_eq!(monitor.counter(), 5);
    }

    #[test]
    fn test_one_short_then_false_emits_nothing() {
        let mut monitor = GrassMonitor::new(5);
        let mut frames = vec![true; 4];
        frames.push(false);
        assert!(feed(&mut monitor, &frames).is_empty());
        assert!(!monitor.is_present());
        // False frames while absent leave the counter alone
        assert_eq!(monitor.counter(), 4);
    }

    #[test]
    fn test_stopped_after_counter_reaches_negative_threshold() {
        let mut monitor = GrassMonitor::new(3);
        feed(&mut monitor, &[true; 3]);

        // 3 -> -3 takes six false frames
        assert!(feed(&mut monitor, &[false; 5]).is_empty());
        assert_eq!(feed(&mut monitor, &[false]), vec![GrassEventType::GrassStopped]);
        assert!(!monitor.is_present());
        assert_eq!(monitor.counter(), -3);
    }

    #[test]
    fn test_brief_reappearance_does_not_retrigger() {
        let mut monitor = GrassMonitor::new(3);
        feed(&mut monitor, &[true; 3]);
        feed(&mut monitor, &[false; 6]);

        assert!(feed(&mut monitor, &[true; 5]).is_empty());
        assert_eq!(feed(&mut monitor, &[true]), vec![GrassEventType::GrassDetected]);
    }

    #[test]
    fn test_noise_while_present_is_absorbed() {
        let mut monitor = GrassMonitor::new(3);
        feed(&mut monitor, &[true; 3]);
        assert!(feed(&mut monitor, &[false, true, false, false, true, true]).is_empty());
        assert!(monitor.is_present());
    }
}
