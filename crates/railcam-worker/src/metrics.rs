//! Prometheus metrics for the control loop.

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::{BuildError, PrometheusBuilder};

/// Install the Prometheus recorder with an HTTP listener on `port`.
///
/// Must be called from within the tokio runtime.
pub fn init_metrics(port: u16) -> Result<(), BuildError> {
    PrometheusBuilder::new()
        .with_http_listener(SocketAddr::from(([0, 0, 0, 0], port)))
        .install()
}

/// Metric names as constants for consistency.
pub mod names {
    // Commands
    pub const COMMANDS_TOTAL: &str = "railcam_commands_total";
    pub const COMMANDS_REJECTED_TOTAL: &str = "railcam_commands_rejected_total";

    // Workers
    pub const WORKERS_STARTED_TOTAL: &str = "railcam_workers_started_total";
    pub const WORKERS_EXITED_TOTAL: &str = "railcam_workers_exited_total";
    pub const WORKERS_FORCE_KILLED_TOTAL: &str = "railcam_workers_force_killed_total";

    // Segments
    pub const SEGMENTS_ACTIVE: &str = "railcam_segments_active";
    pub const SEGMENTS_KEPT_TOTAL: &str = "railcam_segments_kept_total";
    pub const SEGMENTS_DISCARDED_TOTAL: &str = "railcam_segments_discarded_total";

    // Statistics
    pub const ALERTS_TOTAL: &str = "railcam_alerts_total";
    pub const RECORDS_FLUSHED_TOTAL: &str = "railcam_records_flushed_total";
    pub const QUEUE_DROPS_TOTAL: &str = "railcam_queue_drops_total";
}

/// Worker kind for labels: `file-save-12` becomes `file-save`.
pub fn worker_kind(name: &str) -> &str {
    match name.rsplit_once('-') {
        Some((kind, suffix)) if !suffix.is_empty() && suffix.bytes().all(|b| b.is_ascii_digit()) => {
            kind
        }
        _ => name,
    }
}

/// Record a dispatched command.
pub fn record_command(command: &str) {
    let labels = [("command", command.to_string())];
    counter!(names::COMMANDS_TOTAL, &labels).increment(1);
}

/// Record a command that was not recognized.
pub fn record_command_rejected() {
    counter!(names::COMMANDS_REJECTED_TOTAL).increment(1);
}

pub fn record_worker_started(name: &str) {
    let labels = [("kind", worker_kind(name).to_string())];
    counter!(names::WORKERS_STARTED_TOTAL, &labels).increment(1);
}

/// Record a worker that died without being asked to.
pub fn record_worker_exited(name: &str) {
    let labels = [("kind", worker_kind(name).to_string())];
    counter!(names::WORKERS_EXITED_TOTAL, &labels).increment(1);
}

pub fn record_worker_force_killed(name: &str) {
    let labels = [("kind", worker_kind(name).to_string())];
    counter!(names::WORKERS_FORCE_KILLED_TOTAL, &labels).increment(1);
}

pub fn set_active_segments(count: usize) {
    gauge!(names::SEGMENTS_ACTIVE).set(count as f64);
}

pub fn record_segments_finalized(kept: usize, discarded: usize) {
    if kept > 0 {
        counter!(names::SEGMENTS_KEPT_TOTAL).increment(kept as u64);
    }
    if discarded > 0 {
        counter!(names::SEGMENTS_DISCARDED_TOTAL).increment(discarded as u64);
    }
}

pub fn record_alert() {
    counter!(names::ALERTS_TOTAL).increment(1);
}

/// Record records handed to a writer.
pub fn record_flush(kind: &str, records: usize) {
    let labels = [("kind", kind.to_string())];
    counter!(names::RECORDS_FLUSHED_TOTAL, &labels).increment(records as u64);
}

/// Record an entry dropped because a bounded queue was full.
pub fn record_queue_drop(queue: &str) {
    let labels = [("queue", queue.to_string())];
    counter!(names::QUEUE_DROPS_TOTAL, &labels).increment(1);
}
