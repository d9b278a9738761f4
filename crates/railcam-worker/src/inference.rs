//! Link to the inference worker.
//!
//! The inference worker writes protocol lines on stdout. The link parses them
//! on the worker's reader task and pushes statistics batches and grass
//! events into two bounded queues drained by the control loop. A full queue
//! drops the entry. The `ready` message sets a flag that is never cleared.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use railcam_media::{CommandTemplate, LineSink, WorkerCommand};
use railcam_models::{GrassEvent, InferenceMessage, StatisticsBatch};
use railcam_queue::{bounded, QueueReceiver, QueueSender};
use tracing::{debug, info, warn};

use crate::metrics;

/// Receiving ends of the link, owned by the control loop.
pub struct InferenceQueues {
    pub statistics: QueueReceiver<StatisticsBatch>,
    pub grass: QueueReceiver<GrassEvent>,
}

#[derive(Clone)]
pub struct InferenceLink {
    statistics: QueueSender<StatisticsBatch>,
    grass: QueueSender<GrassEvent>,
    ready: Arc<AtomicBool>,
}

impl InferenceLink {
    pub fn new(statistics_capacity: usize, grass_capacity: usize) -> (Self, InferenceQueues) {
        let (statistics, statistics_rx) = bounded("statistics", statistics_capacity);
        let (grass, grass_rx) = bounded("grass", grass_capacity);
        (
            Self {
                statistics,
                grass,
                ready: Arc::new(AtomicBool::new(false)),
            },
            InferenceQueues {
                statistics: statistics_rx,
                grass: grass_rx,
            },
        )
    }

    /// Whether the inference pipeline reported it is live.
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Acquire)
    }

    /// Handle one line of inference worker output.
    pub fn handle_line(&self, line: &str) {
        let Some(message) = InferenceMessage::parse_line(line) else {
            debug!(line = %line, "Inference output");
            return;
        };
        match message {
            InferenceMessage::Ready => {
                if !self.ready.swap(true, Ordering::AcqRel) {
                    info!("Inference pipeline is live");
                }
            }
            InferenceMessage::Statistics(batch) => {
                if let Err(e) = self.statistics.try_push(batch) {
                    warn!("Dropping statistics batch: {}", e);
                    metrics::record_queue_drop(self.statistics.name());
                }
            }
            InferenceMessage::Grass(event) => {
                if let Err(e) = self.grass.try_push(event) {
                    warn!("Dropping grass event: {}", e);
                    metrics::record_queue_drop(self.grass.name());
                }
            }
        }
    }

    pub fn sink(&self) -> LineSink {
        let link = self.clone();
        LineSink::new(move |line| link.handle_line(line))
    }

    /// Render the inference worker command for `input`, wired to this link.
    pub fn command(
        &self,
        template: &CommandTemplate,
        input: &str,
        output: Option<&Path>,
    ) -> WorkerCommand {
        let output = output
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        template
            .render(&[("input", input), ("output", output.as_str())])
            .stdout_lines(self.sink())
    }
}
