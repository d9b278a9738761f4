//! Bridge between the opaque pipeline and the control process.
//!
//! Reads per-frame observations (one JSON object per line), feeds the track
//! state machine and the grass monitor, and writes protocol messages for the
//! control process: `ready` after the first frame, one `grass` message per
//! presence transition and a `statistics` message per reporting window.

use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use railcam_models::{FrameObservation, InferenceMessage};
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

use crate::config::InferenceConfig;
use crate::error::InferenceResult;
use crate::grass::GrassMonitor;
use crate::reporter::StatisticsReporter;
use crate::tracks::TrackDefectStateMachine;

/// Counters returned when the bridge stops.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeSummary {
    pub frames: u64,
    pub skipped_lines: u64,
    pub statistics: u64,
    pub grass_events: u64,
}

pub struct InferenceBridge {
    machine: TrackDefectStateMachine,
    grass: Option<GrassMonitor>,
    reporter: StatisticsReporter,
    statistics_period: Duration,
    ready: bool,
    summary: BridgeSummary,
}

impl InferenceBridge {
    pub fn new(config: &InferenceConfig) -> Self {
        let mut machine = TrackDefectStateMachine::new(config.votes.clone());
        if let Some(capacity) = config.track_capacity {
            machine = machine.with_capacity(capacity);
        }
        Self {
            machine,
            grass: config
                .grass_detection
                .then(|| GrassMonitor::new(config.grass_frame_threshold)),
            reporter: StatisticsReporter::new(),
            statistics_period: config.statistics_period,
            ready: false,
            summary: BridgeSummary::default(),
        }
    }

    pub fn machine(&self) -> &TrackDefectStateMachine {
        &self.machine
    }

    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Process one frame, returning the messages it produced.
    pub fn process_frame(&mut self, frame: &FrameObservation) -> Vec<InferenceMessage> {
        let mut messages = Vec::new();
        self.summary.frames += 1;

        if !self.ready {
            self.ready = true;
            info!(frame = frame.frame, "Pipeline producing frames");
            messages.push(InferenceMessage::Ready);
        }

        for detection in &frame.detections {
            self.machine
                .add_detection(detection.track_id, &detection.label, detection.score);
        }

        if let Some(monitor) = self.grass.as_mut() {
            if let Some(event) = monitor.observe(frame.grass, Utc::now()) {
                self.summary.grass_events += 1;
                messages.push(InferenceMessage::Grass(event));
            }
        }
        messages
    }

    /// Close the current reporting window.
    pub fn report(&mut self) -> Option<InferenceMessage> {
        let batch = self.reporter.report(&self.machine)?;
        self.summary.statistics += 1;
        info!(
            tracks_total = batch.tracks_total,
            tracks_defective = batch.tracks_defective,
            new_defects = batch.defects.len(),
            "Reporting statistics"
        );
        Some(InferenceMessage::Statistics(batch))
    }

    /// Run until the line source ends or `shutdown` completes, then emit a
    /// final report.
    pub async fn run<W, S>(
        &mut self,
        lines: &mut mpsc::Receiver<String>,
        output: &mut W,
        shutdown: S,
    ) -> InferenceResult<BridgeSummary>
    where
        W: AsyncWrite + Unpin,
        S: Future<Output = ()>,
    {
        let mut ticker = interval_at(
            Instant::now() + self.statistics_period,
            self.statistics_period,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Interrupted, collecting statistics before exit");
                    break;
                }
                // Ahead of the lines so a frame backlog cannot hold a window open
                _ = ticker.tick() => {
                    if let Some(message) = self.report() {
                        write_message(output, &message).await?;
                    }
                }
                line = lines.recv() => {
                    let Some(line) = line else {
                        info!("Pipeline output ended");
                        break;
                    };
                    match serde_json::from_str::<FrameObservation>(line.trim()) {
                        Ok(frame) => {
                            for message in self.process_frame(&frame) {
                                write_message(output, &message).await?;
                            }
                        }
                        Err(_) => {
                            self.summary.skipped_lines += 1;
                            debug!(line = %line, "Pipeline output");
                        }
                    }
                }
            }
        }

        if let Some(message) = self.report() {
            write_message(output, &message).await?;
        }
        output.flush().await?;
        Ok(self.summary)
    }
}

async fn write_message<W: AsyncWrite + Unpin>(
    output: &mut W,
    message: &InferenceMessage,
) -> InferenceResult<()> {
    let mut line = message.to_line()?;
    line.push('\n');
    output.write_all(line.as_bytes()).await?;
    output.flush().await?;
    Ok(())
}
