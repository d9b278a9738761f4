//! The control loop.
//!
//! One iteration drains the inference queues (raising alerts and flushing
//! records when due), rotates segments once the inference pipeline is live,
//! dispatches at most one command, checks worker liveness and schedules the
//! periodic inference restart. The loop waits one poll interval between
//! iterations when no command is pending.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use railcam_media::{
    CommandLauncher, CommandTemplate, SegmentManager, SegmentPolicy, Supervisor,
    TerminationOutcome, WorkerCommand, WorkerLauncher,
};
use railcam_models::{Command, GrassEvent, StatisticsBatch};
use railcam_queue::{CommandQueue, CommandSender};
use railcam_storage::{drain, grass_events_path, statistics_path, BatchPersister, JsonArrayStore};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::alerting::evaluate_alert;
use crate::config::RunConfig;
use crate::error::{WorkerError, WorkerResult};
use crate::inference::{InferenceLink, InferenceQueues};
use crate::metrics;

pub const INFERENCE_WORKER: &str = "inference";
pub const STREAMING_WORKER: &str = "streaming";
pub const FILESERVER_WORKER: &str = "fileserver";
pub const SERIAL_WORKER: &str = "serial-capture";

struct Templates {
    inference: CommandTemplate,
    streaming: CommandTemplate,
    fileserver: CommandTemplate,
    serial: Option<CommandTemplate>,
}

pub struct Controller<L: WorkerLauncher = CommandLauncher> {
    config: RunConfig,
    supervisor: Supervisor<L>,
    templates: Templates,
    /// Present for live inputs only
    segments: Option<SegmentManager>,
    policy: SegmentPolicy,
    commands: CommandQueue,
    link: InferenceLink,
    queues: InferenceQueues,
    statistics: BatchPersister<StatisticsBatch>,
    grass_events: BatchPersister<GrassEvent>,
    live: bool,
    rotation_enabled: bool,
    restart_requested: bool,
}

impl<L: WorkerLauncher> Controller<L> {
    /// Build the controller. Record files are named after `started_at`.
    pub fn new(config: RunConfig, launcher: L, started_at: DateTime<Utc>) -> WorkerResult<Self> {
        let live = config.is_live_input();
        let templates = Templates {
            inference: CommandTemplate::parse(&config.inference_command)?,
            streaming: CommandTemplate::parse(&config.streaming_command)?,
            fileserver: CommandTemplate::parse(&config.fileserver_command)?,
            serial: config
                .serial_command
                .as_deref()
                .map(CommandTemplate::parse)
                .transpose()?,
        };
        let segments = if live {
            Some(SegmentManager::new(config.port_pool()?, config.filesave_template()?))
        } else {
            None
        };

        let (link, queues) =
            InferenceLink::new(config.statistics_queue_capacity, config.grass_queue_capacity);
        let statistics = BatchPersister::new(
            "statistics",
            JsonArrayStore::new(statistics_path(&config.statistics_dir, started_at)),
            config.statistics_flush_period,
        );
        let grass_events = BatchPersister::new(
            "grass",
            JsonArrayStore::new(grass_events_path(&config.statistics_dir, started_at)),
            config.statistics_flush_period,
        );

        Ok(Self {
            supervisor: Supervisor::new(launcher).with_grace_period(config.grace_period),
            policy: config.segment_policy(),
            rotation_enabled: live && config.fileserver_enabled,
            templates,
            segments,
            commands: CommandQueue::new(),
            link,
            queues,
            statistics,
            grass_events,
            live,
            restart_requested: false,
            config,
        })
    }

    /// Handle for signal tasks.
    pub fn command_sender(&self) -> CommandSender {
        self.commands.sender()
    }

    pub fn supervisor(&self) -> &Supervisor<L> {
        &self.supervisor
    }

    pub fn segments(&self) -> Option<&SegmentManager> {
        self.segments.as_ref()
    }

    pub fn link(&self) -> &InferenceLink {
        &self.link
    }

    pub fn pending_statistics(&self) -> usize {
        self.statistics.pending_len()
    }

    /// Start the long-lived workers.
    ///
    /// Only a failure to start the inference worker is returned.
    pub fn startup(&mut self) -> WorkerResult<()> {
        info!(
            input = %self.config.input,
            live = self.live,
            rotation = self.rotation_enabled,
            "Starting workers"
        );
        if self.live && self.config.fileserver_enabled {
            if let Err(e) = self.start_fileserver() {
                error!("Failed to start file server: {}", e);
            }
        }
        if self.config.streaming_start_default {
            self.commands.enqueue_command(Command::StreamingStart);
        }
        if let Err(e) = self.start_serial() {
            error!("Failed to start serial capture: {}", e);
        }
        self.start_inference()
    }

    /// Iterate until `shutdown` completes or a fatal error occurs.
    pub async fn run<S>(&mut self, shutdown: S) -> WorkerResult<()>
    where
        S: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        loop {
            self.iteration(Instant::now()).await?;

            let wait = if self.commands.is_empty() {
                self.config.poll_interval
            } else {
                Duration::ZERO
            };
            tokio::select! {
                biased;

                _ = &mut shutdown => {
                    info!("Interrupted, leaving control loop");
                    return Ok(());
                }
                _ = tokio::time::sleep(wait) => {}
            }
        }
    }

    /// One pass of the control loop at `now`.
    pub async fn iteration(&mut self, now: Instant) -> WorkerResult<()> {
        self.handle_statistics(now);
        self.rotate(now).await?;
        if let Some(raw) = self.commands.pop() {
            self.dispatch(&raw, now).await?;
        }
        self.check_workers()?;
        self.check_restart_timeout();
        Ok(())
    }

    /// Finalize segments, stop every worker and write pending records.
    pub async fn shutdown(&mut self) {
        if let Some(segments) = self.segments.as_mut() {
            let report = segments
                .finalize_all(&mut self.supervisor, &self.policy)
                .await;
            metrics::record_segments_finalized(report.kept.len(), report.discarded.len());
            metrics::set_active_segments(0);
            info!(
                kept = report.kept.len(),
                discarded = report.discarded.len(),
                "Segments finalized"
            );
        }

        let inference_was_running = self.supervisor.is_running(INFERENCE_WORKER);
        for name in [
            INFERENCE_WORKER,
            FILESERVER_WORKER,
            STREAMING_WORKER,
            SERIAL_WORKER,
        ] {
            if self.supervisor.is_running(name) {
                self.stop_worker(name).await;
            }
        }

        // Let the reader task forward the final report
        if inference_was_running {
            tokio::time::sleep(self.config.poll_interval).await;
        }
        self.statistics.drain_from(&mut self.queues.statistics);
        self.grass_events.drain_from(&mut self.queues.grass);

        match self.statistics.flush_now().await {
            Ok(count) => metrics::record_flush("statistics", count),
            Err(e) => error!("Failed to write statistics at shutdown: {}", e),
        }
        match self.grass_events.flush_now().await {
            Ok(count) => metrics::record_flush("grass", count),
            Err(e) => error!("Failed to write grass events at shutdown: {}", e),
        }
        info!("Shutdown complete");
    }

    fn handle_statistics(&mut self, now: Instant) {
        let mut batches = Vec::new();
        drain(&mut self.queues.statistics, &mut batches);
        for batch in batches {
            if self.live && evaluate_alert(&batch, &self.config.alerts) {
                metrics::record_alert();
                let flagged = self
                    .segments
                    .as_mut()
                    .map_or(0, SegmentManager::flag_retain);
                warn!(
                    tracks_total = batch.tracks_total,
                    tracks_defective = batch.tracks_defective,
                    tracks_non_defective = batch.tracks_non_defective,
                    segments = flagged,
                    "Alert raised, keeping current segments"
                );
            }
            self.statistics.push(batch);
        }
        self.grass_events.drain_from(&mut self.queues.grass);

        let flushed = self.statistics.flush_if_due(now);
        if flushed > 0 {
            metrics::record_flush("statistics", flushed);
        }
        let flushed = self.grass_events.flush_if_due(now);
        if flushed > 0 {
            metrics::record_flush("grass", flushed);
        }
    }

    async fn rotate(&mut self, now: Instant) -> WorkerResult<()> {
        if !self.rotation_enabled || !self.link.is_ready() {
            return Ok(());
        }
        let Some(segments) = self.segments.as_mut() else {
            return Ok(());
        };

        match segments.tick(&mut self.supervisor, &self.policy, now).await {
            Ok(report) => {
                metrics::record_segments_finalized(report.kept.len(), report.discarded.len());
                if report.started.is_some() {
                    metrics::record_worker_started("file-save");
                }
                metrics::set_active_segments(segments.active_count());
                Ok(())
            }
            Err(e) if e.is_fatal() => {
                error!("Segment rotation cannot continue: {}", e);
                Err(e.into())
            }
            Err(e) => {
                error!("Segment rotation failed: {}", e);
                Ok(())
            }
        }
    }

    async fn dispatch(&mut self, raw: &str, now: Instant) -> WorkerResult<()> {
        let command = match raw.parse::<Command>() {
            Ok(command) => command,
            Err(e) => {
                warn!("Command not recognized: {}", e);
                metrics::record_command_rejected();
                return Ok(());
            }
        };
        info!(command = command.as_str(), "Dispatching command");
        metrics::record_command(command.as_str());

        match command {
            Command::StreamingStart => {
                if self.supervisor.is_alive(STREAMING_WORKER) {
                    debug!("Streaming already running");
                } else if let Err(e) = self.start_streaming() {
                    error!("Failed to start streaming: {}", e);
                }
            }
            Command::StreamingStop => {
                if self.supervisor.is_alive(STREAMING_WORKER) {
                    self.stop_worker(STREAMING_WORKER).await;
                }
            }
            Command::InferenceRestart => {
                self.restart_requested = false;
                if self.supervisor.is_alive(INFERENCE_WORKER) {
                    self.stop_worker(INFERENCE_WORKER).await;
                }
                self.start_inference()?;
            }
            Command::FileserverRestart => {
                if self.supervisor.is_alive(FILESERVER_WORKER) {
                    self.stop_worker(FILESERVER_WORKER).await;
                }
                match self.start_fileserver() {
                    Ok(()) if self.live => self.rotation_enabled = true,
                    Ok(()) => {}
                    Err(e) => error!("Failed to start file server: {}", e),
                }
            }
            Command::FileSave => match self.segments.as_mut() {
                Some(segments) => {
                    segments.flag_retain();
                }
                None => warn!("No segments are recorded for file inputs"),
            },
            Command::StatusRequest => self.log_status(now),
        }
        Ok(())
    }

    fn check_workers(&mut self) -> WorkerResult<()> {
        for name in self.supervisor.refresh_liveness() {
            metrics::record_worker_exited(&name);
            match name.as_str() {
                INFERENCE_WORKER => {
                    let code = self.supervisor.exit_code(INFERENCE_WORKER);
                    error!(exit_code = ?code, "Inference worker died, stopping");
                    return Err(WorkerError::InferenceExited(code));
                }
                SERIAL_WORKER => {
                    info!("Restarting serial capture");
                    if let Err(e) = self.start_serial() {
                        error!("Failed to restart serial capture: {}", e);
                    }
                }
                _ => debug!(worker = %name, "Worker not restarted"),
            }
        }
        Ok(())
    }

    fn check_restart_timeout(&mut self) {
        let Some(timeout) = self.config.inference_restart_timeout else {
            return;
        };
        if !self.live || self.restart_requested {
            return;
        }
        if self
            .supervisor
            .uptime(INFERENCE_WORKER)
            .is_some_and(|uptime| uptime > timeout)
        {
            info!(
                timeout_secs = timeout.as_secs(),
                "Inference uptime over limit, scheduling restart"
            );
            self.restart_requested = self.commands.enqueue_command(Command::InferenceRestart);
        }
    }

    fn log_status(&self, now: Instant) {
        let workers = self.supervisor.snapshot();
        let segments = self
            .segments
            .as_ref()
            .map(|s| s.snapshot(now))
            .unwrap_or_default();
        info!(
            workers = %serde_json::to_string(&workers).unwrap_or_default(),
            segments = %serde_json::to_string(&segments).unwrap_or_default(),
            inference_ready = self.link.is_ready(),
            pending_statistics = self.statistics.pending_len(),
            pending_grass_events = self.grass_events.pending_len(),
            "Status"
        );
    }

    async fn stop_worker(&mut self, name: &str) {
        match self.supervisor.terminate(name, false).await {
            Ok(TerminationOutcome::ForceKilled) => metrics::record_worker_force_killed(name),
            Ok(_) => {}
            Err(e) => warn!(worker = name, "Failed to stop worker: {}", e),
        }
    }

    fn start_worker(&mut self, name: &str, command: &WorkerCommand) -> WorkerResult<()> {
        self.supervisor.start(name, command)?;
        metrics::record_worker_started(name);
        Ok(())
    }

    fn start_inference(&mut self) -> WorkerResult<()> {
        let output = self.config.inference_output();
        let command =
            self.link
                .command(&self.templates.inference, &self.config.input, output.as_deref());
        self.start_worker(INFERENCE_WORKER, &command)
    }

    fn start_streaming(&mut self) -> WorkerResult<()> {
        let port = self.config.streaming_port.to_string();
        let command = self.templates.streaming.render(&[("port", port.as_str())]);
        self.start_worker(STREAMING_WORKER, &command)
    }

    fn start_fileserver(&mut self) -> WorkerResult<()> {
        std::fs::create_dir_all(&self.config.hdd_dir)?;
        let port = self.config.fileserver_port.to_string();
        let dir = self.config.hdd_dir.to_string_lossy().into_owned();
        let command = self
            .templates
            .fileserver
            .render(&[("port", port.as_str()), ("dir", dir.as_str())]);
        self.start_worker(FILESERVER_WORKER, &command)
    }

    fn start_serial(&mut self) -> WorkerResult<()> {
        let Some(template) = self.templates.serial.as_ref() else {
            return Ok(());
        };
        let dir = self.config.hdd_dir.to_string_lossy().into_owned();
        let command = template.render(&[("dir", dir.as_str())]);
        self.start_worker(SERIAL_WORKER, &command)
    }
}
