//! Process supervisor.
//!
//! Owns the registry of named workers. Termination is two-phase: the worker is
//! interrupted and given a grace period to flush its output, then killed.
//! Forced termination is logged as a warning and the registry is updated on
//! every path.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::command::WorkerCommand;
use crate::error::{MediaError, MediaResult};
use crate::logging::WorkerLogger;
use crate::process::{CommandLauncher, WorkerExit, WorkerLauncher, WorkerProcess};

/// Time a worker gets to exit after being interrupted.
pub const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(10);

const EXIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Lifecycle state of a registered worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Running,
    InterruptSent,
    Exited,
    ForceKilled,
}

impl WorkerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Running => "running",
            WorkerState::InterruptSent => "interrupt_sent",
            WorkerState::Exited => "exited",
            WorkerState::ForceKilled => "force_killed",
        }
    }
}

/// Result of [`Supervisor::terminate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationOutcome {
    /// Exited on its own or after the interrupt.
    Exited(Option<i32>),
    /// Still alive after the grace period.
    ForceKilled,
    /// Had already ended before the call.
    NotRunning,
}

/// Returned by [`Supervisor::start`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerRef {
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
}

/// Registry entry as reported by `status_request`.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessInfo {
    pub name: String,
    pub pid: Option<u32>,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub running: bool,
    pub state: WorkerState,
    pub exit_code: Option<i32>,
}

struct WorkerHandle {
    started_at: DateTime<Utc>,
    started: Instant,
    ended_at: Option<DateTime<Utc>>,
    running: bool,
    state: WorkerState,
    pid: Option<u32>,
    exit_code: Option<i32>,
    process: Option<Box<dyn WorkerProcess>>,
    logger: WorkerLogger,
}

impl WorkerHandle {
    fn mark_ended(&mut self, state: WorkerState, code: Option<i32>) {
        self.running = false;
        self.state = state;
        self.exit_code = code;
        self.ended_at = Some(Utc::now());
        self.process = None;
    }
}

/// Supervises named worker processes.
pub struct Supervisor<L: WorkerLauncher = CommandLauncher> {
    launcher: L,
    registry: HashMap<String, WorkerHandle>,
    grace_period: Duration,
}

impl<L: WorkerLauncher> Supervisor<L> {
    pub fn new(launcher: L) -> Self {
        Self {
            launcher,
            registry: HashMap::new(),
            grace_period: DEFAULT_GRACE_PERIOD,
        }
    }

    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    pub fn grace_period(&self) -> Duration {
        self.grace_period
    }

    pub fn launcher(&self) -> &L {
        &self.launcher
    }

    /// Spawn a worker under `name`.
    ///
    /// Fails if `name` denotes a worker that is still alive. An ended record
    /// under the same name is replaced.
    pub fn start(&mut self, name: &str, command: &WorkerCommand) -> MediaResult<WorkerRef> {
        if self.probe(name) {
            return Err(MediaError::WorkerAlreadyRunning(name.to_string()));
        }

        let logger = WorkerLogger::new(name, "supervisor");
        let process = self.launcher.launch(name, command).inspect_err(|e| {
            logger.log_error(&e.to_string());
        })?;
        let pid = process.id();
        let started_at = Utc::now();
        logger.log_start(pid);

        self.registry.insert(
            name.to_string(),
            WorkerHandle {
                started_at,
                started: Instant::now(),
                ended_at: None,
                running: true,
                state: WorkerState::Running,
                pid,
                exit_code: None,
                process: Some(process),
                logger,
            },
        );

        Ok(WorkerRef {
            name: name.to_string(),
            pid,
            started_at,
        })
    }

    /// Liveness probe. Leaves the registry untouched.
    pub fn is_alive(&mut self, name: &str) -> bool {
        self.probe(name)
    }

    fn probe(&mut self, name: &str) -> bool {
        let Some(handle) = self.registry.get_mut(name) else {
            return false;
        };
        match handle.process.as_mut() {
            Some(process) => matches!(process.try_wait(), Ok(None)),
            None => false,
        }
    }

    /// Update liveness flags and return the workers that ended since the last check.
    pub fn refresh_liveness(&mut self) -> Vec<String> {
        let mut ended = Vec::new();
        for (name, handle) in self.registry.iter_mut() {
            if !handle.running {
                continue;
            }
            let exit = match handle.process.as_mut() {
                Some(process) => match process.try_wait() {
                    Ok(exit) => exit,
                    Err(e) => {
                        handle.logger.log_error(&format!("liveness check failed: {e}"));
                        None
                    }
                },
                None => Some(WorkerExit { code: None }),
            };
            if let Some(exit) = exit {
                warn!(worker = %name, exit_code = ?exit.code, "Worker exited unexpectedly");
                handle.mark_ended(WorkerState::Exited, exit.code);
                ended.push(name.clone());
            }
        }
        ended.sort();
        ended
    }

    /// Stop a worker: interrupt, wait up to the grace period, then kill.
    ///
    /// With `delete_record` the registry entry is removed, otherwise it is
    /// kept with its end time.
    pub async fn terminate(
        &mut self,
        name: &str,
        delete_record: bool,
    ) -> MediaResult<TerminationOutcome> {
        let grace = self.grace_period;
        let handle = self
            .registry
            .get_mut(name)
            .ok_or_else(|| MediaError::WorkerNotFound(name.to_string()))?;

        let outcome = match handle.process.as_mut() {
            None => TerminationOutcome::NotRunning,
            Some(process) => match process.try_wait() {
                Ok(Some(exit)) => {
                    debug!(worker = name, "Worker already exited");
                    TerminationOutcome::Exited(exit.code)
                }
                _ => {
                    handle.state = WorkerState::InterruptSent;
                    handle.logger.log_interrupt();
                    if let Err(e) = process.interrupt() {
                        handle.logger.log_error(&format!("interrupt failed: {e}"));
                    }

                    match wait_for_exit(&mut **process, grace).await {
                        Some(exit) => TerminationOutcome::Exited(exit.code),
                        None => {
                            handle.logger.log_forced(grace.as_secs_f64());
                            if let Err(e) = process.kill() {
                                handle.logger.log_error(&format!("kill failed: {e}"));
                            }
                            TerminationOutcome::ForceKilled
                        }
                    }
                }
            },
        };

        match outcome {
            TerminationOutcome::Exited(code) => {
                handle.logger.log_terminated(code);
                handle.mark_ended(WorkerState::Exited, code);
            }
            TerminationOutcome::ForceKilled => {
                handle.logger.log_terminated(None);
                handle.mark_ended(WorkerState::ForceKilled, None);
            }
            TerminationOutcome::NotRunning => {}
        }

        if delete_record {
            self.registry.remove(name);
        }
        Ok(outcome)
    }

    /// Terminate every running worker, keeping their records.
    pub async fn shutdown_all(&mut self) -> Vec<(String, TerminationOutcome)> {
        let mut names: Vec<String> = self
            .registry
            .iter()
            .filter(|(_, h)| h.running)
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();

        let mut outcomes = Vec::with_capacity(names.len());
        for name in names {
            match self.terminate(&name, false).await {
                Ok(outcome) => outcomes.push((name, outcome)),
                Err(e) => warn!(worker = %name, "Failed to terminate worker: {}", e),
            }
        }
        outcomes
    }

    /// Whether the registry holds a record for `name`.
    pub fn contains(&self, name: &str) -> bool {
        self.registry.contains_key(name)
    }

    /// Registry flag, as of the last start, terminate or refresh.
    pub fn is_running(&self, name: &str) -> bool {
        self.registry.get(name).is_some_and(|h| h.running)
    }

    pub fn state(&self, name: &str) -> Option<WorkerState> {
        self.registry.get(name).map(|h| h.state)
    }

    /// Exit code recorded when the worker ended.
    pub fn exit_code(&self, name: &str) -> Option<i32> {
        self.registry.get(name).and_then(|h| h.exit_code)
    }

    /// Time since a running worker was started.
    pub fn uptime(&self, name: &str) -> Option<Duration> {
        self.registry
            .get(name)
            .filter(|h| h.running)
            .map(|h| h.started.elapsed())
    }

    /// Registry contents ordered by name.
    pub fn snapshot(&self) -> Vec<ProcessInfo> {
        let mut infos: Vec<ProcessInfo> = self
            .registry
            .iter()
            .map(|(name, h)| ProcessInfo {
                name: name.clone(),
                pid: h.pid,
                started_at: h.started_at,
                ended_at: h.ended_at,
                running: h.running,
                state: h.state,
                exit_code: h.exit_code,
            })
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.registry.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.is_empty()
    }
}

/// Poll until the process exits or `grace` elapses.
async fn wait_for_exit(process: &mut dyn WorkerProcess, grace: Duration) -> Option<WorkerExit> {
    let deadline = Instant::now() + grace;
    loop {
        match process.try_wait() {
            Ok(Some(exit)) => return Some(exit),
            Ok(None) => {}
            Err(e) => debug!("Exit check failed: {}", e),
        }
        if Instant::now() >= deadline {
            return None;
        }
        tokio::time::sleep(EXIT_POLL_INTERVAL).await;
    }
}
