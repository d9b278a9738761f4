//! Rolling video segments.
//!
//! Each segment is recorded by its own worker listening on a UDP port from
//! the pool, into a file on the RAM directory. When a segment reaches its
//! duration it is finalized: the worker is stopped, the port released, and
//! the file either promoted to the HDD directory (retained or force-save) or
//! deleted. A new segment starts whenever the newest one is older than the
//! rotation period, so consecutive segments overlap.

use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::command::CommandTemplate;
use crate::error::{MediaError, MediaResult};
use crate::fs_utils::{move_file, remove_if_exists};
use crate::ports::PortPool;
use crate::process::WorkerLauncher;
use crate::supervisor::Supervisor;

/// Rotation settings passed to every tick.
#[derive(Debug, Clone)]
pub struct SegmentPolicy {
    /// Time between segment starts
    pub period: Duration,
    /// Length of one segment
    pub duration: Duration,
    /// Volatile directory segments are recorded into
    pub ram_dir: PathBuf,
    /// Durable directory retained segments are moved to
    pub hdd_dir: PathBuf,
    /// Keep every segment regardless of its retention flag
    pub force_save: bool,
}

impl SegmentPolicy {
    /// Ports needed to never exhaust the pool: one more than ⌈duration/period⌉.
    pub fn required_ports(&self) -> usize {
        if self.period.is_zero() {
            return usize::MAX;
        }
        let period = self.period.as_millis();
        let ceil = self.duration.as_millis().div_ceil(period);
        usize::try_from(ceil).unwrap_or(usize::MAX).saturating_add(1)
    }
}

/// One recording unit.
#[derive(Debug, Clone)]
pub struct VideoSegment {
    /// Sequence number, monotonic per run
    pub number: u64,
    /// Supervisor name of the recording worker
    pub name: String,
    pub file_name: String,
    pub ram_path: PathBuf,
    pub started: Instant,
    pub port: u16,
    /// Set by alerts and `file_save`; never cleared
    pub retain: bool,
}

impl VideoSegment {
    pub fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.started)
    }
}

/// Active segment as reported by `status_request`.
#[derive(Debug, Clone, Serialize)]
pub struct SegmentSnapshot {
    pub number: u64,
    pub name: String,
    pub path: PathBuf,
    pub port: u16,
    pub age_secs: f64,
    pub retain: bool,
}

/// What a tick did.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct TickReport {
    /// Files promoted to the HDD directory
    pub kept: Vec<PathBuf>,
    /// Files deleted from the RAM directory
    pub discarded: Vec<PathBuf>,
    /// Sequence number of the segment started in this tick
    pub started: Option<u64>,
}

impl TickReport {
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty() && self.discarded.is_empty() && self.started.is_none()
    }
}

/// Owns the port pool and the active segments.
#[derive(Debug)]
pub struct SegmentManager {
    ports: PortPool,
    template: CommandTemplate,
    active: Vec<VideoSegment>,
    highest_number: u64,
}

impl SegmentManager {
    /// `template` may use `{port}`, `{output}` and `{dir}`.
    pub fn new(ports: PortPool, template: CommandTemplate) -> Self {
        Self {
            ports,
            template,
            active: Vec::new(),
            highest_number: 0,
        }
    }

    /// Finalize expired segments, then start a new one if the period elapsed.
    ///
    /// Only port exhaustion and worker start failures are returned; file
    /// problems during finalization are logged.
    pub async fn tick<L: WorkerLauncher>(
        &mut self,
        supervisor: &mut Supervisor<L>,
        policy: &SegmentPolicy,
        now: Instant,
    ) -> MediaResult<TickReport> {
        let mut report = TickReport::default();

        let (expired, active): (Vec<_>, Vec<_>) = std::mem::take(&mut self.active)
            .into_iter()
            .partition(|s| s.age(now) >= policy.duration);
        self.active = active;
        for segment in expired {
            self.finalize(supervisor, segment, policy, &mut report).await;
        }

        let due = match self.active.iter().map(|s| s.started).max() {
            None => true,
            Some(newest) => now.saturating_duration_since(newest) >= policy.period,
        };
        if due {
            report.started = Some(self.start_segment(supervisor, policy, now).await?);
        }

        Ok(report)
    }

    async fn start_segment<L: WorkerLauncher>(
        &mut self,
        supervisor: &mut Supervisor<L>,
        policy: &SegmentPolicy,
        now: Instant,
    ) -> MediaResult<u64> {
        let port = self.ports.allocate()?;

        let number = self.highest_number + 1;
        let name = format!("file-save-{number}");
        let file_name = format!("{}_{}.mp4", Utc::now().format("%Y%m%d_%H%M%S"), number);
        let ram_path = policy.ram_dir.join(&file_name);

        let command = {
            let port_str = port.to_string();
            let output = ram_path.to_string_lossy();
            let dir = policy.ram_dir.to_string_lossy();
            let vars = [
                ("port", port_str.as_str()),
                ("output", &*output),
                ("dir", &*dir),
            ];
            self.template.render(&vars).output(&ram_path)
        };

        let started = match tokio::fs::create_dir_all(&policy.ram_dir).await {
            Ok(()) => supervisor.start(&name, &command),
            Err(e) => Err(MediaError::from(e)),
        };

        if let Err(e) = started {
            self.ports.release(port);
            error!(segment = number, port, "Failed to start segment worker: {}", e);
            return Err(e);
        }

        info!(segment = number, port, path = %ram_path.display(), "Segment started");
        self.highest_number = number;
        self.active.push(VideoSegment {
            number,
            name,
            file_name,
            ram_path,
            started: now,
            port,
            retain: false,
        });
        Ok(number)
    }

    async fn finalize<L: WorkerLauncher>(
        &mut self,
        supervisor: &mut Supervisor<L>,
        segment: VideoSegment,
        policy: &SegmentPolicy,
        report: &mut TickReport,
    ) {
        match supervisor.terminate(&segment.name, true).await {
            Ok(outcome) => debug!(segment = segment.number, ?outcome, "Segment worker stopped"),
            Err(e) => warn!(segment = segment.number, "Failed to stop segment worker: {}", e),
        }
        self.ports.release(segment.port);

        if segment.retain || policy.force_save {
            let target = policy.hdd_dir.join(&segment.file_name);
            match move_file(&segment.ram_path, &target).await {
                Ok(()) => {
                    info!(segment = segment.number, path = %target.display(), "Segment kept");
                    report.kept.push(target);
                }
                Err(MediaError::FileNotFound(path)) => {
                    warn!(segment = segment.number, path = %path.display(), "Segment file missing, nothing to keep");
                }
                Err(e) => {
                    error!(segment = segment.number, "Failed to keep segment: {}", e);
                }
            }
        } else {
            match remove_if_exists(&segment.ram_path).await {
                Ok(true) => {
                    debug!(segment = segment.number, "Segment discarded");
                    report.discarded.push(segment.ram_path);
                }
                Ok(false) => {
                    warn!(segment = segment.number, path = %segment.ram_path.display(), "Segment file missing");
                }
                Err(e) => {
                    error!(segment = segment.number, "Failed to delete segment: {}", e);
                }
            }
        }
    }

    /// Mark every active segment for promotion. Returns how many were flagged.
    pub fn flag_retain(&mut self) -> usize {
        for segment in &mut self.active {
            segment.retain = true;
        }
        info!(segments = self.active.len(), "Retaining active segments");
        self.active.len()
    }

    /// Finalize every active segment, regardless of age.
    pub async fn finalize_all<L: WorkerLauncher>(
        &mut self,
        supervisor: &mut Supervisor<L>,
        policy: &SegmentPolicy,
    ) -> TickReport {
        let mut report = TickReport::default();
        for segment in std::mem::take(&mut self.active) {
            self.finalize(supervisor, segment, policy, &mut report).await;
        }
        report
    }

    pub fn snapshot(&self, now: Instant) -> Vec<SegmentSnapshot> {
        self.active
            .iter()
            .map(|s| SegmentSnapshot {
                number: s.number,
                name: s.name.clone(),
                path: s.ram_path.clone(),
                port: s.port,
                age_secs: s.age(now).as_secs_f64(),
                retain: s.retain,
            })
            .collect()
    }

    pub fn active(&self) -> &[VideoSegment] {
        &self.active
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn ports(&self) -> &PortPool {
        &self.ports
    }

    pub fn highest_number(&self) -> u64 {
        self.highest_number
    }

    /// Whether `path` is being recorded right now.
    pub fn is_recording(&self, path: &Path) -> bool {
        self.active.iter().any(|s| s.ram_path == path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedLauncher;
    use tempfile::TempDir;

    const TEMPLATE: &str =
        "gst-launch-1.0 -e udpsrc port={port} ! mp4mux ! filesink location={output}";

    fn setup(ports: &[u16]) -> (SegmentManager, Supervisor<ScriptedLauncher>) {
        let manager = SegmentManager::new(
            PortPool::new(ports.iter().copied()),
            CommandTemplate::parse(TEMPLATE).unwrap(),
        );
        (manager, Supervisor::new(ScriptedLauncher::new()))
    }

    fn policy(dir: &TempDir, force_save: bool) -> SegmentPolicy {
        SegmentPolicy {
            period: Duration::from_secs(5),
            duration: Duration::from_secs(12),
            ram_dir: dir.path().join("ram"),
            hdd_dir: dir.path().join("hdd"),
            force_save,
        }
    }

    fn at(base: Instant, secs: u64) -> Instant {
        base + Duration::from_secs(secs)
    }

    #[test]
    fn test_required_ports() {
        let dir = TempDir::new().unwrap();
        assert_eq!(policy(&dir, false).required_ports(), 4);

        let even = SegmentPolicy {
            period: Duration::from_secs(5),
            duration: Duration::from_secs(10),
            ..policy(&dir, false)
        };
        assert_eq!(even.required_ports(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rotation_schedule() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001, 5002, 5003, 5004]);
        let base = Instant::now();

        let mut counts = Vec::new();
        for t in [0, 5, 10, 12, 15] {
            manager.tick(&mut sup, &policy, at(base, t)).await.unwrap();
            counts.push(manager.active_count());
        }

        // Starts at 0, 5, 10 and 15; the t=0 segment ends at 12
        assert_eq!(counts, vec![1, 2, 3, 2, 3]);
        let numbers: Vec<u64> = manager.active().iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![2, 3, 4]);
        assert!(!sup.contains("file-save-1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_start_before_period() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001, 5002]);
        let base = Instant::now();

        let first = manager.tick(&mut sup, &policy, base).await.unwrap();
        assert_eq!(first.started, Some(1));

        let second = manager.tick(&mut sup, &policy, at(base, 4)).await.unwrap();
        assert!(second.is_empty());
        assert_eq!(manager.active_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_worker_command_rendered() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001]);

        manager.tick(&mut sup, &policy, Instant::now()).await.unwrap();

        let segment = &manager.active()[0];
        let command = sup.launcher().last_command("file-save-1").unwrap();
        assert!(command.get_args().contains(&"port=5001".to_string()));
        assert!(command
            .get_args()
            .contains(&format!("location={}", segment.ram_path.display())));
        assert!(segment.file_name.ends_with("_1.mp4"));
        assert!(manager.is_recording(&segment.ram_path));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unretained_segment_deleted() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001, 5002, 5003, 5004]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        let path = manager.active()[0].ram_path.clone();
        assert!(path.exists());

        let report = manager.tick(&mut sup, &policy, at(base, 12)).await.unwrap();
        assert_eq!(report.discarded, vec![path.clone()]);
        assert!(report.kept.is_empty());
        assert!(!path.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retained_segment_moved_to_hdd() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001, 5002, 5003, 5004]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        manager.tick(&mut sup, &policy, at(base, 5)).await.unwrap();
        assert_eq!(manager.flag_retain(), 2);

        let report = manager.tick(&mut sup, &policy, at(base, 12)).await.unwrap();
        assert_eq!(report.kept.len(), 1);
        assert!(report.kept[0].starts_with(&policy.hdd_dir));
        assert!(report.kept[0].exists());

        // Segments started after the alert are not retained
        let newest = manager.active().last().unwrap();
        assert_eq!(newest.number, 3);
        assert!(!newest.retain);
        assert!(manager.active()[0].retain);
    }

    #[tokio::test(start_paused = true)]
    async fn test_force_save_keeps_everything() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, true);
        let (mut manager, mut sup) = setup(&[5001, 5002, 5003, 5004]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        let report = manager.tick(&mut sup, &policy, at(base, 12)).await.unwrap();
        assert_eq!(report.kept.len(), 1);
        assert!(report.discarded.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_released_before_reuse() {
        let dir = TempDir::new().unwrap();
        let policy = SegmentPolicy {
            period: Duration::from_secs(5),
            duration: Duration::from_secs(5),
            ..policy(&dir, false)
        };
        let (mut manager, mut sup) = setup(&[5001]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        assert_eq!(manager.ports().available(), 0);

        // Finalize frees 5001, which the next segment takes in the same tick
        let report = manager.tick(&mut sup, &policy, at(base, 5)).await.unwrap();
        assert_eq!(report.started, Some(2));
        assert_eq!(manager.active()[0].port, 5001);
        assert_eq!(
            sup.launcher().events(),
            vec![
                "launch file-save-1",
                "interrupt file-save-1",
                "launch file-save-2"
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_port_exhaustion_is_fatal() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001, 5002]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        manager.tick(&mut sup, &policy, at(base, 5)).await.unwrap();

        let err = manager.tick(&mut sup, &policy, at(base, 10)).await.unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(manager.active_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_failure_releases_port() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let mut manager = SegmentManager::new(
            PortPool::new([5001]),
            CommandTemplate::parse(TEMPLATE).unwrap(),
        );
        let launcher = ScriptedLauncher::new().fail_on("file-save");
        let mut sup = Supervisor::new(launcher.clone());

        let err = manager.tick(&mut sup, &policy, Instant::now()).await.unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(manager.ports().available(), 1);
        assert_eq!(manager.highest_number(), 0);

        launcher.recover("file-save");
        let report = manager.tick(&mut sup, &policy, Instant::now()).await.unwrap();
        assert_eq!(report.started, Some(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_file_not_fatal() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, true);
        let (mut manager, mut sup) = setup(&[5001, 5002, 5003, 5004]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        std::fs::remove_file(&manager.active()[0].ram_path).unwrap();

        let report = manager.tick(&mut sup, &policy, at(base, 12)).await.unwrap();
        assert!(report.kept.is_empty());
        assert_eq!(manager.ports().available(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_finalize_all() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001, 5002, 5003, 5004]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        manager.tick(&mut sup, &policy, at(base, 5)).await.unwrap();
        manager.flag_retain();

        let report = manager.finalize_all(&mut sup, &policy).await;
        assert_eq!(report.kept.len(), 2);
        assert_eq!(manager.active_count(), 0);
        assert_eq!(manager.ports().available(), 4);
        assert!(sup.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot() {
        let dir = TempDir::new().unwrap();
        let policy = policy(&dir, false);
        let (mut manager, mut sup) = setup(&[5001]);
        let base = Instant::now();

        manager.tick(&mut sup, &policy, base).await.unwrap();
        let snapshot = manager.snapshot(at(base, 3));
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].name, "file-save-1");
        assert_eq!(snapshot[0].age_secs, 3.0);
    }
}
