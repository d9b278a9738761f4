//! Process id file for external triggers.
//!
//! `railcam-run` writes its pid to `railcam_run_{YYYYmmdd_HHMMSS}.pid` in the
//! pid directory. `railcam-trigger` picks the file whose timestamp is closest
//! to now.

use std::path::{Path, PathBuf};

use chrono::{DateTime, NaiveDateTime, Utc};
use tracing::{debug, warn};

use crate::error::{WorkerError, WorkerResult};

pub const PID_FILE_PREFIX: &str = "railcam_run_";
const PID_FILE_SUFFIX: &str = ".pid";
const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub fn pid_file_name(started: DateTime<Utc>) -> String {
    format!(
        "{PID_FILE_PREFIX}{}{PID_FILE_SUFFIX}",
        started.format(TIMESTAMP_FORMAT)
    )
}

/// Start time encoded in a pid file name.
pub fn parse_pid_file_name(name: &str) -> Option<DateTime<Utc>> {
    let stamp = name
        .strip_prefix(PID_FILE_PREFIX)?
        .strip_suffix(PID_FILE_SUFFIX)?;
    NaiveDateTime::parse_from_str(stamp, TIMESTAMP_FORMAT)
        .ok()
        .map(|t| t.and_utc())
}

/// The pid file of the running process. Removed on drop.
#[derive(Debug)]
pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(dir: impl AsRef<Path>, started: DateTime<Utc>) -> WorkerResult<Self> {
        let dir = dir.as_ref();
        std::fs::create_dir_all(dir)?;
        let path = dir.join(pid_file_name(started));
        std::fs::write(&path, std::process::id().to_string())?;
        debug!(path = %path.display(), "Pid file written");
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        if let Err(e) = std::fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), "Failed to remove pid file: {}", e);
        }
    }
}

/// Pid file in `dir` whose timestamp is closest to `now`.
pub fn find_closest(dir: impl AsRef<Path>, now: DateTime<Utc>) -> WorkerResult<Option<PathBuf>> {
    let mut best: Option<(i64, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(started) = parse_pid_file_name(&name.to_string_lossy()) else {
            continue;
        };
        let distance = (now - started).num_seconds().abs();
        if best.as_ref().map_or(true, |(d, _)| distance < *d) {
            best = Some((distance, entry.path()));
        }
    }
    Ok(best.map(|(_, path)| path))
}

pub fn read_pid(path: impl AsRef<Path>) -> WorkerResult<u32> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)?;
    contents.trim().parse().map_err(|_| {
        WorkerError::invalid_pid_file(format!(
            "{}: {:?} is not a process id",
            path.display(),
            contents.trim()
        ))
    })
}
