//! Signal a running `railcam-run`.
//!
//! Usage: `railcam-trigger [stop|save|status]` (default `stop`). The target is
//! the pid file in `RAILCAM_PID_DIR` (or the temp directory) whose timestamp
//! is closest to now.

use std::path::PathBuf;

use anyhow::{anyhow, bail, Context};
use chrono::Utc;

use railcam_media::{send_signal, Signal};
use railcam_worker::{find_closest, read_pid};

fn main() -> anyhow::Result<()> {
    let action = std::env::args().nth(1).unwrap_or_else(|| "stop".to_string());
    let signal = match action.as_str() {
        "stop" => Signal::Interrupt,
        "save" => Signal::User1,
        "status" => Signal::User2,
        other => bail!("unknown action {other:?}, expected stop, save or status"),
    };

    let dir = std::env::var("RAILCAM_PID_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| std::env::temp_dir());
    let path = find_closest(&dir, Utc::now())
        .with_context(|| format!("cannot scan {}", dir.display()))?
        .ok_or_else(|| anyhow!("no railcam_run_*.pid file in {}", dir.display()))?;
    let pid = read_pid(&path)?;

    send_signal(pid, signal).with_context(|| format!("cannot signal process {pid}"))?;
    println!("railcam-trigger: sent {action} to {pid} ({})", path.display());
    Ok(())
}
