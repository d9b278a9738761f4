//! Worker processes and the launcher that spawns them.
//!
//! The supervisor only talks to [`WorkerProcess`] and [`WorkerLauncher`], so
//! the same termination logic drives OS processes and in-memory test doubles.

use std::process::Stdio;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, warn};

use crate::command::{resolve_program, InterruptMode, WorkerCommand};
use crate::error::{MediaError, MediaResult};

/// Exit information of a finished worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerExit {
    /// Exit code, `None` when ended by a signal
    pub code: Option<i32>,
}

impl WorkerExit {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }
}

/// A running worker.
pub trait WorkerProcess: Send {
    /// OS process id, when there is one.
    fn id(&self) -> Option<u32>;

    /// Ask the worker to flush its output and exit.
    fn interrupt(&mut self) -> MediaResult<()>;

    /// Non-blocking exit check.
    fn try_wait(&mut self) -> MediaResult<Option<WorkerExit>>;

    /// Forcibly end the worker. Must not block.
    fn kill(&mut self) -> MediaResult<()>;
}

/// Spawns worker processes.
pub trait WorkerLauncher: Send {
    fn launch(&mut self, name: &str, command: &WorkerCommand)
        -> MediaResult<Box<dyn WorkerProcess>>;
}

/// Launcher for OS processes via `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct CommandLauncher;

impl CommandLauncher {
    pub fn new() -> Self {
        Self
    }
}

impl WorkerLauncher for CommandLauncher {
    fn launch(
        &mut self,
        name: &str,
        command: &WorkerCommand,
    ) -> MediaResult<Box<dyn WorkerProcess>> {
        resolve_program(command.program())?;
        debug!(worker = name, "Spawning: {}", command.display());

        let mut cmd = Command::new(command.program());
        cmd.args(command.get_args())
            .envs(command.get_envs().iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        // Own process group: a terminal Ctrl+C reaches the controller only,
        // which then interrupts each worker itself
        #[cfg(unix)]
        cmd.process_group(0);

        cmd.stdin(match command.interrupt_mode() {
            InterruptMode::Stdin => Stdio::piped(),
            InterruptMode::Signal => Stdio::null(),
        });
        cmd.stdout(if command.line_sink().is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let mut child = cmd
            .spawn()
            .map_err(|e| MediaError::spawn_failed(name, e))?;

        if let (Some(sink), Some(stdout)) = (command.line_sink().cloned(), child.stdout.take()) {
            let worker = name.to_string();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stdout).lines();
                loop {
                    match lines.next_line().await {
                        Ok(Some(line)) => sink.send(&line),
                        Ok(None) => break,
                        Err(e) => {
                            warn!(worker = %worker, "Failed to read worker output: {}", e);
                            break;
                        }
                    }
                }
                debug!(worker = %worker, "Worker output closed");
            });
        }

        let stdin = child.stdin.take();
        Ok(Box::new(ChildWorker {
            child,
            stdin,
            mode: command.interrupt_mode(),
        }))
    }
}

/// An OS child process.
struct ChildWorker {
    child: Child,
    stdin: Option<ChildStdin>,
    mode: InterruptMode,
}

impl WorkerProcess for ChildWorker {
    fn id(&self) -> Option<u32> {
        self.child.id()
    }

    fn interrupt(&mut self) -> MediaResult<()> {
        match self.mode {
            InterruptMode::Signal => match self.child.id() {
                Some(pid) => send_signal(pid, Signal::Interrupt),
                // Already reaped
                None => Ok(()),
            },
            InterruptMode::Stdin => {
                if let Some(mut stdin) = self.stdin.take() {
                    tokio::spawn(async move {
                        // A worker that already exited closed the pipe; nothing to do
                        let _ = stdin.write_all(b"q\n").await;
                        let _ = stdin.shutdown().await;
                    });
                }
                Ok(())
            }
        }
    }

    fn try_wait(&mut self) -> MediaResult<Option<WorkerExit>> {
        Ok(self
            .child
            .try_wait()?
            .map(|status| WorkerExit { code: status.code() }))
    }

    fn kill(&mut self) -> MediaResult<()> {
        match self.child.start_kill() {
            Ok(()) => Ok(()),
            // Exited between the liveness check and the kill
            Err(e) if e.kind() == std::io::ErrorKind::InvalidInput => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// Signals the control process sends to other processes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Signal {
    Interrupt,
    User1,
    User2,
}

/// Deliver a signal to a process id.
#[cfg(unix)]
pub fn send_signal(pid: u32, signal: Signal) -> MediaResult<()> {
    use nix::sys::signal::{kill, Signal as UnixSignal};
    use nix::unistd::Pid;

    let signal = match signal {
        Signal::Interrupt => UnixSignal::SIGINT,
        Signal::User1 => UnixSignal::SIGUSR1,
        Signal::User2 => UnixSignal::SIGUSR2,
    };
    let pid = i32::try_from(pid)
        .map_err(|_| MediaError::invalid_command(format!("pid out of range: {pid}")))?;
    kill(Pid::from_raw(pid), signal)
        .map_err(|errno| MediaError::from(std::io::Error::from(errno)))
}

#[cfg(not(unix))]
pub fn send_signal(pid: u32, _signal: Signal) -> MediaResult<()> {
    Err(MediaError::invalid_command(format!(
        "signals are not supported on this platform (pid {pid})"
    )))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::command::LineSink;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    async fn wait_exit(process: &mut Box<dyn WorkerProcess>) -> Option<WorkerExit> {
        for _ in 0..100 {
            if let Some(exit) = process.try_wait().unwrap() {
                return Some(exit);
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        None
    }

    #[tokio::test]
    async fn test_signal_interrupt_is_cooperative() {
        let cmd = WorkerCommand::new("sh")
            .arg("-c")
            .arg("trap 'exit 3' INT; while true; do sleep 0.05; done");
        let mut process = CommandLauncher::new().launch("trap", &cmd).unwrap();
        assert!(process.id().is_some());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(process.try_wait().unwrap().is_none());

        process.interrupt().unwrap();
        let exit = wait_exit(&mut process).await.expect("worker should exit");
        assert_eq!(exit.code, Some(3));
    }

    #[tokio::test]
    async fn test_stdin_interrupt() {
        let cmd = WorkerCommand::new("sh")
            .arg("-c")
            .arg("read line; [ \"$line\" = q ] && exit 0; exit 1")
            .interrupt(InterruptMode::Stdin);
        let mut process = CommandLauncher::new().launch("reader", &cmd).unwrap();

        process.interrupt().unwrap();
        let exit = wait_exit(&mut process).await.expect("worker should exit");
        assert!(exit.success());
    }

    #[tokio::test]
    async fn test_kill_ends_worker() {
        let cmd = WorkerCommand::new("sleep").arg("30");
        let mut process = CommandLauncher::new().launch("sleeper", &cmd).unwrap();

        process.kill().unwrap();
        let exit = wait_exit(&mut process).await.expect("worker should exit");
        assert_eq!(exit.code, None);
    }

    #[tokio::test]
    async fn test_stdout_lines_reach_sink() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let lines_clone = Arc::clone(&lines);
        let cmd = WorkerCommand::new("sh")
            .arg("-c")
            .arg("echo one; echo two")
            .stdout_lines(LineSink::new(move |l| {
                lines_clone.lock().unwrap().push(l.to_string())
            }));
        let mut process = CommandLauncher::new().launch("echo", &cmd).unwrap();
        wait_exit(&mut process).await.expect("worker should exit");

        for _ in 0..50 {
            if lines.lock().unwrap().len() == 2 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(lines.lock().unwrap().as_slice(), &["one", "two"]);
    }

    #[test]
    fn test_missing_program_rejected() {
        let cmd = WorkerCommand::new("railcam-no-such-program");
        let err = tokio_test::block_on(async { CommandLauncher::new().launch("x", &cmd) })
            .err()
            .unwrap();
        assert!(matches!(err, MediaError::ProgramNotFound(_)));
    }
}
