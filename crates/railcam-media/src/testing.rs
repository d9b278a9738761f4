//! Scripted in-memory workers.
//!
//! `ScriptedLauncher` records every launch, interrupt and kill, and lets a
//! test decide per worker name (or name prefix) how the worker reacts to an
//! interrupt. Workers with an output path create that file on launch, like a
//! recorder opening its container.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use crate::command::WorkerCommand;
use crate::error::{MediaError, MediaResult};
use crate::process::{WorkerExit, WorkerLauncher, WorkerProcess};

/// How a scripted worker reacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    /// Exits with code 0 once interrupted.
    Cooperative,
    /// Only a kill ends it.
    IgnoresInterrupt,
    /// Exits with the given code right after launch.
    ExitsOnStart(i32),
}

#[derive(Default)]
struct Script {
    behaviours: Vec<(String, Behaviour)>,
    failing: Vec<String>,
    events: Vec<String>,
    launches: HashMap<String, usize>,
    commands: HashMap<String, WorkerCommand>,
    exits: HashMap<String, Arc<Mutex<Option<WorkerExit>>>>,
    next_pid: u32,
}

impl Script {
    fn behaviour_for(&self, name: &str) -> Behaviour {
        self.behaviours
            .iter()
            .rev()
            .find(|(prefix, _)| name.starts_with(prefix.as_str()))
            .map(|(_, b)| *b)
            .unwrap_or(Behaviour::Cooperative)
    }
}

/// Launcher whose workers live in memory. Clones share state.
#[derive(Clone, Default)]
pub struct ScriptedLauncher {
    script: Arc<Mutex<Script>>,
}

impl ScriptedLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the behaviour of workers whose name starts with `prefix`.
    pub fn behaviour(self, prefix: &str, behaviour: Behaviour) -> Self {
        self.lock().behaviours.push((prefix.to_string(), behaviour));
        self
    }

    /// Make launches of workers whose name starts with `prefix` fail.
    pub fn fail_on(self, prefix: &str) -> Self {
        self.lock().failing.push(prefix.to_string());
        self
    }

    /// Stop failing launches for `prefix`.
    pub fn recover(&self, prefix: &str) {
        self.lock().failing.retain(|p| p != prefix);
    }

    /// End the most recent worker called `name` with an exit code.
    pub fn crash(&self, name: &str, code: i32) {
        if let Some(exit) = self.lock().exits.get(name) {
            *lock(exit) = Some(WorkerExit { code: Some(code) });
        }
    }

    /// Recorded `launch`, `interrupt` and `kill` events, in order.
    pub fn events(&self) -> Vec<String> {
        self.lock().events.clone()
    }

    pub fn launch_count(&self, name: &str) -> usize {
        self.lock().launches.get(name).copied().unwrap_or_default()
    }

    /// Command of the most recent launch of `name`.
    pub fn last_command(&self, name: &str) -> Option<WorkerCommand> {
        self.lock().commands.get(name).cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Script> {
        lock(&self.script)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl WorkerLauncher for ScriptedLauncher {
    fn launch(
        &mut self,
        name: &str,
        command: &WorkerCommand,
    ) -> MediaResult<Box<dyn WorkerProcess>> {
        let mut script = self.lock();
        if script.failing.iter().any(|p| name.starts_with(p.as_str())) {
            return Err(MediaError::spawn_failed(
                name,
                std::io::Error::new(std::io::ErrorKind::NotFound, "scripted failure"),
            ));
        }

        if let Some(path) = command.output_path() {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::write(path, name.as_bytes())?;
        }

        let behaviour = script.behaviour_for(name);
        let exit = Arc::new(Mutex::new(match behaviour {
            Behaviour::ExitsOnStart(code) => Some(WorkerExit { code: Some(code) }),
            _ => None,
        }));

        script.next_pid += 1;
        let pid = 1000 + script.next_pid;
        script.events.push(format!("launch {name}"));
        *script.launches.entry(name.to_string()).or_default() += 1;
        script.commands.insert(name.to_string(), command.clone());
        script.exits.insert(name.to_string(), Arc::clone(&exit));

        Ok(Box::new(ScriptedProcess {
            name: name.to_string(),
            pid,
            behaviour,
            interrupted: false,
            exit,
            script: Arc::clone(&self.script),
        }))
    }
}

struct ScriptedProcess {
    name: String,
    pid: u32,
    behaviour: Behaviour,
    interrupted: bool,
    exit: Arc<Mutex<Option<WorkerExit>>>,
    script: Arc<Mutex<Script>>,
}

impl WorkerProcess for ScriptedProcess {
    fn id(&self) -> Option<u32> {
        Some(self.pid)
    }

    fn interrupt(&mut self) -> MediaResult<()> {
        self.interrupted = true;
        lock(&self.script)
            .events
            .push(format!("interrupt {}", self.name));
        Ok(())
    }

    fn try_wait(&mut self) -> MediaResult<Option<WorkerExit>> {
        let mut exit = lock(&self.exit);
        if exit.is_none() && self.interrupted && self.behaviour == Behaviour::Cooperative {
            *exit = Some(WorkerExit { code: Some(0) });
        }
        Ok(*exit)
    }

    fn kill(&mut self) -> MediaResult<()> {
        lock(&self.script).events.push(format!("kill {}", self.name));
        *lock(&self.exit) = Some(WorkerExit { code: None });
        Ok(())
    }
}
