//! Worker command builder and templates.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{MediaError, MediaResult};

/// How a worker is asked to stop cooperatively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InterruptMode {
    /// Deliver SIGINT to the worker's process id.
    #[default]
    Signal,
    /// Write `q` to the worker's stdin and close it.
    Stdin,
}

impl InterruptMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "signal" | "sigint" => Some(InterruptMode::Signal),
            "stdin" => Some(InterruptMode::Stdin),
            _ => None,
        }
    }
}

/// Callback receiving each stdout line of a worker.
#[derive(Clone)]
pub struct LineSink(Arc<dyn Fn(&str) + Send + Sync>);

impl LineSink {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self(Arc::new(f))
    }

    pub fn send(&self, line: &str) {
        (self.0)(line)
    }
}

impl fmt::Debug for LineSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LineSink")
    }
}

/// A fully rendered worker invocation.
#[derive(Debug, Clone)]
pub struct WorkerCommand {
    /// Program to execute
    program: String,
    /// Program arguments
    args: Vec<String>,
    /// Extra environment variables
    envs: Vec<(String, String)>,
    /// Cooperative stop mechanism
    interrupt: InterruptMode,
    /// File the worker writes, if any
    output: Option<PathBuf>,
    /// Receiver for stdout lines; stdout is discarded when unset
    stdout: Option<LineSink>,
}

impl WorkerCommand {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            interrupt: InterruptMode::default(),
            output: None,
            stdout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    pub fn interrupt(mut self, mode: InterruptMode) -> Self {
        self.interrupt = mode;
        self
    }

    pub fn output(mut self, path: impl AsRef<Path>) -> Self {
        self.output = Some(path.as_ref().to_path_buf());
        self
    }

    pub fn stdout_lines(mut self, sink: LineSink) -> Self {
        self.stdout = Some(sink);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_envs(&self) -> &[(String, String)] {
        &self.envs
    }

    pub fn interrupt_mode(&self) -> InterruptMode {
        self.interrupt
    }

    pub fn output_path(&self) -> Option<&Path> {
        self.output.as_deref()
    }

    pub fn line_sink(&self) -> Option<&LineSink> {
        self.stdout.as_ref()
    }

    /// Command line for logs.
    pub fn display(&self) -> String {
        if self.args.is_empty() {
            self.program.clone()
        } else {
            format!("{} {}", self.program, self.args.join(" "))
        }
    }
}

/// A configured command line with `{name}` placeholders.
///
/// Tokens are separated by whitespace; placeholders are substituted per
/// token, so a rendered value never splits into several arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTemplate {
    program: String,
    args: Vec<String>,
    interrupt: InterruptMode,
}

impl CommandTemplate {
    pub fn parse(line: &str) -> MediaResult<Self> {
        let mut tokens = line.split_whitespace().map(str::to_string);
        let program = tokens
            .next()
            .ok_or_else(|| MediaError::invalid_command("empty command line"))?;
        Ok(Self {
            program,
            args: tokens.collect(),
            interrupt: InterruptMode::default(),
        })
    }

    pub fn with_interrupt(mut self, mode: InterruptMode) -> Self {
        self.interrupt = mode;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Substitute `{key}` placeholders and build a command.
    ///
    /// An argument that renders to an empty string is dropped.
    pub fn render(&self, vars: &[(&str, &str)]) -> WorkerCommand {
        let substitute = |token: &str| {
            vars.iter().fold(token.to_string(), |acc, (key, value)| {
                acc.replace(&format!("{{{key}}}"), value)
            })
        };
        WorkerCommand::new(substitute(&self.program))
            .args(
                self.args
                    .iter()
                    .map(|a| substitute(a))
                    .filter(|a| !a.is_empty()),
            )
            .interrupt(self.interrupt)
    }
}

/// Resolve a program on PATH (paths containing a separator are used as is).
pub fn resolve_program(program: &str) -> MediaResult<PathBuf> {
    if program.contains(std::path::MAIN_SEPARATOR) {
        let path = PathBuf::from(program);
        return if path.exists() {
            Ok(path)
        } else {
            Err(MediaError::ProgramNotFound(program.to_string()))
        };
    }
    which::which(program).map_err(|_| MediaError::ProgramNotFound(program.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_command_builder() {
        let cmd = WorkerCommand::new("gst-launch-1.0")
            .arg("-e")
            .args(["udpsrc", "port=5001"])
            .env("GST_DEBUG", "1")
            .output("/dev/shm/a.mp4");

        assert_eq!(cmd.program(), "gst-launch-1.0");
        assert_eq!(cmd.get_args(), &["-e", "udpsrc", "port=5001"]);
        assert_eq!(cmd.output_path(), Some(Path::new("/dev/shm/a.mp4")));
        assert_eq!(cmd.interrupt_mode(), InterruptMode::Signal);
        assert_eq!(cmd.display(), "gst-launch-1.0 -e udpsrc port=5001");
    }

    #[test]
    fn test_template_substitutes_inside_tokens() {
        let template =
            CommandTemplate::parse("gst-launch-1.0 -e udpsrc port={port} ! filesink location={output}")
                .unwrap();
        let cmd = template.render(&[("port", "5002"), ("output", "/dev/shm/x 1.mp4")]);

        assert!(cmd.get_args().contains(&"port=5002".to_string()));
        assert!(cmd.get_args().contains(&"location=/dev/shm/x 1.mp4".to_string()));
    }

    #[test]
    fn test_empty_placeholder_drops_argument() {
        let template = CommandTemplate::parse("railcam-inference {input} {output}").unwrap();
        let cmd = template.render(&[("input", "v4l2:///dev/video0"), ("output", "")]);
        assert_eq!(cmd.get_args(), &["v4l2:///dev/video0"]);
    }

    #[test]
    fn test_template_rejects_empty_line() {
        assert!(matches!(
            CommandTemplate::parse("   "),
            Err(MediaError::InvalidCommand(_))
        ));
    }

    #[test]
    fn test_template_keeps_interrupt_mode() {
        let template = CommandTemplate::parse("ffmpeg -i {input}")
            .unwrap()
            .with_interrupt(InterruptMode::Stdin);
        assert_eq!(template.render(&[]).interrupt_mode(), InterruptMode::Stdin);
    }

    #[test]
    fn test_line_sink_forwards_lines() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let sink = LineSink::new(move |line| seen_clone.lock().unwrap().push(line.to_string()));
        sink.send("hello");
        assert_eq!(seen.lock().unwrap().as_slice(), &["hello".to_string()]);
    }

    #[test]
    fn test_interrupt_mode_parse() {
        assert_eq!(InterruptMode::parse("SIGINT"), Some(InterruptMode::Signal));
        assert_eq!(InterruptMode::parse("stdin"), Some(InterruptMode::Stdin));
        assert_eq!(InterruptMode::parse("other"), None);
    }
}
