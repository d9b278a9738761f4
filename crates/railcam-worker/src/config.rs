//! Control process configuration.

use std::path::{Path, PathBuf};
use std::time::Duration;

use railcam_media::{
    CommandTemplate, InterruptMode, PortPool, SegmentPolicy, DEFAULT_GRACE_PERIOD,
};
use tracing::info;

use crate::alerting::AlertThresholds;
use crate::error::{WorkerError, WorkerResult};

/// Environment variables read by [`RunConfig::from_env`].
pub const ENV_VARS: &[&str] = &[
    "RAILCAM_INPUT",
    "RAILCAM_INFERENCE_COMMAND",
    "RAILCAM_STREAMING_COMMAND",
    "RAILCAM_FILESERVER_COMMAND",
    "RAILCAM_FILESAVE_COMMAND",
    "RAILCAM_FILESAVE_INTERRUPT",
    "RAILCAM_SERIAL_COMMAND",
    "RAILCAM_STREAMING_START_DEFAULT",
    "RAILCAM_STREAMING_PORT",
    "RAILCAM_FILESERVER_ENABLED",
    "RAILCAM_FILESERVER_PORT",
    "RAILCAM_FORCE_SAVE",
    "RAILCAM_VIDEO_PERIOD_SECS",
    "RAILCAM_VIDEO_DURATION_SECS",
    "RAILCAM_RAM_DIR",
    "RAILCAM_HDD_DIR",
    "RAILCAM_UDP_PORTS",
    "RAILCAM_STATISTICS_DIR",
    "RAILCAM_STATISTICS_FLUSH_SECS",
    "RAILCAM_ALERT_MAX_TOTAL_TRACKS",
    "RAILCAM_ALERT_MIN_VISIBLE_TRACKS",
    "RAILCAM_ALERT_MAX_DEFECTIVE_FRACTION",
    "RAILCAM_INFERENCE_RESTART_SECS",
    "RAILCAM_POLL_INTERVAL_MS",
    "RAILCAM_WORKER_GRACE_SECS",
    "RAILCAM_STATISTICS_QUEUE",
    "RAILCAM_GRASS_QUEUE",
    "RAILCAM_PID_DIR",
    "RAILCAM_METRICS_PORT",
];

/// URI schemes of live camera inputs.
const LIVE_SCHEMES: &[&str] = &["v4l2://", "argus://"];

/// Control process configuration.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Input URI handed to the inference worker
    pub input: String,
    /// Inference worker command with `{input}` and `{output}` placeholders
    pub inference_command: String,
    /// Streaming worker command with a `{port}` placeholder
    pub streaming_command: String,
    /// File server command with `{port}` and `{dir}` placeholders
    pub fileserver_command: String,
    /// Segment recorder command with `{port}`, `{output}` and `{dir}` placeholders
    pub filesave_command: String,
    /// How segment recorders are stopped: `signal` (SIGINT) or `stdin` (`q`)
    pub filesave_interrupt: String,
    /// Serial capture command with a `{dir}` placeholder; not started when unset
    pub serial_command: Option<String>,
    /// Enqueue `streaming_start` at startup
    pub streaming_start_default: bool,
    pub streaming_port: u16,
    /// Serve the HDD directory and rotate segments (live input only)
    pub fileserver_enabled: bool,
    pub fileserver_port: u16,
    /// Keep every segment, alert or not
    pub force_save: bool,
    /// Time between segment starts
    pub video_period: Duration,
    /// Length of one segment
    pub video_duration: Duration,
    pub ram_dir: PathBuf,
    pub hdd_dir: PathBuf,
    /// Comma-separated UDP ports for segment recorders
    pub udp_ports: String,
    pub statistics_dir: PathBuf,
    /// Time between statistics and grass event flushes
    pub statistics_flush_period: Duration,
    pub alerts: AlertThresholds,
    /// Restart the inference worker after this uptime (live input only)
    pub inference_restart_timeout: Option<Duration>,
    /// Idle wait of the control loop
    pub poll_interval: Duration,
    /// Grace period between interrupt and kill
    pub grace_period: Duration,
    pub statistics_queue_capacity: usize,
    pub grass_queue_capacity: usize,
    /// Directory holding the pid file
    pub pid_dir: PathBuf,
    /// Serve Prometheus metrics on this port
    pub metrics_port: Option<u16>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            input: "v4l2:///dev/video0".to_string(),
            inference_command: "railcam-inference {input} {output}".to_string(),
            streaming_command: "gst-launch-1.0 -e udpsrc port=5400 ! application/x-rtp,encoding-name=H264 ! rtph264depay ! h264parse ! rtph264pay ! udpsink host=127.0.0.1 port={port}".to_string(),
            fileserver_command: "python3 -m http.server {port} --directory {dir}".to_string(),
            filesave_command: "gst-launch-1.0 -e udpsrc port={port} ! application/x-rtp,encoding-name=H264 ! rtph264depay ! h264parse ! mp4mux ! filesink location={output}".to_string(),
            filesave_interrupt: "signal".to_string(),
            serial_command: None,
            streaming_start_default: true,
            streaming_port: 8554,
            fileserver_enabled: true,
            fileserver_port: 8080,
            force_save: false,
            video_period: Duration::from_secs(30),
            video_duration: Duration::from_secs(40),
            ram_dir: PathBuf::from("/dev/shm/railcam"),
            hdd_dir: PathBuf::from("/var/lib/railcam/videos"),
            udp_ports: "5001,5002,5003".to_string(),
            statistics_dir: PathBuf::from("/var/lib/railcam/statistics"),
            statistics_flush_period: Duration::from_secs(15),
            alerts: AlertThresholds::default(),
            inference_restart_timeout: None,
            poll_interval: Duration::from_millis(100),
            grace_period: DEFAULT_GRACE_PERIOD,
            statistics_queue_capacity: 5,
            grass_queue_capacity: 20,
            pid_dir: std::env::temp_dir(),
            metrics_port: None,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

fn env_flag(key: &str) -> Option<bool> {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
}

fn env_string(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|s| !s.trim().is_empty())
}

fn env_secs(key: &str) -> Option<Duration> {
    env_parse(key).map(Duration::from_secs)
}

impl RunConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let alert_defaults = AlertThresholds::default();
        Self {
            input: env_string("RAILCAM_INPUT").unwrap_or(defaults.input),
            inference_command: env_string("RAILCAM_INFERENCE_COMMAND")
                .unwrap_or(defaults.inference_command),
            streaming_command: env_string("RAILCAM_STREAMING_COMMAND")
                .unwrap_or(defaults.streaming_command),
            fileserver_command: env_string("RAILCAM_FILESERVER_COMMAND")
                .unwrap_or(defaults.fileserver_command),
            filesave_command: env_string("RAILCAM_FILESAVE_COMMAND")
                .unwrap_or(defaults.filesave_command),
            filesave_interrupt: env_string("RAILCAM_FILESAVE_INTERRUPT")
                .unwrap_or(defaults.filesave_interrupt),
            serial_command: env_string("RAILCAM_SERIAL_COMMAND"),
            streaming_start_default: env_flag("RAILCAM_STREAMING_START_DEFAULT")
                .unwrap_or(defaults.streaming_start_default),
            streaming_port: env_parse("RAILCAM_STREAMING_PORT").unwrap_or(defaults.streaming_port),
            fileserver_enabled: env_flag("RAILCAM_FILESERVER_ENABLED")
                .unwrap_or(defaults.fileserver_enabled),
            fileserver_port: env_parse("RAILCAM_FILESERVER_PORT")
                .unwrap_or(defaults.fileserver_port),
            force_save: env_flag("RAILCAM_FORCE_SAVE").unwrap_or(defaults.force_save),
            video_period: env_secs("RAILCAM_VIDEO_PERIOD_SECS").unwrap_or(defaults.video_period),
            video_duration: env_secs("RAILCAM_VIDEO_DURATION_SECS")
                .unwrap_or(defaults.video_duration),
            ram_dir: env_string("RAILCAM_RAM_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.ram_dir),
            hdd_dir: env_string("RAILCAM_HDD_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.hdd_dir),
            udp_ports: env_string("RAILCAM_UDP_PORTS").unwrap_or(defaults.udp_ports),
            statistics_dir: env_string("RAILCAM_STATISTICS_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.statistics_dir),
            statistics_flush_period: env_secs("RAILCAM_STATISTICS_FLUSH_SECS")
                .unwrap_or(defaults.statistics_flush_period),
            alerts: AlertThresholds {
                max_total_tracks: env_parse("RAILCAM_ALERT_MAX_TOTAL_TRACKS")
                    .unwrap_or(alert_defaults.max_total_tracks),
                min_visible_tracks: env_parse("RAILCAM_ALERT_MIN_VISIBLE_TRACKS")
                    .unwrap_or(alert_defaults.min_visible_tracks),
                max_defective_fraction: env_parse("RAILCAM_ALERT_MAX_DEFECTIVE_FRACTION")
                    .unwrap_or(alert_defaults.max_defective_fraction),
            },
            // 0 disables
            inference_restart_timeout: env_secs("RAILCAM_INFERENCE_RESTART_SECS")
                .filter(|d| !d.is_zero()),
            poll_interval: env_parse("RAILCAM_POLL_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.poll_interval),
            grace_period: env_secs("RAILCAM_WORKER_GRACE_SECS").unwrap_or(defaults.grace_period),
            statistics_queue_capacity: env_parse("RAILCAM_STATISTICS_QUEUE")
                .unwrap_or(defaults.statistics_queue_capacity),
            grass_queue_capacity: env_parse("RAILCAM_GRASS_QUEUE")
                .unwrap_or(defaults.grass_queue_capacity),
            pid_dir: env_string("RAILCAM_PID_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.pid_dir),
            metrics_port: env_parse("RAILCAM_METRICS_PORT"),
        }
    }

    /// Apply the optional positional input argument.
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        if let Some(input) = args.into_iter().next() {
            self.input = input;
        }
        self
    }

    /// Log every configuration variable set in the environment.
    pub fn log_overrides(&self) {
        for key in ENV_VARS {
            if let Ok(value) = std::env::var(key) {
                info!(variable = key, value = %value, "Configuration override");
            }
        }
    }

    /// Camera input, as opposed to a recorded file.
    pub fn is_live_input(&self) -> bool {
        LIVE_SCHEMES.iter().any(|scheme| self.input.starts_with(scheme))
    }

    /// Annotated output written by the inference worker for file inputs:
    /// `output_{file name}` in the working directory.
    pub fn inference_output(&self) -> Option<PathBuf> {
        if self.is_live_input() {
            return None;
        }
        let path = self.input.strip_prefix("file://").unwrap_or(&self.input);
        let name = Path::new(path).file_name()?;
        Some(PathBuf::from(format!("output_{}", name.to_string_lossy())))
    }

    pub fn segment_policy(&self) -> SegmentPolicy {
        SegmentPolicy {
            period: self.video_period,
            duration: self.video_duration,
            ram_dir: self.ram_dir.clone(),
            hdd_dir: self.hdd_dir.clone(),
            force_save: self.force_save,
        }
    }

    /// Segment recorder template with its interrupt mode applied.
    pub fn filesave_template(&self) -> WorkerResult<CommandTemplate> {
        let mode = InterruptMode::parse(&self.filesave_interrupt).ok_or_else(|| {
            WorkerError::config_error(format!(
                "unknown file save interrupt mode {:?}, expected signal or stdin",
                self.filesave_interrupt
            ))
        })?;
        Ok(CommandTemplate::parse(&self.filesave_command)?.with_interrupt(mode))
    }

    pub fn port_pool(&self) -> WorkerResult<PortPool> {
        Ok(PortPool::parse(&self.udp_ports)?)
    }

    /// Reject impossible combinations.
    pub fn validate(&self) -> WorkerResult<()> {
        if self.input.trim().is_empty() {
            return Err(WorkerError::config_error("an input URI is required"));
        }
        if self.video_period.is_zero() || self.video_duration.is_zero() {
            return Err(WorkerError::config_error(
                "video period and duration must be positive",
            ));
        }
        if self.statistics_flush_period.is_zero() || self.poll_interval.is_zero() {
            return Err(WorkerError::config_error(
                "flush period and poll interval must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.alerts.max_defective_fraction) {
            return Err(WorkerError::config_error(format!(
                "max defective fraction {} is outside [0, 1]",
                self.alerts.max_defective_fraction
            )));
        }
        if self.statistics_queue_capacity == 0 || self.grass_queue_capacity == 0 {
            return Err(WorkerError::config_error("queue capacities must be positive"));
        }

        for line in [
            &self.inference_command,
            &self.streaming_command,
            &self.fileserver_command,
        ]
        .into_iter()
        .chain(self.serial_command.as_ref())
        {
            CommandTemplate::parse(line)?;
        }
        self.filesave_template()?;

        let pool = self.port_pool()?;
        let required = self.segment_policy().required_ports();
        if pool.len() < required {
            return Err(WorkerError::config_error(format!(
                "{} UDP ports configured, {} needed for a {}s period and {}s segments",
                pool.len(),
                required,
                self.video_period.as_secs(),
                self.video_duration.as_secs()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        let config = RunConfig::default();
        assert!(config.validate().is_ok());
        assert!(config.is_live_input());
        assert_eq!(config.inference_output(), None);
    }

    #[test]
    fn test_file_input_output_name() {
        let config = RunConfig::default().with_args(vec!["file:///videos/run1.mp4".to_string()]);
        assert!(!config.is_live_input());
        assert_eq!(config.inference_output(), Some(PathBuf::from("output_run1.mp4")));

        let plain = RunConfig::default().with_args(vec!["/videos/run2.mkv".to_string()]);
        assert_eq!(plain.inference_output(), Some(PathBuf::from("output_run2.mkv")));
    }

    #[test]
    fn test_argus_is_live() {
        let config = RunConfig::default().with_args(vec!["argus://0".to_string()]);
        assert!(config.is_live_input());
    }

    #[test]
    fn test_port_pool_too_small() {
        let config = RunConfig {
            video_period: Duration::from_secs(5),
            video_duration: Duration::from_secs(12),
            udp_ports: "5001,5002,5003".to_string(),
            ..RunConfig::default()
        };
        // ceil(12 / 5) + 1 = 4
        assert!(matches!(config.validate(), Err(WorkerError::ConfigError(_))));

        let enough = RunConfig {
            udp_ports: "5001,5002,5003,5004".to_string(),
            ..config
        };
        assert!(enough.validate().is_ok());
    }

    #[test]
    fn test_fraction_out_of_range() {
        let config = RunConfig {
            alerts: AlertThresholds {
                max_defective_fraction: 1.5,
                ..AlertThresholds::default()
            },
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_period_rejected() {
        let config = RunConfig {
            video_period: Duration::ZERO,
            ..RunConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_filesave_interrupt_mode() {
        let config = RunConfig {
            filesave_interrupt: "stdin".to_string(),
            ..RunConfig::default()
        };
        let command = config.filesave_template().unwrap().render(&[]);
        assert_eq!(command.interrupt_mode(), InterruptMode::Stdin);

        let default = RunConfig::default().filesave_template().unwrap().render(&[]);
        assert_eq!(default.interrupt_mode(), InterruptMode::Signal);

        let unknown = RunConfig {
            filesave_interrupt: "sigkill".to_string(),
            ..RunConfig::default()
        };
        assert!(matches!(unknown.validate(), Err(WorkerError::ConfigError(_))));
    }

    #[test]
    fn test_bad_port_list_rejected() {
        let config = RunConfig {
            udp_ports: "5001,abc".to_string(),
            ..RunConfig::default()
        };
        assert!(matches!(config.validate(), Err(WorkerError::Media(_))));
    }
}
