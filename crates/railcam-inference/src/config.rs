//! Inference worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use railcam_media::DEFAULT_GRACE_PERIOD;

use crate::error::{InferenceError, InferenceResult};
use crate::votes::VotePolicy;

/// Inference worker configuration.
#[derive(Debug, Clone)]
pub struct InferenceConfig {
    /// Input URI handed to the pipeline
    pub input: String,
    /// File the pipeline writes annotated output to (file inputs)
    pub output: Option<PathBuf>,
    /// Pipeline command line with `{input}` and `{output}` placeholders;
    /// frames are read from stdin when unset
    pub pipeline: Option<String>,
    /// Reporting window length
    pub statistics_period: Duration,
    /// Feed the grass signal into the presence monitor
    pub grass_detection: bool,
    /// Hysteresis threshold in frames
    pub grass_frame_threshold: u32,
    pub votes: VotePolicy,
    /// Upper bound on tracked identities (unbounded when unset)
    pub track_capacity: Option<usize>,
    /// Pipeline lines buffered before frames are dropped
    pub frame_buffer: usize,
    /// Grace the control process gives this worker before killing it
    pub worker_grace: Duration,
    /// Grace period for the pipeline after an interrupt; must end before
    /// `worker_grace` so the pipeline is reaped before this process is killed
    pub pipeline_grace: Duration,
}

/// Upper bound on the time kept between the pipeline's grace and ours.
pub const PIPELINE_GRACE_MARGIN: Duration = Duration::from_secs(2);

/// Margin between the pipeline grace and the worker grace.
pub fn pipeline_grace_margin(worker_grace: Duration) -> Duration {
    PIPELINE_GRACE_MARGIN.min(worker_grace / 2)
}

/// Longest pipeline grace that still ends inside `worker_grace`.
pub fn default_pipeline_grace(worker_grace: Duration) -> Duration {
    worker_grace.saturating_sub(pipeline_grace_margin(worker_grace))
}

impl Default for InferenceConfig {
    fn default() -> Self {
        Self {
            input: String::new(),
            output: None,
            pipeline: None,
            statistics_period: Duration::from_secs(15),
            grass_detection: true,
            grass_frame_threshold: 100,
            votes: VotePolicy::default(),
            track_capacity: None,
            frame_buffer: 1024,
            worker_grace: DEFAULT_GRACE_PERIOD,
            pipeline_grace: default_pipeline_grace(DEFAULT_GRACE_PERIOD),
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

impl InferenceConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let vote_defaults = VotePolicy::default();
        let worker_grace = env_parse("RAILCAM_WORKER_GRACE_SECS")
            .map(Duration::from_secs)
            .unwrap_or(defaults.worker_grace);
        Self {
            input: std::env::var("RAILCAM_INPUT").unwrap_or_default(),
            output: std::env::var("RAILCAM_OUTPUT").ok().map(PathBuf::from),
            pipeline: std::env::var("RAILCAM_PIPELINE_COMMAND")
                .ok()
                .filter(|s| !s.trim().is_empty()),
            statistics_period: Duration::from_secs(
                env_parse("RAILCAM_STATISTICS_PERIOD_SECS")
                    .unwrap_or(defaults.statistics_period.as_secs()),
            ),
            grass_detection: env_flag("RAILCAM_GRASS_DETECTION")
                .unwrap_or(defaults.grass_detection),
            grass_frame_threshold: env_parse("RAILCAM_GRASS_FRAME_THRESHOLD")
                .unwrap_or(defaults.grass_frame_threshold),
            votes: VotePolicy {
                enabled: env_flag("RAILCAM_VOTE_ENABLED").unwrap_or(vote_defaults.enabled),
                vote_threshold: env_parse("RAILCAM_VOTE_THRESHOLD")
                    .unwrap_or(vote_defaults.vote_threshold),
                defective_label: std::env::var("RAILCAM_DEFECTIVE_LABEL")
                    .unwrap_or(vote_defaults.defective_label),
                non_defective_label: std::env::var("RAILCAM_NON_DEFECTIVE_LABEL")
                    .unwrap_or(vote_defaults.non_defective_label),
                min_votes: env_parse("RAILCAM_VOTE_MIN").unwrap_or(vote_defaults.min_votes),
                max_votes: env_parse("RAILCAM_VOTE_MAX").unwrap_or(vote_defaults.max_votes),
            },
            track_capacity: env_parse("RAILCAM_TRACK_CAPACITY"),
            frame_buffer: env_parse("RAILCAM_FRAME_BUFFER").unwrap_or(defaults.frame_buffer),
            worker_grace,
            pipeline_grace: env_parse("RAILCAM_PIPELINE_GRACE_SECS")
                .map(Duration::from_secs)
                .unwrap_or_else(|| default_pipeline_grace(worker_grace)),
        }
    }

    /// Apply positional arguments: `<input> [output]`.
    pub fn with_args<I>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        let mut args = args.into_iter();
        if let Some(input) = args.next() {
            self.input = input;
        }
        if let Some(output) = args.next() {
            self.output = Some(PathBuf::from(output));
        }
        self
    }

    pub fn validate(&self) -> InferenceResult<()> {
        if self.pipeline.is_some() && self.input.is_empty() {
            return Err(InferenceError::invalid_config(
                "an input URI is required when a pipeline command is configured",
            ));
        }
        if self.statistics_period.is_zero() {
            return Err(InferenceError::invalid_config(
                "statistics period must be positive",
            ));
        }
        if self.grass_frame_threshold == 0 {
            return Err(InferenceError::invalid_config(
                "grass frame threshold must be positive",
            ));
        }
        if self.votes.min_votes < 1 || self.votes.max_votes < self.votes.min_votes {
            return Err(InferenceError::invalid_config(format!(
                "vote bounds must satisfy 1 <= min ({}) <= max ({})",
                self.votes.min_votes, self.votes.max_votes
            )));
        }
        let margin = pipeline_grace_margin(self.worker_grace);
        if self.pipeline_grace + margin > self.worker_grace {
            return Err(InferenceError::invalid_config(format!(
                "pipeline grace {:?} must end at least {:?} before the worker grace {:?}",
                self.pipeline_grace, margin, self.worker_grace
            )));
        }
        Ok(())
    }
}
