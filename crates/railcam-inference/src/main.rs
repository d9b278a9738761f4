//! Inference worker binary.
//!
//! Usage: `railcam-inference <input> [output]`. Protocol messages go to
//! stdout, logs to stderr.

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use railcam_inference::{BridgeSummary, InferenceBridge, InferenceConfig, InferenceResult};
use railcam_media::{CommandLauncher, CommandTemplate, LineSink, Supervisor};

const PIPELINE_WORKER: &str = "pipeline";

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let use_json = std::env::var("LOG_FORMAT")
        .map(|v| v.to_lowercase() == "json")
        .unwrap_or(false);
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("railcam=info"));

    if use_json {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(env_filter)
            .init();
    }

    let config = InferenceConfig::from_env().with_args(std::env::args().skip(1));
    if let Err(e) = config.validate() {
        error!("Invalid inference configuration: {}", e);
        std::process::exit(2);
    }
    info!(input = %config.input, "Starting railcam-inference");

    match run(config).await {
        Ok(summary) => info!(
            frames = summary.frames,
            statistics = summary.statistics,
            grass_events = summary.grass_events,
            "Inference worker stopped"
        ),
        Err(e) => {
            error!("Inference worker failed: {}", e);
            std::process::exit(1);
        }
    }
}

async fn run(config: InferenceConfig) -> InferenceResult<BridgeSummary> {
    let (tx, mut rx) = mpsc::channel(config.frame_buffer.max(1));
    let mut bridge = InferenceBridge::new(&config);
    let mut stdout = tokio::io::stdout();

    let Some(pipeline) = config.pipeline.as_deref() else {
        tokio::spawn(read_stdin(tx));
        return bridge.run(&mut rx, &mut stdout, shutdown_signal()).await;
    };

    let output = config
        .output
        .as_ref()
        .map(|p| p.to_string_lossy().into_owned())
        .unwrap_or_default();
    let command = CommandTemplate::parse(pipeline)?
        .render(&[("input", config.input.as_str()), ("output", output.as_str())])
        .stdout_lines(LineSink::new(move |line| {
            if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(line.to_string()) {
                warn!("Frame buffer full, dropping pipeline output");
            }
        }));

    let mut supervisor =
        Supervisor::new(CommandLauncher::new()).with_grace_period(config.pipeline_grace);
    supervisor.start(PIPELINE_WORKER, &command)?;
    // The reader task holds the only remaining sender
    drop(command);

    let summary = bridge.run(&mut rx, &mut stdout, shutdown_signal()).await;

    match supervisor.terminate(PIPELINE_WORKER, false).await {
        Ok(outcome) => info!(?outcome, "Pipeline stopped"),
        Err(e) => warn!("Failed to stop pipeline: {}", e),
    }
    summary
}

async fn read_stdin(tx: mpsc::Sender<String>) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if tx.send(line).await.is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read frames from stdin: {}", e);
                break;
            }
        }
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("Failed to install SIGTERM handler: {}", e);
                tokio::signal::ctrl_c().await.ok();
            }
        }
    }
    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await.ok();
    }
}
