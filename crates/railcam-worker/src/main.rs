//! Control process binary.
//!
//! Usage: `railcam-run [input]`. SIGINT and SIGTERM stop the run, SIGUSR1
//! keeps the current segments and SIGUSR2 logs the worker status.

use chrono::Utc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use railcam_media::CommandLauncher;
use railcam_models::Command;
use railcam_queue::CommandSender;
use railcam_worker::{metrics, Controller, PidFile, RunConfig};

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
            .with(fmt::layer().json())
            .with(env_filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(true)
                    .with_thread_ids(false),
            )
            .with(env_filter)
            .init();
    }

    info!("Starting railcam-run");

    let config = RunConfig::from_env().with_args(std::env::args().skip(1));
    config.log_overrides();
    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        std::process::exit(e.exit_code());
    }

    if let Some(port) = config.metrics_port {
        match metrics::init_metrics(port) {
            Ok(()) => info!(port, "Serving metrics"),
            Err(e) => warn!("Failed to start metrics exporter: {}", e),
        }
    }

    let started_at = Utc::now();
    let pid_file = match PidFile::create(&config.pid_dir, started_at) {
        Ok(pid_file) => {
            info!(path = %pid_file.path().display(), "Pid file written");
            Some(pid_file)
        }
        Err(e) => {
            warn!("Failed to write pid file, external triggers will not work: {}", e);
            None
        }
    };

    let mut controller = match Controller::new(config, CommandLauncher::new(), started_at) {
        Ok(controller) => controller,
        Err(e) => {
            error!("Failed to create controller: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    let (stop_tx, stop_rx) = oneshot::channel();
    tokio::spawn(handle_signals(controller.command_sender(), stop_tx));

    let result = match controller.startup() {
        Ok(()) => {
            controller
                .run(async {
                    let _ = stop_rx.await;
                })
                .await
        }
        Err(e) => Err(e),
    };

    controller.shutdown().await;
    drop(pid_file);

    match result {
        Ok(()) => info!("railcam-run stopped"),
        Err(e) => {
            error!("railcam-run failed: {}", e);
            std::process::exit(e.exit_code());
        }
    }
}

#[cfg(unix)]
async fn handle_signals(commands: CommandSender, stop: oneshot::Sender<()>) {
    use tokio::signal::unix::{signal, SignalKind};

    let handlers = (
        signal(SignalKind::interrupt()),
        signal(SignalKind::terminate()),
        signal(SignalKind::user_defined1()),
        signal(SignalKind::user_defined2()),
    );
    let (Ok(mut interrupt), Ok(mut terminate), Ok(mut save), Ok(mut status)) = handlers else {
        warn!("Failed to install signal handlers, falling back to Ctrl+C");
        tokio::signal::ctrl_c().await.ok();
        let _ = stop.send(());
        return;
    };

    loop {
        tokio::select! {
            _ = interrupt.recv() => break,
            _ = terminate.recv() => break,
            _ = save.recv() => {
                info!("SIGUSR1 received, keeping current segments");
                commands.enqueue_command(Command::FileSave);
            }
            _ = status.recv() => {
                commands.enqueue_command(Command::StatusRequest);
            }
        }
    }
    info!("Received shutdown signal");
    let _ = stop.send(());
}

#[cfg(not(unix))]
async fn handle_signals(_commands: CommandSender, stop: oneshot::Sender<()>) {
    tokio::signal::ctrl_c().await.ok();
    info!("Received shutdown signal");
    let _ = stop.send(());
}
