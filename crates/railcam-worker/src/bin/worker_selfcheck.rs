use std::path::Path;

use railcam_media::command::resolve_program;
use railcam_media::CommandTemplate;
use railcam_worker::RunConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = RunConfig::from_env().with_args(std::env::args().skip(1));

    println!(
        "worker-selfcheck: starting with input={} live={}",
        config.input,
        config.is_live_input()
    );
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("invalid configuration: {}", e))?;

    for dir in [&config.ram_dir, &config.hdd_dir, &config.statistics_dir] {
        ensure_dir(dir).await?;
    }

    let mut commands = vec![
        ("inference", &config.inference_command),
        ("streaming", &config.streaming_command),
        ("file-save", &config.filesave_command),
    ];
    if config.fileserver_enabled {
        commands.push(("fileserver", &config.fileserver_command));
    }
    if let Some(serial) = config.serial_command.as_ref() {
        commands.push(("serial-capture", serial));
    }
    for (worker, line) in commands {
        ensure_program(worker, line)?;
    }

    println!("worker-selfcheck: ok");
    Ok(())
}

async fn ensure_dir<P: AsRef<Path>>(path: P) -> anyhow::Result<()> {
    let path = path.as_ref();
    tokio::fs::create_dir_all(path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot create {}: {}", path.display(), e))?;
    Ok(())
}

fn ensure_program(worker: &str, line: &str) -> anyhow::Result<()> {
    let template = CommandTemplate::parse(line)?;
    let path = resolve_program(template.program())
        .map_err(|e| anyhow::anyhow!("{} worker program not available: {}", worker, e))?;
    println!("worker-selfcheck: {} -> {}", worker, path.display());
    Ok(())
}
