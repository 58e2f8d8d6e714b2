use anyhow::Context;
use std::path::PathBuf;
use tokio_stream::StreamExt;
use tracing_subscriber::EnvFilter;
use zlmedia_runtime::{MediaConfigs, MediaPorts, ZlMediaRuntime};

/// Usage: simple <path-to-MediaServer> [http-port]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_target(false)
        .init();

    let mut args = std::env::args().skip(1);
    let executable = PathBuf::from(args.next().context("missing MediaServer path")?);
    let http = match args.next() {
        Some(port) => port.parse().context("invalid http port")?,
        None => MediaPorts::default().http,
    };

    let configs = MediaConfigs::new(MediaPorts {
        http,
        ..MediaPorts::default()
    })
    .with("general.mediaServerId", "demo");
    let runtime = ZlMediaRuntime::from_source(&executable, &configs)?;

    let mut output = runtime.output();
    tokio::spawn(async move {
        while let Some(line) = output.next().await {
            println!("[MediaServer] {line}");
        }
    });

    runtime.start().await?;
    let server_configs = runtime.operations().get_configs().await?;
    tracing::info!(
        pid = ?runtime.pid(),
        entries = server_configs.len(),
        "Media server ready, press ctrl-c to stop"
    );

    tokio::signal::ctrl_c().await?;
    runtime.shutdown().await;
    Ok(())
}
