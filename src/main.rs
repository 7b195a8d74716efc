//! procwatch entry point.
//!
//! Wires the out-of-scope collaborators around the supervisor core:
//! config-file loading, CLI flags, tracing output and OS signal
//! registration. The core itself never touches any of these.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use procwatch::{LogDir, ShutdownHandle, Supervisor, config};

/// Supervise external processes with dependency-aware start/stop.
#[derive(Parser)]
#[command(name = "procwatch")]
#[command(about = "Supervise external processes with dependency-aware start/stop")]
#[command(version)]
struct Cli {
    /// Path to the service configuration file
    #[arg(short, long, default_value = "procwatch.toml")]
    config: PathBuf,

    /// Directory receiving one <service>.log file per service
    #[arg(short, long, default_value = "log")]
    log_dir: PathBuf,

    /// Write a sample configuration to the --config path and exit
    #[arg(long)]
    create_config: bool,

    /// Enable debug output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_level.into()),
        )
        .init();

    if cli.create_config {
        std::fs::write(&cli.config, config::EXAMPLE)
            .with_context(|| format!("failed to write {}", cli.config.display()))?;
        println!("wrote sample configuration to {}", cli.config.display());
        return Ok(());
    }

    let text = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("failed to read {}", cli.config.display()))?;
    let mut supervisor = Supervisor::new(Arc::new(LogDir::new(&cli.log_dir)));
    config::apply(&text, &mut supervisor)
        .with_context(|| format!("invalid configuration in {}", cli.config.display()))?;

    spawn_shutdown_handler(supervisor.shutdown_handle())?;

    supervisor.run().await?;
    Ok(())
}

/// Deliver interrupt/terminate/quit signals into the supervisor as a
/// single shutdown request.
#[cfg(unix)]
fn spawn_shutdown_handler(handle: ShutdownHandle) -> anyhow::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut interrupt = signal(SignalKind::interrupt()).context("registering SIGINT handler")?;
    let mut terminate = signal(SignalKind::terminate()).context("registering SIGTERM handler")?;
    let mut quit = signal(SignalKind::quit()).context("registering SIGQUIT handler")?;

    tokio::spawn(async move {
        loop {
            let name = tokio::select! {
                _ = interrupt.recv() => "SIGINT",
                _ = terminate.recv() => "SIGTERM",
                _ = quit.recv() => "SIGQUIT",
            };
            info!(signal = name, "received signal, initiating shutdown");
            handle.shutdown();
        }
    });
    Ok(())
}

#[cfg(not(unix))]
fn spawn_shutdown_handler(handle: ShutdownHandle) -> anyhow::Result<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("received ctrl-c, initiating shutdown");
            handle.shutdown();
        }
    });
    Ok(())
}
