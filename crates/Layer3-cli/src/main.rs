//! playpen CLI - Main entry point
//!
//! Reads `run` / `kill` commands as JSON lines on stdin and writes process
//! output as JSON lines on stdout. Logs go to stderr.

mod wire;

use anyhow::Context;
use clap::Parser;
use playpen_foundation::{IdSource, ProcessConfig};
use playpen_process::{Session, Supervisor};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// playpen - run programs and stream their output as messages
#[derive(Parser, Debug)]
#[command(name = "playpen")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Working directory for started programs
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Maximum output messages per program before it is killed
    #[arg(short, long)]
    limit: Option<usize>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging (stdout carries messages)
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let mut config = ProcessConfig::load().context("Failed to load configuration")?;
    if let Some(dir) = args.workdir {
        config.working_dir = Some(dir);
    }
    if let Some(limit) = args.limit {
        config.message_limit = limit;
    }
    config.validate()?;

    info!(
        "Serving with message limit {} (workdir: {:?})",
        config.message_limit, config.working_dir
    );

    let supervisor = Supervisor::with_config(Arc::new(IdSource::new()), &config);
    let (out_tx, out_rx) = mpsc::channel(config.channel_capacity);
    let (command_tx, command_rx) = mpsc::channel(config.channel_capacity);

    let session = Session::with_config(supervisor, out_tx, &config);
    let served = tokio::spawn(session.serve(command_rx));
    let writer = tokio::spawn(wire::write_messages(tokio::io::stdout(), out_rx));

    let input = BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = wire::read_commands(input, command_tx) => result?,
        _ = tokio::signal::ctrl_c() => info!("Interrupted, stopping"),
    }

    // The command stream is closed now; the session kills what is left.
    served.await?;
    writer.await??;
    Ok(())
}
