//! flowscaled - OpenFlow traffic-steering daemon
//!
//! Entry point for the flowscaled daemon.

use anyhow::{anyhow, Context};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use flowscaled::config::DEFAULT_CONFIG_PATH;
use flowscaled::{FlowscaleConfig, FlowscaleController, SwitchTable};

/// OpenFlow traffic-steering rule daemon
///
/// Loads and validates the configured groups. This binary opens no switch
/// connections; the host OpenFlow integration registers switches and
/// reports their switch and port events to the controller.
#[derive(Parser, Debug)]
#[command(name = "flowscaled")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the TOML config file
    #[arg(short = 'c', long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG wins if set
    #[arg(short = 'l', long)]
    log_level: Option<String>,

    /// Flow-mods written to a switch before flushing and pausing
    #[arg(short = 'b', long)]
    max_flows_per_batch: Option<usize>,

    /// Pause after each batch, in milliseconds
    #[arg(long)]
    batch_pause_ms: Option<u64>,
}

/// Initializes tracing/logging subsystem
fn init_logging(level: &str, json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("invalid log level: {}", level))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true);
    let installed = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| anyhow!("failed to set tracing subscriber: {}", e))
}

async fn run(args: Args) -> anyhow::Result<()> {
    let mut config = FlowscaleConfig::load_or_default(&args.config)?;
    if let Some(max_flows) = args.max_flows_per_batch {
        config.controller.max_flows_per_batch = max_flows;
    }
    if let Some(pause) = args.batch_pause_ms {
        config.controller.batch_pause_ms = pause;
    }

    let level = args.log_level.as_deref().unwrap_or(&config.logging.level);
    init_logging(level, config.logging.json)?;
    config.validate()?;

    info!("--- Starting flowscaled ---");
    info!(
        config = %args.config.display(),
        max_flows_per_batch = config.controller.max_flows_per_batch,
        batch_pause_ms = config.controller.batch_pause_ms,
        "Configuration loaded"
    );

    let switches = Arc::new(SwitchTable::new(config.controller.initial_priority));
    let controller = FlowscaleController::new(switches, config.batch_policy());

    for spec in &config.groups {
        if let Err(e) = controller.add_group(spec).await {
            error!(group = %spec.id, error = %e, "Skipping group");
        }
    }
    info!(
        groups = ?controller.group_ids().await,
        "Groups configured, switch events are supplied by the host integration"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("Shutting down");
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("flowscaled: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
