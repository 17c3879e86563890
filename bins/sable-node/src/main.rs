//! Sable full node binary.
//!
//! Loads configuration and checkpoints, bootstraps the chain engine from
//! the snapshot file when present, runs the maintenance tasks, and persists
//! the chain on shutdown. A checkpoint violation anywhere in startup or
//! block processing terminates the process with exit code 1; operators
//! must delete the corrupt chain file and resync.

use std::path::PathBuf;
use std::process;
use std::sync::Arc;

use clap::Parser;
use parking_lot::RwLock;
use tracing::{error, info, warn};

use sable_consensus::checkpoint::CheckpointManager;
use sable_core::address::Address;
use sable_node_lib::config::NodeConfig;
use sable_node_lib::engine::ChainEngine;
use sable_node_lib::tasks::MaintenanceTasks;

/// Exit code for a checkpoint violation (corrupt local chain).
const EXIT_CHECKPOINT_VIOLATION: i32 = 1;

/// Sable full node.
#[derive(Parser, Debug)]
#[command(name = "sable-node", version, about = "Sable full node")]
struct Args {
    /// Configuration file (JSON or TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Reward address for locally produced blocks
    #[arg(long, default_value = "addr_local_node")]
    miner_address: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log output format ("text" or "json")
    #[arg(long, default_value = "text")]
    log_format: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let config = match NodeConfig::load(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            process::exit(2);
        }
    };

    let level = args.log_level.clone().unwrap_or_else(|| config.log_level.clone());
    init_logging(&level, &args.log_format);

    info!("Sable Full Node v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args, config).await {
        // The engine never exits the process itself; fatal checkpoint
        // violations surface here and become the operator-facing exit code.
        let fatal = e
            .downcast_ref::<sable_node_lib::error::ChainError>()
            .is_some_and(|c| c.is_fatal());
        error!("{e:#}");
        process::exit(if fatal { EXIT_CHECKPOINT_VIOLATION } else { 2 });
    }
}

async fn run(args: Args, config: NodeConfig) -> anyhow::Result<()> {
    let miner_address = Address::new(args.miner_address)?;

    let checkpoints = match &config.checkpoints_file {
        Some(path) => CheckpointManager::load(path)?,
        None => CheckpointManager::new(),
    };
    info!(count = checkpoints.len(), "checkpoints active");

    let snapshot_path = config.blockchain_path();
    let mut engine = ChainEngine::initialize(config.chain.clone(), miner_address, checkpoints)?;

    if snapshot_path.exists() {
        engine.load_from_file(&snapshot_path)?;
        info!(height = engine.height(), "chain restored from snapshot");
    } else {
        warn!(path = %snapshot_path.display(), "no snapshot found, starting from genesis");
    }

    let engine = Arc::new(RwLock::new(engine));
    let tasks = MaintenanceTasks::spawn(Arc::clone(&engine));
    info!("maintenance tasks running");

    info!("Sable node running (Ctrl+C to stop)");
    tokio::signal::ctrl_c().await?;
    info!("shutdown signal received");

    tasks.shutdown();
    engine.read().save_to_file(&snapshot_path)?;
    info!("chain persisted, shutdown complete");
    Ok(())
}

/// Initialize the tracing subscriber.
///
/// `format = "json"` yields structured output for log pipelines; anything
/// else is human-readable text.
fn init_logging(level_str: &str, format: &str) {
    use tracing_subscriber::filter::EnvFilter;
    use tracing_subscriber::fmt;
    use tracing_subscriber::prelude::*;

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level_str));

    if format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_level(true))
            .init();
    }
}
