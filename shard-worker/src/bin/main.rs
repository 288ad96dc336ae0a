use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use shard_worker::config::Config;
use shard_worker::{heartbeat, reconcile, WorkerService};
use shardkv_common::rpc::serve;
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shard Worker: stores one shard range's keys, forwards writes to its
/// backup, and migrates keys when the Shardmaster reassigns ranges.
#[derive(Parser, Debug)]
#[command(name = "shard-worker", version)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    bind: Option<String>,

    #[arg(short, long)]
    manager: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    shardkv_common::init_tracing();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(bind) = cli.bind {
        config.bind = bind;
    }
    if let Some(manager) = cli.manager {
        config.manager_address = manager;
    }

    let service = Arc::new(WorkerService::new(config.bind.clone(), config.manager_address.clone()));
    let shutdown = CancellationToken::new();

    heartbeat::spawn(service.state(), config.heartbeat_interval(), shutdown.clone());
    reconcile::spawn(
        service.state(),
        service.peers(),
        config.reconcile_interval(),
        shutdown.clone(),
    );

    info!(bind = %config.bind, manager = %config.manager_address, "shard-worker starting");

    let serve_shutdown = shutdown.clone();
    let bind = config.bind.clone();
    let server = tokio::spawn(async move { serve(&bind, service, serve_shutdown).await });

    ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();
    server.await??;
    Ok(())
}
