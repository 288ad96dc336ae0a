use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use shard_manager::config::Config;
use shard_manager::{heartbeat, ManagerService};
use shardkv_common::rpc::serve;
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shard Manager: names the primary/backup for one replication group and
/// proxies client RPCs to the current primary.
#[derive(Parser, Debug)]
#[command(name = "shard-manager", version)]
struct Cli {
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[arg(short, long)]
    bind: Option<String>,

    #[arg(short, long)]
    shardmaster: Option<String>,
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
    if let Some(shardmaster) = cli.shardmaster {
        config.shardmaster_address = shardmaster;
    }

    let service = Arc::new(ManagerService::new(config.shardmaster_address.clone()));
    let shutdown = CancellationToken::new();

    heartbeat::spawn(
        service.state(),
        config.dead_interval(),
        config.check_interval(),
        shutdown.clone(),
    );

    info!(bind = %config.bind, shardmaster = %config.shardmaster_address, "shard-manager starting");

    let serve_shutdown = shutdown.clone();
    let bind = config.bind.clone();
    let server = tokio::spawn(async move { serve(&bind, service, serve_shutdown).await });

    ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();
    server.await??;
    Ok(())
}
