use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use shardkv_common::rpc::serve;
use shardmaster::config::Config;
use shardmaster::ShardmasterService;
use tokio::signal::ctrl_c;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Shardmaster: authoritative owner of the shard-to-server assignment.
#[derive(Parser, Debug)]
#[command(name = "shardmaster", version)]
struct Cli {
    /// Path to the configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Address to bind the RPC listener on, overrides the config file.
    #[arg(short, long)]
    bind: Option<String>,
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

    let service = Arc::new(ShardmasterService::new(&config));
    let shutdown = CancellationToken::new();

    info!(bind = %config.bind, "shardmaster starting");

    let serve_shutdown = shutdown.clone();
    let bind = config.bind.clone();
    let server = tokio::spawn(async move { serve(&bind, service, serve_shutdown).await });

    ctrl_c().await?;
    info!("shutdown requested");
    shutdown.cancel();
    server.await??;
    Ok(())
}
