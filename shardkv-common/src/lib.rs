//! Shard algebra, key taxonomy, wire message shapes and the RPC transport
//! shared by the `shardmaster`, `shard-manager` and `shard-worker`
//! services. No service logic lives here.

pub mod keys;
pub mod rpc;
pub mod shard;
pub mod task;
pub mod wire;

pub use shard::{Overlap, Shard};

/// Initialize `tracing` with an `EnvFilter`, matching every service's
/// bootstrap. Call once from each binary's `main`.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}
