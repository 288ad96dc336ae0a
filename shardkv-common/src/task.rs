//! A small ticker supervisor shared by the Shard Manager's heartbeat
//! checker and the Shard Worker's reconciliation/ping loops, following the
//! teacher's `Monitor`/`ShardMonitor` convention: a struct holding a
//! cloned handle to shared state, spawned once, `select!`ing between an
//! interval tick and a cancellation signal.

use std::future::Future;
use std::time::Duration;

use tokio::time::interval;
use tokio_util::sync::CancellationToken;

/// Spawn `body` to run on every `period` tick until `shutdown` is
/// cancelled. `body` is handed the CancellationToken so long-running
/// iterations (an RPC mid-flight) can check for shutdown too, though none
/// of this crate's callers currently do.
pub fn spawn_ticker<F, Fut>(period: Duration, shutdown: CancellationToken, mut body: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    tokio::spawn(async move {
        let mut ticker = interval(period);
        loop {
            tokio::select! {
                _ = ticker.tick() => body().await,
                _ = shutdown.cancelled() => return,
            }
        }
    });
}
