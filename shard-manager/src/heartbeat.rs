use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shardkv_common::task::spawn_ticker;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::state::ManagerState;

/// The 1s background heartbeat checker. A thin wrapper over
/// `shardkv_common::task::spawn_ticker` so the dead-server detection logic
/// in `ManagerState::check_heartbeats` stays testable in isolation.
pub fn spawn(
    state: Arc<Mutex<ManagerState>>,
    dead_interval: Duration,
    check_interval: Duration,
    shutdown: CancellationToken,
) {
    spawn_ticker(check_interval, shutdown, move || {
        let state = state.clone();
        async move {
            let died = state.lock().check_heartbeats(dead_interval, Instant::now());
            if died {
                tracing::info!("heartbeat checker processed one death this tick");
            }
        }
    });
}
