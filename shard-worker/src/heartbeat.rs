use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shardkv_common::rpc::Stub;
use shardkv_common::task::spawn_ticker;
use shardkv_common::wire::{DumpResponse, PingRequest, PingResponse};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::state::WorkerState;

/// The 100ms `PingShardmanager` loop: report liveness, adopt
/// whatever view the Manager hands back, and — the first time this worker
/// finds itself a fresh backup — pull a full snapshot from the primary so it
/// isn't serving out of an empty store.
pub fn spawn(state: Arc<Mutex<WorkerState>>, interval: Duration, shutdown: CancellationToken) {
    spawn_ticker(interval, shutdown, move || {
        let state = state.clone();
        async move { tick(&state).await }
    });
}

async fn tick(state: &Arc<Mutex<WorkerState>>) {
    let (manager, address, view_number) = {
        let guard = state.lock();
        (guard.manager_stub(), guard.address().to_string(), guard.view_number())
    };

    let req = PingRequest {
        view_number,
        server: address,
    };
    let response: PingResponse = match manager.call("Ping", &req).await {
        Ok(response) => response,
        Err(err) => {
            warn!(%err, "PingShardmanager failed this tick, retrying next tick");
            return;
        }
    };

    let needs_snapshot = {
        let mut guard = state.lock();
        let was_fresh_backup = !guard.is_primary() && guard.view_number() == 0 && view_number == 0;
        let primary_known = !response.primary.is_empty() && response.primary != guard.address();
        guard.apply_ping_response(
            &response.primary,
            &response.backup,
            response.shardmaster.clone(),
            response.id,
        );
        was_fresh_backup && response.backup == guard.address() && primary_known
    };

    if needs_snapshot {
        let primary_stub = Stub::new(response.primary.clone());
        match primary_stub.call::<_, DumpResponse>("Dump", &shardkv_common::wire::Empty {}).await {
            Ok(snapshot) => {
                state.lock().merge_dump(snapshot.database);
            }
            Err(err) => {
                warn!(%err, primary = response.primary, "failed to pull initial snapshot from primary");
            }
        }
    }
}
