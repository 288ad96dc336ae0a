use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use shardkv_common::rpc::{retry_forever, Stub, StubTable};
use shardkv_common::task::spawn_ticker;
use shardkv_common::wire::{PutRequest, QueryRequest, QueryResponse};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::state::WorkerState;

const PUT_RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// The 100ms `QueryShardmaster` loop: reconcile the cached
/// assignment, migrate any keys this worker no longer owns, then erase
/// them locally once the migration `Put` lands.
pub fn spawn(
    state: Arc<Mutex<WorkerState>>,
    peers: StubTable,
    interval: Duration,
    shutdown: CancellationToken,
) {
    spawn_ticker(interval, shutdown, move || {
        let state = state.clone();
        let peers = peers.clone();
        async move { tick(&state, &peers).await }
    });
}

async fn tick(state: &Arc<Mutex<WorkerState>>, peers: &StubTable) {
    let shardmaster = { state.lock().shardmaster_address() };
    if shardmaster.is_empty() {
        return; // haven't heard from the Manager yet.
    }

    let stub = Stub::new(shardmaster);
    let response: QueryResponse = match stub.call("Query", &QueryRequest::default()).await {
        Ok(response) => response,
        Err(err) => {
            warn!(%err, "QueryShardmaster failed this tick, retrying next tick");
            return;
        }
    };

    let migrations = {
        let mut guard = state.lock();
        guard.set_assignment(response.config);
        if !guard.is_primary() {
            return;
        }
        guard.unmanaged_keys_by_owner()
    };

    if migrations.is_empty() {
        return;
    }

    // Lock released across every outbound Put: migration is
    // unbounded in duration and must not block concurrent client traffic.
    for (owner, entries) in migrations {
        let owner_stub = peers.get(&owner);
        for (key, value, user) in entries {
            let req = PutRequest {
                key: key.clone(),
                data: value,
                user,
            };
            retry_forever(
                || {
                    let owner_stub = owner_stub.clone();
                    let req = req.clone();
                    async move { owner_stub.call::<_, shardkv_common::wire::Empty>("Put", &req).await }
                },
                PUT_RETRY_BACKOFF,
                "migration put",
            )
            .await;

            state.lock().remove_migrated_key(&key);
            info!(key, owner, "migrated key");
        }
    }
}
