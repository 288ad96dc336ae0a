use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shardkv_common::rpc::{retry_forever, Handler, StubTable};
use shardkv_common::wire::{
    AppendRequest, DeleteRequest, DumpResponse, Empty, GetRequest, GetResponse, PutRequest,
    ServiceError,
};
use tracing::warn;

use crate::state::WorkerState;

const RETRY_BACKOFF: Duration = Duration::from_millis(200);

/// Owns the locked `WorkerState` plus a table of stubs to other workers,
/// used for the backup forward and cross-worker post-list appends. The
/// table lives outside the state lock: its own internal lock is
/// independent, so dialing a peer never blocks a concurrent client RPC.
pub struct WorkerService {
    state: Arc<Mutex<WorkerState>>,
    peers: StubTable,
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ServiceError> {
    serde_json::from_value(payload).map_err(|err| ServiceError::InvalidArgument(err.to_string()))
}

impl WorkerService {
    pub fn new(address: String, manager_address: String) -> Self {
        Self {
            state: Arc::new(Mutex::new(WorkerState::new(address, manager_address))),
            peers: StubTable::new(),
        }
    }

    pub fn state(&self) -> Arc<Mutex<WorkerState>> {
        self.state.clone()
    }

    pub fn peers(&self) -> StubTable {
        self.peers.clone()
    }

    async fn forward_to_backup<Req>(&self, method: &'static str, req: &Req)
    where
        Req: serde::Serialize + Clone + Send + Sync,
    {
        let backup = self.state.lock().backup_stub();
        let Some(backup) = backup else { return };
        retry_forever(
            || {
                let backup = backup.clone();
                let req = req.clone();
                async move { backup.call::<_, Empty>(method, &req).await }
            },
            RETRY_BACKOFF,
            "backup forward",
        )
        .await;
    }

    async fn forward_post_list(&self, owner: String, list_key: String, value: String) {
        let stub = self.peers.get(&owner);
        let req = AppendRequest {
            key: list_key,
            data: value,
        };
        retry_forever(
            || {
                let stub = stub.clone();
                let req = req.clone();
                async move { stub.call::<_, Empty>("Append", &req).await }
            },
            RETRY_BACKOFF,
            "cross-worker post-list append",
        )
        .await;
    }

    async fn put(&self, req: PutRequest) -> Result<Value, ServiceError> {
        {
            let state = self.state.lock();
            if !state.manages_key(&req.key) {
                return Err(ServiceError::not_responsible());
            }
        }
        self.forward_to_backup("Put", &req).await;

        let forward = {
            let mut state = self.state.lock();
            state.put_local(&req.key, &req.data, req.user.clone())?
        };
        if let Some(forward) = forward {
            self.forward_post_list(forward.owner, forward.list_key, forward.value)
                .await;
        }
        Ok(serde_json::to_value(Empty {}).expect("always serializes"))
    }

    async fn append(&self, req: AppendRequest) -> Result<Value, ServiceError> {
        {
            let state = self.state.lock();
            if !state.manages_key(&req.key) {
                return Err(ServiceError::not_responsible());
            }
        }
        // §9 item 2: Append now forwards to the backup too, the same shape as Put.
        self.forward_to_backup("Append", &req).await;

        let forward = {
            let mut state = self.state.lock();
            state.append_local(&req.key, &req.data)?
        };
        if let Some(forward) = forward {
            self.forward_post_list(forward.owner, forward.list_key, forward.value)
                .await;
        }
        Ok(serde_json::to_value(Empty {}).expect("always serializes"))
    }
}

#[async_trait]
impl Handler for WorkerService {
    async fn handle(&self, method: &str, payload: Value) -> Result<Value, ServiceError> {
        match method {
            "Get" => {
                let req: GetRequest = decode(payload)?;
                let data = self.state.lock().get(&req.key)?;
                Ok(serde_json::to_value(GetResponse { data }).expect("always serializes"))
            }
            "Put" => {
                let req: PutRequest = decode(payload)?;
                self.put(req).await
            }
            "Append" => {
                let req: AppendRequest = decode(payload)?;
                self.append(req).await
            }
            "Delete" => {
                let req: DeleteRequest = decode(payload)?;
                self.state.lock().delete(&req.key)?;
                Ok(serde_json::to_value(Empty {}).expect("always serializes"))
            }
            "Dump" => {
                let database = self.state.lock().dump();
                Ok(serde_json::to_value(DumpResponse { database }).expect("always serializes"))
            }
            other => {
                warn!(method = other, "unknown worker method");
                Err(ServiceError::InvalidArgument(format!(
                    "unknown method {other:?}"
                )))
            }
        }
    }
}
