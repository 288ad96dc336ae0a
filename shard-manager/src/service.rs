use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shardkv_common::rpc::Handler;
use shardkv_common::wire::{
    AppendRequest, DeleteRequest, GetRequest, PingRequest, PutRequest, ServiceError,
};
use tokio::time::Instant;

use crate::error::Error;
use crate::state::ManagerState;

/// Wraps the shared, lockable state so `main` can hand the same `Arc` to
/// both the RPC handler and the heartbeat checker task.
pub struct ManagerService {
    state: Arc<Mutex<ManagerState>>,
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ServiceError> {
    serde_json::from_value(payload).map_err(|err| ServiceError::InvalidArgument(err.to_string()))
}

impl ManagerService {
    pub fn new(shardmaster_address: String) -> Self {
        Self {
            state: Arc::new(Mutex::new(ManagerState::new(shardmaster_address))),
        }
    }

    pub fn state(&self) -> Arc<Mutex<ManagerState>> {
        self.state.clone()
    }

    /// Proxy one client RPC to the current primary. Snapshots the stub
    /// under lock and releases before the network call: a slow primary
    /// must not stall the lock that the heartbeat checker and every other
    /// client RPC also needs.
    async fn proxy<Req, Resp>(&self, method: &'static str, req: &Req) -> Result<Resp, ServiceError>
    where
        Req: serde::Serialize,
        Resp: DeserializeOwned,
    {
        self.proxy_inner(method, req).await.map_err(ServiceError::from)
    }

    async fn proxy_inner<Req, Resp>(&self, method: &'static str, req: &Req) -> Result<Resp, Error>
    where
        Req: serde::Serialize,
        Resp: DeserializeOwned,
    {
        let stub = self.state.lock().primary_stub();
        let stub = stub.ok_or(Error::NoPrimary)?;
        match stub.call(method, req).await {
            Ok(resp) => Ok(resp),
            // the primary's own answer, surfaced to the client unchanged.
            Err(shardkv_common::rpc::RpcError::Remote(service_err)) => {
                Err(Error::Remote(service_err))
            }
            Err(other) => Err(Error::Rpc(other)),
        }
    }
}

#[async_trait]
impl Handler for ManagerService {
    async fn handle(&self, method: &str, payload: Value) -> Result<Value, ServiceError> {
        match method {
            "Ping" => {
                let req: PingRequest = decode(payload)?;
                let resp = self
                    .state
                    .lock()
                    .ping(&req.server, req.view_number, Instant::now());
                Ok(serde_json::to_value(resp).expect("always serializes"))
            }
            "Get" => {
                let req: GetRequest = decode(payload)?;
                let resp: shardkv_common::wire::GetResponse = self.proxy("Get", &req).await?;
                Ok(serde_json::to_value(resp).expect("always serializes"))
            }
            "Put" => {
                let req: PutRequest = decode(payload)?;
                let resp: shardkv_common::wire::Empty = self.proxy("Put", &req).await?;
                Ok(serde_json::to_value(resp).expect("always serializes"))
            }
            "Append" => {
                let req: AppendRequest = decode(payload)?;
                let resp: shardkv_common::wire::Empty = self.proxy("Append", &req).await?;
                Ok(serde_json::to_value(resp).expect("always serializes"))
            }
            "Delete" => {
                let req: DeleteRequest = decode(payload)?;
                let resp: shardkv_common::wire::Empty = self.proxy("Delete", &req).await?;
                Ok(serde_json::to_value(resp).expect("always serializes"))
            }
            other => Err(ServiceError::InvalidArgument(format!(
                "unknown method {other:?}"
            ))),
        }
    }
}
