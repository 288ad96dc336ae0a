use async_trait::async_trait;
use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use shardkv_common::rpc::Handler;
use shardkv_common::wire::{
    Empty, JoinRequest, LeaveRequest, MoveRequest, QueryRequest, QueryResponse, ServerShards,
    ServiceError,
};
use tracing::warn;

use crate::config::Config;
use crate::state::State;

/// Dispatches the four shardmaster RPCs onto a single mutex-guarded `State`.
/// The lock is held only for the duration of each call; there is no
/// cross-call critical section: exclusive access per call.
pub struct ShardmasterService {
    state: Mutex<State>,
}

impl ShardmasterService {
    pub fn new(config: &Config) -> Self {
        Self {
            state: Mutex::new(State::new(config.min_key, config.max_key)),
        }
    }
}

fn decode<T: DeserializeOwned>(payload: Value) -> Result<T, ServiceError> {
    serde_json::from_value(payload).map_err(|err| ServiceError::InvalidArgument(err.to_string()))
}

fn ok_empty() -> Value {
    serde_json::to_value(Empty {}).expect("Empty always serializes")
}

#[async_trait]
impl Handler for ShardmasterService {
    async fn handle(&self, method: &str, payload: Value) -> Result<Value, ServiceError> {
        match method {
            "Join" => {
                let req: JoinRequest = decode(payload)?;
                self.state.lock().join(req.server)?;
                Ok(ok_empty())
            }
            "Leave" => {
                let req: LeaveRequest = decode(payload)?;
                self.state.lock().leave_many(&req.servers)?;
                Ok(ok_empty())
            }
            "Move" => {
                let req: MoveRequest = decode(payload)?;
                self.state.lock().mv(req.server, req.shard)?;
                Ok(ok_empty())
            }
            "Query" => {
                let _req: QueryRequest = decode(payload)?;
                let config = self
                    .state
                    .lock()
                    .query()
                    .into_iter()
                    .map(|(server, shards)| ServerShards { server, shards })
                    .collect();
                Ok(serde_json::to_value(QueryResponse { config }).expect("always serializes"))
            }
            other => {
                warn!(method = other, "unknown shardmaster method");
                Err(ServiceError::InvalidArgument(format!(
                    "unknown method {other:?}"
                )))
            }
        }
    }
}
