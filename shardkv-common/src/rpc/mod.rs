//! The "reliable, in-order, unicast request/response channel with
//! timeouts" the original design treats as an external collaborator, made concrete:
//! newline-delimited JSON envelopes over TCP. See SPEC_FULL.md §2.

pub mod client;
pub mod server;

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::warn;

use crate::wire::ServiceError;

pub use client::{Stub, StubTable};
pub use server::{serve, Handler};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: u64,
    pub method: String,
    pub payload: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub id: u64,
    pub result: Result<Value, ServiceError>,
}

/// Transport-level failure. Distinct from [`ServiceError`], which is the
/// only kind of error that ever crosses the wire as a *successful* reply.
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("call timed out")]
    Timeout,
    #[error("connection closed by peer")]
    ConnectionClosed,
    #[error("reply id mismatch: expected {expected}, got {got}")]
    IdMismatch { expected: u64, got: u64 },
    #[error("{0}")]
    Remote(#[from] ServiceError),
}

/// Retry `attempt` until it succeeds, sleeping `backoff` between tries.
/// Used for the three "retry forever" obligations: backup
/// forwarding, migration puts, and cross-worker post-list appends.
pub async fn retry_forever<T, Fut, F>(mut attempt: F, backoff: Duration, what: &str) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    loop {
        match attempt().await {
            Ok(value) => return value,
            Err(err) => {
                warn!(%err, "{what} failed, retrying");
                tokio::time::sleep(backoff).await;
            }
        }
    }
}
