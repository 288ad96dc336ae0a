use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::timeout;

use super::{Envelope, Reply, RpcError};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

struct Connection {
    lines: Lines<BufReader<OwnedReadHalf>>,
    write: OwnedWriteHalf,
}

/// A lazily-connected client to one remote endpoint. Reconnects on the
/// next call after any transport failure: one entry per endpoint, dialed
/// on demand.
#[derive(Clone)]
pub struct Stub {
    endpoint: String,
    conn: Arc<AsyncMutex<Option<Connection>>>,
    next_id: Arc<AtomicU64>,
    call_timeout: Duration,
}

impl Stub {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            conn: Arc::new(AsyncMutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
            call_timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Issue one RPC and decode its response. A transport-level failure
    /// (including timeout) drops the cached connection so the next call
    /// redials from scratch.
    pub async fn call<Req, Resp>(&self, method: &str, request: &Req) -> Result<Resp, RpcError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let payload = serde_json::to_value(request)?;
        let value = timeout(self.call_timeout, self.call_inner(method, payload))
            .await
            .map_err(|_| RpcError::Timeout)??;
        Ok(serde_json::from_value(value)?)
    }

    async fn call_inner(&self, method: &str, payload: Value) -> Result<Value, RpcError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = Envelope {
            id,
            method: method.to_string(),
            payload,
        };
        let mut serialized = serde_json::to_string(&envelope)?;
        serialized.push('\n');

        let mut guard = self.conn.lock().await;
        if guard.is_none() {
            *guard = Some(self.connect().await?);
        }

        let outcome = Self::exchange(guard.as_mut().expect("just populated"), &serialized, id).await;
        if outcome.is_err() {
            *guard = None;
        }
        outcome
    }

    async fn exchange(
        connection: &mut Connection,
        serialized: &str,
        id: u64,
    ) -> Result<Value, RpcError> {
        connection.write.write_all(serialized.as_bytes()).await?;
        let line = connection
            .lines
            .next_line()
            .await?
            .ok_or(RpcError::ConnectionClosed)?;
        let reply: Reply = serde_json::from_str(&line)?;
        if reply.id != id {
            return Err(RpcError::IdMismatch {
                expected: id,
                got: reply.id,
            });
        }
        Ok(reply.result?)
    }

    async fn connect(&self) -> Result<Connection, RpcError> {
        let stream = TcpStream::connect(&self.endpoint).await?;
        let (read, write) = stream.into_split();
        Ok(Connection {
            lines: BufReader::new(read).lines(),
            write,
        })
    }
}

/// A table of stubs, one per remote endpoint, created lazily on first
/// lookup and shared by every caller after that.
#[derive(Clone, Default)]
pub struct StubTable {
    stubs: Arc<Mutex<HashMap<String, Stub>>>,
}

impl StubTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, endpoint: &str) -> Stub {
        let mut stubs = self.stubs.lock();
        stubs
            .entry(endpoint.to_string())
            .or_insert_with(|| Stub::new(endpoint))
            .clone()
    }
}
