use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::wire::ServiceError;

use super::{Envelope, Reply};

/// Implemented by each service to answer one RPC method.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    async fn handle(&self, method: &str, payload: Value) -> Result<Value, ServiceError>;
}

/// Bind `addr` and serve `handler` until `shutdown` is cancelled.
pub async fn serve(
    addr: &str,
    handler: Arc<dyn Handler>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(%addr, "rpc listener started");

    loop {
        select! {
            accepted = listener.accept() => {
                let (stream, peer) = accepted?;
                let handler = handler.clone();
                let conn_shutdown = shutdown.clone();
                tokio::spawn(async move {
                    if let Err(err) = serve_connection(stream, handler, conn_shutdown).await {
                        debug!(%peer, %err, "connection ended");
                    }
                });
            }
            _ = shutdown.cancelled() => {
                tracing::info!(%addr, "rpc listener shutting down");
                return Ok(());
            }
        }
    }
}

async fn serve_connection(
    stream: TcpStream,
    handler: Arc<dyn Handler>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let (read_half, mut write_half) = stream.into_split();
    let mut lines = BufReader::new(read_half).lines();

    loop {
        let line = select! {
            line = lines.next_line() => line?,
            _ = shutdown.cancelled() => return Ok(()),
        };
        let Some(line) = line else {
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }

        let envelope: Envelope = match serde_json::from_str(&line) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(%err, "dropping malformed request");
                continue;
            }
        };

        let result = handler.handle(&envelope.method, envelope.payload).await;
        let reply = Reply {
            id: envelope.id,
            result,
        };
        let mut serialized = serde_json::to_string(&reply)
            .map_err(|err| std::io::Error::new(std::io::ErrorKind::InvalidData, err))?;
        serialized.push('\n');
        write_half.write_all(serialized.as_bytes()).await?;
    }
}
