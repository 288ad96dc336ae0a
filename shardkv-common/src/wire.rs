//! Message shapes exchanged between the three services: plain
//! `serde`-derived structs carried as the JSON payload of an
//! [`crate::rpc::Envelope`], standing in for a protobuf schema.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shard::Shard;

// ---------------------------------------------------------------------------
// Shardmaster
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRequest {
    pub server: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub servers: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoveRequest {
    pub server: String,
    pub shard: Shard,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct QueryRequest {}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerShards {
    pub server: String,
    pub shards: Vec<Shard>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct QueryResponse {
    pub config: Vec<ServerShards>,
}

// ---------------------------------------------------------------------------
// Shard Manager
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PingRequest {
    pub view_number: u64,
    pub server: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct PingResponse {
    pub id: u64,
    pub primary: String,
    pub backup: String,
    pub shardmaster: String,
}

// ---------------------------------------------------------------------------
// Shared client-facing KV operations (Manager proxies these, Worker serves
// them)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GetResponse {
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    pub key: String,
    pub data: String,
    pub user: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRequest {
    pub key: String,
    pub data: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Empty {}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct DumpResponse {
    pub database: HashMap<String, String>,
}

// ---------------------------------------------------------------------------
// Wire-level error kinds
// ---------------------------------------------------------------------------

/// The two error kinds that cross the wire. Carried inside an
/// [`crate::rpc::Reply`], never raised as a Rust panic.
#[derive(Debug, Clone, Serialize, Deserialize, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Unavailable(String),
}

impl ServiceError {
    pub fn not_responsible() -> Self {
        Self::InvalidArgument("Not responsible for key".to_string())
    }

    pub fn key_not_found() -> Self {
        Self::InvalidArgument("Key not found".to_string())
    }

    pub fn server_exists() -> Self {
        Self::InvalidArgument("Server already exists".to_string())
    }

    pub fn server_not_found() -> Self {
        Self::InvalidArgument("Server does not exist".to_string())
    }

    pub fn no_shards_left() -> Self {
        Self::InvalidArgument("No shards left to give".to_string())
    }

    pub fn no_primary() -> Self {
        Self::Unavailable("No primary server".to_string())
    }
}
