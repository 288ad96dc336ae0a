use shardkv_common::wire::ServiceError;
use thiserror::Error;

/// All Shardmaster validation failures collapse to the wire's single
/// `INVALID_ARGUMENT` kind.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Server already exists")]
    ServerExists,
    #[error("Server does not exist")]
    ServerNotFound,
    #[error("No shards left to give")]
    NoShardsLeft,
    #[error("{0}")]
    Shard(#[from] shardkv_common::shard::Error),
}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        ServiceError::InvalidArgument(err.to_string())
    }
}
