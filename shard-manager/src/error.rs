use shardkv_common::rpc::RpcError;
use shardkv_common::wire::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("no primary server")]
    NoPrimary,
    #[error("transport error: {0}")]
    Rpc(#[from] RpcError),
    #[error("{0}")]
    Remote(ServiceError),
}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        match err {
            Error::NoPrimary => ServiceError::no_primary(),
            Error::Rpc(err) => ServiceError::Unavailable(err.to_string()),
            Error::Remote(service_err) => service_err,
        }
    }
}
