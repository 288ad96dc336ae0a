use shardkv_common::wire::ServiceError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("not responsible for key")]
    NotResponsible,
    #[error("key not found")]
    NotFound,
}

impl From<Error> for ServiceError {
    fn from(err: Error) -> Self {
        match err {
            Error::NotResponsible => ServiceError::not_responsible(),
            Error::NotFound => ServiceError::key_not_found(),
        }
    }
}
