//! Store-local error type, converted into [`common::FabricError`] at service boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("encode error: {0}")]
    Encode(String),
}

impl From<StoreError> for common::FabricError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Redis(_) => common::FabricError::StoreTimeout(err.to_string()),
            StoreError::Encode(msg) => common::FabricError::Protocol(msg),
        }
    }
}
