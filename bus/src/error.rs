//! Bus-local error type, converted into [`common::FabricError`] at service boundaries.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BusError {
    #[error("not connected")]
    NotConnected,

    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("channel closed")]
    ChannelClosed,
}

impl From<BusError> for common::FabricError {
    fn from(err: BusError) -> Self {
        match err {
            BusError::NotConnected | BusError::Redis(_) | BusError::ChannelClosed => {
                common::FabricError::TransportTransient(err.to_string())
            }
        }
    }
}
