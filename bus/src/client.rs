//! The `BusClient` trait every transport (in-process or Redis-backed) implements.

use async_trait::async_trait;
use tokio::sync::broadcast;

use crate::error::BusError;

/// A handle to one channel's broadcast stream. Cloning (via `resubscribe`)
/// gives an independent receiver starting from the point of the clone —
/// messages published before a given subscribe call are never seen by it,
/// matching the at-most-once, no-replay contract of §4.1.
pub struct Subscription {
    rx: broadcast::Receiver<String>,
}

impl Subscription {
    pub fn new(rx: broadcast::Receiver<String>) -> Self {
        Self { rx }
    }

    /// Wait for the next raw payload on this channel. Returns `None` once
    /// the channel's broadcaster is gone (all publishers dropped).
    pub async fn recv(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(payload) => return Some(payload),
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// Transport-agnostic pub/sub contract (§4.1). `publish`/`subscribe` deal in
/// raw text payloads — decoding to a typed envelope is the Router's job, so
/// the transport never needs to know about any particular message schema.
#[async_trait]
pub trait BusClient: Send + Sync {
    /// Publish a raw payload to `channel`. Returns the number of receivers
    /// that were subscribed at publish time (best-effort; zero is not an
    /// error).
    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, BusError>;

    /// Subscribe to `channel`, returning a fresh [`Subscription`]. Multiple
    /// calls for the same channel are independent broadcast receivers.
    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError>;

    /// Drop this client's interest in `channel`. Already-issued
    /// [`Subscription`]s keep working until their receiver lags past the
    /// buffer or the underlying broadcaster is torn down.
    async fn unsubscribe(&self, channel: &str) -> Result<(), BusError>;

    /// Tear down the connection and release resources.
    async fn disconnect(&self) -> Result<(), BusError>;

    /// Whether the transport currently believes it has a live connection.
    /// In-process transports are always connected.
    fn is_connected(&self) -> bool {
        true
    }
}
