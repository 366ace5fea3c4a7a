//! In-process bus backed by `tokio::sync::broadcast`, one sender per channel.
//!
//! Grounded on `EventBus::get_or_create_broadcaster`: a channel's
//! broadcaster is created lazily on first publish or subscribe and kept
//! alive for the bus's lifetime so subscribers never race a publisher.

use async_trait::async_trait;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tokio::sync::broadcast;

use crate::client::{BusClient, Subscription};
use crate::error::BusError;

const DEFAULT_CAPACITY: usize = 1024;

pub struct LocalBus {
    capacity: usize,
    broadcasters: RwLock<FxHashMap<String, broadcast::Sender<String>>>,
}

impl LocalBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            capacity,
            broadcasters: RwLock::new(FxHashMap::default()),
        }
    }

    fn get_or_create(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self.broadcasters.read().get(channel) {
            return tx.clone();
        }
        let mut broadcasters = self.broadcasters.write();
        broadcasters
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .clone()
    }
}

impl Default for LocalBus {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BusClient for LocalBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, BusError> {
        let tx = self.get_or_create(channel);
        Ok(tx.send(payload.to_string()).unwrap_or(0) as u64)
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let tx = self.get_or_create(channel);
        Ok(Subscription::new(tx.subscribe()))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), BusError> {
        self.broadcasters.write().remove(channel);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        self.broadcasters.write().clear();
        Ok(())
    }
}
