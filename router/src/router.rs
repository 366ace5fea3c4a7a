//! Single Router value owned by a service root (§9's redesign of the
//! teacher's cyclic adapter/router graph): one bus subscription per
//! channel, `k` in-process handlers fanned out concurrently per message.

use std::sync::Arc;

use bus::BusClient;
use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::handler::Handler;

pub struct Router {
    bus: Arc<dyn BusClient>,
    handlers: Arc<RwLock<FxHashMap<String, Vec<Arc<dyn Handler>>>>>,
    dispatch_tasks: RwLock<FxHashMap<String, tokio::task::JoinHandle<()>>>,
}

impl Router {
    pub fn new(bus: Arc<dyn BusClient>) -> Self {
        Self {
            bus,
            handlers: Arc::new(RwLock::new(FxHashMap::default())),
            dispatch_tasks: RwLock::new(FxHashMap::default()),
        }
    }

    /// Register a handler for `channel`. Subscribes to the bus on the
    /// channel's first registration; subsequent registrations just extend
    /// the fan-out set, so the Router never holds more than one
    /// subscription per channel (preventing the duplicated-subscription
    /// problem the teacher's adapter graph had).
    pub async fn register(&self, channel: &str, handler: Arc<dyn Handler>) -> anyhow::Result<()> {
        let needs_subscribe = {
            let mut handlers = self.handlers.write();
            let entry = handlers.entry(channel.to_string()).or_default();
            let first = entry.is_empty();
            entry.push(handler);
            first
        };

        if needs_subscribe {
            self.start_dispatch(channel).await?;
        }
        Ok(())
    }

    async fn start_dispatch(&self, channel: &str) -> anyhow::Result<()> {
        let mut subscription = self
            .bus
            .subscribe(channel)
            .await
            .map_err(|err| anyhow::anyhow!("subscribe to {channel}: {err}"))?;
        let handlers = self.handlers.clone();
        let channel_owned = channel.to_string();

        let task = tokio::spawn(async move {
            while let Some(payload) = subscription.recv().await {
                let snapshot: Vec<Arc<dyn Handler>> = handlers
                    .read()
                    .get(&channel_owned)
                    .cloned()
                    .unwrap_or_default();

                if snapshot.is_empty() {
                    continue;
                }

                let dispatches = snapshot.iter().map(|handler| {
                    let payload = payload.clone();
                    let handler = Arc::clone(handler);
                    async move {
                        if let Err(err) = handler.handle(&payload).await {
                            warn!(handler = handler.name(), error = %err, "handler failed");
                        }
                    }
                });
                futures::future::join_all(dispatches).await;
            }
            debug!(channel = %channel_owned, "dispatch loop ended (subscription closed)");
        });

        self.dispatch_tasks.write().insert(channel.to_string(), task);
        Ok(())
    }

    /// Remove every handler for `channel` and stop its dispatch loop.
    pub async fn unregister_all(&self, channel: &str) -> anyhow::Result<()> {
        self.handlers.write().remove(channel);
        if let Some(task) = self.dispatch_tasks.write().remove(channel) {
            task.abort();
        }
        self.bus.unsubscribe(channel).await?;
        Ok(())
    }

    pub fn handler_count(&self, channel: &str) -> usize {
        self.handlers.read().get(channel).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::FnHandler;
    use bus::LocalBus;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn fans_out_to_every_handler_exactly_once() {
        let bus: Arc<dyn BusClient> = Arc::new(LocalBus::new());
        let router = Router::new(bus.clone());

        let counter_a = Arc::new(AtomicUsize::new(0));
        let counter_b = Arc::new(AtomicUsize::new(0));
        let (ca, cb) = (counter_a.clone(), counter_b.clone());

        router
            .register(
                "topic",
                Arc::new(FnHandler::new("a", move |_payload| {
                    let ca = ca.clone();
                    async move {
                        ca.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })),
            )
            .await
            .unwrap();
        router
            .register(
                "topic",
                Arc::new(FnHandler::new("b", move |_payload| {
                    let cb = cb.clone();
                    async move {
                        cb.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })),
            )
            .await
            .unwrap();

        bus.publish("topic", "hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(counter_a.load(Ordering::SeqCst), 1);
        assert_eq!(counter_b.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn a_failing_handler_does_not_block_its_sibling() {
        let bus: Arc<dyn BusClient> = Arc::new(LocalBus::new());
        let router = Router::new(bus.clone());

        let succeeded = Arc::new(AtomicUsize::new(0));
        let succeeded_clone = succeeded.clone();

        router
            .register(
                "topic",
                Arc::new(FnHandler::new("failing", |_payload| async move {
                    anyhow::bail!("boom")
                })),
            )
            .await
            .unwrap();
        router
            .register(
                "topic",
                Arc::new(FnHandler::new("ok", move |_payload| {
                    let succeeded = succeeded_clone.clone();
                    async move {
                        succeeded.fetch_add(1, Ordering::SeqCst);
                        Ok(())
                    }
                })),
            )
            .await
            .unwrap();

        bus.publish("topic", "hello").await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(succeeded.load(Ordering::SeqCst), 1);
    }
}
