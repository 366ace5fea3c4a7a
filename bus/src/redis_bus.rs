//! Redis-backed bus: reconnect with bounded exponential backoff, degraded
//! mode when the broker is unreachable, resubscribe-before-connected.
//!
//! Grounded on `original_source/services/discord/core/bus.py`'s `RedisBus`
//! (connect/publish/subscribe/unsubscribe/_listen/_dispatch) for behavior;
//! the reconnect-capable connection type follows
//! `services/data-aggregator/src/storage/mod.rs`'s use of
//! `redis::aio::ConnectionManager`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use parking_lot::RwLock;
use redis::AsyncCommands;
use rustc_hash::FxHashMap;
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::client::{BusClient, Subscription};
use crate::error::BusError;

const RECONNECT_BASE_DELAY: Duration = Duration::from_millis(200);
const RECONNECT_CEILING: Duration = Duration::from_secs(5);

struct Shared {
    broadcasters: RwLock<FxHashMap<String, broadcast::Sender<String>>>,
    reconnect_count: AtomicU64,
    connected: watch::Sender<bool>,
    /// Tells the live listener session to issue a Redis `SUBSCRIBE` for a
    /// channel right away, so a `subscribe()` call after startup doesn't
    /// have to wait for the next reconnect cycle to actually receive
    /// anything (see `run_session`'s select loop).
    subscribe_requests: mpsc::UnboundedSender<String>,
    /// `None` while the bus is in degraded mode (broker unreachable at
    /// construction, or the publish side dropped) — owned here rather than
    /// on `RedisBus` directly so the listener task can heal it once the
    /// broker becomes reachable again (see `ensure_publish_conn`).
    publish_conn: tokio::sync::Mutex<Option<redis::aio::ConnectionManager>>,
}

/// A Redis-backed [`BusClient`]. Publishing uses a `ConnectionManager`
/// (Redis's own built-in reconnect-on-use); subscriptions are served by one
/// long-lived background task that owns the pub/sub connection, reconnects
/// it on failure, and fans incoming messages out to per-channel broadcast
/// senders so multiple in-process `subscribe()` calls share one Redis
/// subscription per channel.
pub struct RedisBus {
    url: String,
    shared: Arc<Shared>,
    listener: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
    connected_rx: watch::Receiver<bool>,
}

impl RedisBus {
    /// Connect to `url`. Per §4.1, an unreachable broker at construction
    /// time does not fail this call: it starts the bus in degraded mode
    /// (`publish` logs and returns `Ok(0)`, `subscribe` still registers
    /// in-process but never receives anything) and lets the background
    /// listener's reconnect loop heal both the subscribe and publish sides
    /// once the broker becomes reachable. Only a malformed `url` (a
    /// configuration error, not a connectivity one) returns `Err` here.
    pub async fn connect(url: impl Into<String>) -> Result<Self, BusError> {
        let url = url.into();
        let client = redis::Client::open(url.as_str())?;

        let publish_conn = match redis::aio::ConnectionManager::new(client.clone()).await {
            Ok(conn) => Some(conn),
            Err(err) => {
                warn!(
                    error = %err,
                    url,
                    "redis broker unreachable at startup, starting bus in degraded mode \
                     (publish/subscribe are logging no-ops until a connection is established)"
                );
                None
            }
        };

        let (connected_tx, connected_rx) = watch::channel(false);
        let (subscribe_tx, subscribe_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            broadcasters: RwLock::new(FxHashMap::default()),
            reconnect_count: AtomicU64::new(0),
            connected: connected_tx,
            subscribe_requests: subscribe_tx,
            publish_conn: tokio::sync::Mutex::new(publish_conn),
        });

        let bus = Self { url, shared: shared.clone(), listener: tokio::sync::Mutex::new(None), connected_rx };

        let handle = spawn_listener(client, shared, subscribe_rx);
        *bus.listener.lock().await = Some(handle);
        Ok(bus)
    }

    /// Number of times the pub/sub connection has been re-established.
    pub fn reconnect_count(&self) -> u64 {
        self.shared.reconnect_count.load(Ordering::Relaxed)
    }

    fn get_or_create_broadcaster(&self, channel: &str) -> broadcast::Sender<String> {
        if let Some(tx) = self.shared.broadcasters.read().get(channel) {
            return tx.clone();
        }
        let mut broadcasters = self.shared.broadcasters.write();
        broadcasters
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(1024).0)
            .clone()
    }
}

#[async_trait]
impl BusClient for RedisBus {
    async fn publish(&self, channel: &str, payload: &str) -> Result<u64, BusError> {
        let mut guard = self.shared.publish_conn.lock().await;
        let conn = match guard.as_mut() {
            Some(conn) => conn,
            None => {
                warn!(channel, "redis bus degraded, dropping publish (broker unreachable)");
                return Ok(0);
            }
        };
        match conn.publish(channel, payload).await {
            Ok(delivered) => Ok(delivered),
            Err(err) => {
                warn!(error = %err, channel, "publish failed, redis bus is degraded until reconnect");
                *guard = None;
                Ok(0)
            }
        }
    }

    async fn subscribe(&self, channel: &str) -> Result<Subscription, BusError> {
        let is_new = !self.shared.broadcasters.read().contains_key(channel);
        let tx = self.get_or_create_broadcaster(channel);
        if is_new {
            // Ask the live listener session to issue a Redis SUBSCRIBE now
            // rather than waiting for the next reconnect's resubscribe pass.
            // If the listener has exited the request is simply dropped; the
            // next reconnect still picks this channel up from the map.
            let _ = self.shared.subscribe_requests.send(channel.to_string());
        }
        Ok(Subscription::new(tx.subscribe()))
    }

    async fn unsubscribe(&self, channel: &str) -> Result<(), BusError> {
        self.shared.broadcasters.write().remove(channel);
        Ok(())
    }

    async fn disconnect(&self) -> Result<(), BusError> {
        if let Some(handle) = self.listener.lock().await.take() {
            handle.abort();
        }
        self.shared.publish_conn.lock().await.take();
        self.shared.broadcasters.write().clear();
        let _ = self.shared.connected.send(false);
        info!(url = %self.url, "disconnected from redis bus");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        *self.connected_rx.borrow()
    }
}

/// Owns the pub/sub connection for the lifetime of the bus. On any
/// failure it backs off exponentially (base 200ms, ceiling 5s), reconnects,
/// resubscribes to every channel with an active broadcaster, and only then
/// flips `connected` — so a subscriber never observes "connected" while a
/// channel it cares about is still unsubscribed.
fn spawn_listener(
    client: redis::Client,
    shared: Arc<Shared>,
    mut subscribe_rx: mpsc::UnboundedReceiver<String>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut backoff = RECONNECT_BASE_DELAY;
        loop {
            match run_session(&client, &shared, &mut subscribe_rx).await {
                Ok(()) => {
                    // Clean shutdown requested (listener dropped); stop looping.
                    break;
                }
                Err(err) => {
                    let _ = shared.connected.send(false);
                    shared.reconnect_count.fetch_add(1, Ordering::Relaxed);
                    warn!(error = %err, backoff_ms = backoff.as_millis(), "redis bus disconnected, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, RECONNECT_CEILING);
                }
            }
        }
    })
}

/// Lazily (re)establish the publish-side connection if it's currently
/// `None` (degraded). Called on every (re)connect attempt so a broker that
/// was down at `connect()` time, or dropped mid-flight by a failed
/// `publish`, heals without a service restart.
async fn ensure_publish_conn(client: &redis::Client, shared: &Arc<Shared>) {
    let mut guard = shared.publish_conn.lock().await;
    if guard.is_some() {
        return;
    }
    match redis::aio::ConnectionManager::new(client.clone()).await {
        Ok(conn) => {
            info!("redis bus publish connection (re)established");
            *guard = Some(conn);
        }
        Err(err) => {
            warn!(error = %err, "redis bus publish side still unreachable, remaining in degraded mode");
        }
    }
}

async fn run_session(
    client: &redis::Client,
    shared: &Arc<Shared>,
    subscribe_rx: &mut mpsc::UnboundedReceiver<String>,
) -> Result<(), BusError> {
    let conn = client.get_async_connection().await?;
    let mut pubsub = conn.into_pubsub();

    let channels: Vec<String> = shared.broadcasters.read().keys().cloned().collect();
    for channel in &channels {
        pubsub.subscribe(channel).await?;
    }

    ensure_publish_conn(client, shared).await;

    let _ = shared.connected.send(true);
    debug!(channels = channels.len(), "redis bus (re)connected");

    loop {
        tokio::select! {
            biased;

            request = subscribe_rx.recv() => {
                match request {
                    Some(channel) => {
                        if let Err(err) = pubsub.subscribe(&channel).await {
                            warn!(error = %err, %channel, "failed to subscribe to new channel, will retry on reconnect");
                            return Err(BusError::Redis(err));
                        }
                        debug!(%channel, "subscribed to new channel on live connection");
                    }
                    None => return Err(BusError::ChannelClosed),
                }
            }

            message = pubsub.on_message().next() => {
                match message {
                    Some(msg) => {
                        let channel = msg.get_channel_name().to_string();
                        let payload: String = match msg.get_payload() {
                            Ok(p) => p,
                            Err(err) => {
                                warn!(error = %err, %channel, "dropping undecodable redis payload");
                                continue;
                            }
                        };
                        if let Some(tx) = shared.broadcasters.read().get(&channel) {
                            let _ = tx.send(payload);
                        } else {
                            error!(%channel, "received message for channel with no broadcaster");
                        }
                    }
                    None => return Err(BusError::ChannelClosed),
                }
            }
        }
    }
}
