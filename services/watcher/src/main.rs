//! Watcher binary: subscribes to `chat.raw`, classifies each message, and
//! either answers directly or escalates to the Orchestrator.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use common::config::WatcherSettings;
use common::envelope::{decode, Envelope};
use common::messages::{Escalation, RawChatMessage, WatcherResponse};
use common::Channels;
use router::{Handler, Router};
use store::{InMemoryStore, KvStore, RedisStore};
use tracing::{error, info, warn};
use watcher::classification::ClassificationAction;
use watcher::{Classifier, ClassificationModel, ModelError, Responder, ResponseModel};

const SERVICE_NAME: &str = "watcher";

/// Placeholder for the real reasoning endpoint. Building an actual LLM
/// client is out of scope here (the fabric treats it as an opaque
/// collaborator); a production deployment swaps this for a real client
/// behind the same trait.
struct UnconfiguredModel;

#[async_trait]
impl ClassificationModel for UnconfiguredModel {
    async fn classify_raw(&self, _prompt: &str, _temperature: f64, _max_tokens: u32) -> Result<String, ModelError> {
        Err(ModelError::NonTransient("no classification model configured".to_string()))
    }
}

#[async_trait]
impl ResponseModel for UnconfiguredModel {
    async fn respond_raw(&self, _prompt: &str, _temperature: f64, _max_tokens: u32) -> Result<String, ModelError> {
        Err(ModelError::NonTransient("no response model configured".to_string()))
    }
}

struct ChatHandler {
    classifier: Classifier,
    responder: Responder,
    bus: Arc<dyn bus::BusClient>,
    store: Arc<dyn KvStore>,
    channels: Channels,
}

#[async_trait]
impl Handler for ChatHandler {
    async fn handle(&self, payload: &str) -> Result<()> {
        let envelope: Envelope<RawChatMessage> = match decode(payload) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping malformed chat.raw envelope");
                return Ok(());
            }
        };

        let classification = self.classifier.classify(&envelope.payload).await;
        info!(
            action = ?classification.action,
            priority = %classification.priority,
            "classified chat message"
        );

        match classification.action {
            ClassificationAction::Ignore => Ok(()),
            ClassificationAction::Answer => {
                let content = self
                    .responder
                    .respond(&envelope.payload, &classification, self.store.as_ref())
                    .await?;
                let response = Envelope::new(
                    "watcher_response",
                    SERVICE_NAME,
                    WatcherResponse { channel_id: envelope.payload.channel_id.clone(), content },
                );
                let wire = common::envelope::encode(&response)?;
                self.bus.publish(&self.channels.from_orchestrator(), &wire).await?;
                Ok(())
            }
            ClassificationAction::Escalate => {
                let escalation = Envelope::new(
                    "escalation",
                    SERVICE_NAME,
                    Escalation {
                        reason: classification.reason.clone(),
                        priority: classification.priority,
                        original_message: envelope.payload.clone(),
                        suggested_response: classification.suggested_response.clone(),
                    },
                );
                let wire = common::envelope::encode(&escalation)?;
                self.bus.publish(&self.channels.to_orchestrator(), &wire).await?;
                Ok(())
            }
        }
    }

    fn name(&self) -> &str {
        "watcher.chat_handler"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing(SERVICE_NAME);
    info!("starting watcher service");

    let settings = WatcherSettings::from_env();
    let channels = Channels::new(settings.common.channel_prefix.clone());

    let bus: Arc<dyn bus::BusClient> = Arc::new(bus::RedisBus::connect(&settings.common.bus_url).await?);
    let store: Arc<dyn KvStore> = match RedisStore::connect(&settings.common.redis_url).await {
        Ok(redis_store) => Arc::new(redis_store),
        Err(err) => {
            error!(error = %err, "could not connect to redis store, falling back to in-memory");
            Arc::new(InMemoryStore::new())
        }
    };

    let model = Arc::new(UnconfiguredModel);
    let classifier = Classifier::new(model.clone(), settings.clone());
    let responder = Responder::new(model, settings);

    let router = Router::new(bus.clone());
    let handler = Arc::new(ChatHandler { classifier, responder, bus, store, channels: channels.clone() });
    router.register(&channels.chat_raw(), handler).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down watcher service");
    Ok(())
}
