//! Orchestrator binary: subscribes to `to_orchestrator`, reasons over each
//! escalation/periodic summary with extended thinking, and dispatches the
//! resulting decision.

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use common::config::OrchestratorSettings;
use common::Channels;
use orchestrator::model::{ReasoningError, ReasoningModel};
use orchestrator::{context, Dispatcher, OrchestratorAgent};
use router::{Handler, Router};
use serde_json::Value;
use store::{InMemoryStore, KvStore, RedisStore};
use tracing::{error, info, warn};

const SERVICE_NAME: &str = "orchestrator";

/// Placeholder for the real extended-thinking endpoint (§1's Non-goals:
/// "LLM clients"); a production deployment swaps this for a real client
/// behind the same trait.
struct UnconfiguredModel;

#[async_trait]
impl ReasoningModel for UnconfiguredModel {
    async fn think(&self, _prompt: &str, _max_tokens: u32, _thinking_budget: u32) -> Result<String, ReasoningError> {
        Err(ReasoningError::Connection("no reasoning model configured".to_string()))
    }
}

struct DecisionHandler {
    agent: OrchestratorAgent,
    dispatcher: Dispatcher,
    store: Arc<dyn KvStore>,
}

#[async_trait]
impl Handler for DecisionHandler {
    async fn handle(&self, payload: &str) -> Result<()> {
        let message: Value = match serde_json::from_str(payload) {
            Ok(value) => value,
            Err(err) => {
                warn!(error = %err, "dropping malformed to_orchestrator envelope");
                return Ok(());
            }
        };

        let message_type = message.get("type").and_then(Value::as_str).unwrap_or("unknown");
        let source = message.get("source").and_then(Value::as_str).unwrap_or("unknown");
        let priority = message.get("priority").and_then(Value::as_str).unwrap_or("medium");

        let context = context::load(self.store.as_ref()).await;
        let decision = self.agent.process_with_thinking(message_type, source, priority, &message, &context).await;

        if let Err(err) = self.dispatcher.execute(&decision, &message).await {
            error!(error = %err, action = ?decision.action, "failed to execute decision");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "orchestrator.decision_handler"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing(SERVICE_NAME);
    info!("starting orchestrator service");

    let settings = OrchestratorSettings::from_env();
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
    let agent = OrchestratorAgent::new(model, settings.clone());
    let dispatcher = Dispatcher::new(bus.clone(), store.clone(), channels.clone(), settings);

    let router = Router::new(bus.clone());
    let handler = Arc::new(DecisionHandler { agent, dispatcher, store });
    router.register(&channels.to_orchestrator(), handler).await?;

    tokio::signal::ctrl_c().await?;
    info!("shutting down orchestrator service");
    Ok(())
}
