//! `fabric` — development launcher: wires every component of the fabric
//! against in-process backends (`LocalBus`, `InMemoryStore`) so a developer
//! can exercise the full escalation-to-alert control flow without a Redis
//! instance running.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use bus::{BusClient, LocalBus};
use clap::{Parser, Subcommand};
use common::messages::RawChatMessage;
use common::{Channels, Envelope};
use executor::{Runner, ToolError, ToolRegistry};
use orchestrator::model::{ReasoningError, ReasoningModel};
use orchestrator::{context, Dispatcher, OrchestratorAgent};
use redis_agent::{AlertGate, MetricsMonitor, SummaryModel, SummaryModelError};
use router::{Handler, Router};
use serde_json::Value;
use store::{InMemoryStore, KvStore};
use tracing::{error, info, Level};
use watcher::model::{ClassificationModel, ModelError, ResponseModel};
use watcher::{Classifier, Responder};

#[derive(Parser)]
#[command(name = "fabric")]
#[command(about = "GTM orchestration fabric - local development launcher")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Dev {
        #[command(subcommand)]
        subcommand: DevCommands,
    },
}

#[derive(Subcommand)]
enum DevCommands {
    /// Bring up every component in-process against `LocalBus`/`InMemoryStore`.
    Up {
        #[arg(long, default_value = "10000")]
        heartbeat_ms: u64,
    },
    /// Publish one escalation-worthy chat message and report whether the
    /// bus round-trips it.
    Ping,
}

/// Placeholder LLM/summary endpoints shared across every `dev` invocation.
/// Every call fails so the fail-safe paths (§4.3's escalate, §4.5's timeout
/// fallback, the redis agent's mechanical headline) are what a developer
/// sees without any credentials configured.
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

#[async_trait]
impl ReasoningModel for UnconfiguredModel {
    async fn think(&self, _prompt: &str, _max_tokens: u32, _thinking_budget: u32) -> Result<String, ReasoningError> {
        Err(ReasoningError::Connection("no reasoning model configured".to_string()))
    }
}

#[async_trait]
impl SummaryModel for UnconfiguredModel {
    async fn summarize(&self, _brief: &str) -> Result<String, SummaryModelError> {
        Err(SummaryModelError::Failed("no summary model configured".to_string()))
    }
}

struct Echo;

#[async_trait]
impl executor::Tool for Echo {
    fn name(&self) -> &str {
        "echo"
    }

    async fn execute(&self, params: &Value) -> Result<Value, ToolError> {
        Ok(params.clone())
    }
}

struct ChatHandler {
    classifier: Classifier,
    responder: Responder,
    bus: Arc<dyn BusClient>,
    store: Arc<dyn KvStore>,
    channels: Channels,
}

#[async_trait]
impl Handler for ChatHandler {
    async fn handle(&self, payload: &str) -> Result<()> {
        let envelope: Envelope<RawChatMessage> = common::envelope::decode(payload)?;
        let classification = self.classifier.classify(&envelope.payload).await;
        info!(action = ?classification.action, "dev fabric classified a chat message");

        match classification.action {
            watcher::classification::ClassificationAction::Ignore => Ok(()),
            watcher::classification::ClassificationAction::Answer => {
                let content = self.responder.respond(&envelope.payload, &classification, self.store.as_ref()).await?;
                info!(content, "dev fabric answered directly");
                Ok(())
            }
            watcher::classification::ClassificationAction::Escalate => {
                let escalation = Envelope::new(
                    "escalation",
                    "watcher",
                    common::messages::Escalation {
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
        "dev.chat_handler"
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
        let message: Value = serde_json::from_str(payload)?;
        let message_type = message.get("type").and_then(Value::as_str).unwrap_or("unknown");
        let source = message.get("source").and_then(Value::as_str).unwrap_or("unknown");
        let priority = message.get("priority").and_then(Value::as_str).unwrap_or("medium");

        let context = context::load(self.store.as_ref()).await;
        let decision = self.agent.process_with_thinking(message_type, source, priority, &message, &context).await;
        info!(action = ?decision.action, "dev fabric orchestrator decided");

        if let Err(err) = self.dispatcher.execute(&decision, &message).await {
            error!(error = %err, "dev fabric dispatcher failed");
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "dev.decision_handler"
    }
}

struct MetricHandler {
    monitor: Arc<MetricsMonitor>,
}

#[async_trait]
impl Handler for MetricHandler {
    async fn handle(&self, payload: &str) -> Result<()> {
        self.monitor.process_metric(payload).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "dev.metric_handler"
    }
}

async fn poll_due_experiments(runner: &Runner, store: &dyn KvStore, poll_window: chrono::Duration) {
    let Ok(keys) = store.scan_keys("experiments:*").await else { return };
    let now = chrono::Utc::now();
    for key in keys {
        let Some(experiment_id) = key.strip_prefix("experiments:") else { continue };
        let Some(schedule) = executor::ExperimentSchedule::load(store, experiment_id).await else { continue };
        if schedule.is_due(now, poll_window) {
            runner.execute_experiment(experiment_id).await;
        }
    }
}

async fn run_dev_up(heartbeat_ms: u64) -> Result<()> {
    info!("starting in-process fabric (LocalBus + InMemoryStore)");

    let channels = Channels::default();
    let bus: Arc<dyn BusClient> = Arc::new(LocalBus::new());
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
    let model = Arc::new(UnconfiguredModel);

    let router = Router::new(bus.clone());

    let watcher_settings = common::config::WatcherSettings::from_env();
    let classifier = Classifier::new(model.clone(), watcher_settings.clone());
    let responder = Responder::new(model.clone(), watcher_settings);
    router
        .register(
            &channels.chat_raw(),
            Arc::new(ChatHandler {
                classifier,
                responder,
                bus: bus.clone(),
                store: store.clone(),
                channels: channels.clone(),
            }),
        )
        .await?;

    let orchestrator_settings = common::config::OrchestratorSettings::from_env();
    let agent = OrchestratorAgent::new(model.clone(), orchestrator_settings.clone());
    let dispatcher = Dispatcher::new(bus.clone(), store.clone(), channels.clone(), orchestrator_settings);
    router
        .register(&channels.to_orchestrator(), Arc::new(DecisionHandler { agent, dispatcher, store: store.clone() }))
        .await?;

    let executor_settings = common::config::ExecutorSettings::from_env();
    let tools = ToolRegistry::new();
    tools.register(Arc::new(Echo));
    let runner = Arc::new(Runner::new(
        bus.clone(),
        store.clone(),
        channels.clone(),
        tools,
        Duration::from_secs(executor_settings.tool_execution_timeout_seconds),
    ));

    let redis_agent_settings = common::config::RedisAgentSettings::from_env();
    let gate = Arc::new(AlertGate::new(
        bus.clone(),
        channels.clone(),
        Duration::from_secs(redis_agent_settings.alert_cooldown_seconds.max(0) as u64),
    ));
    let monitor = Arc::new(MetricsMonitor::new(store.clone(), gate));
    router.register(&channels.metrics(), Arc::new(MetricHandler { monitor: monitor.clone() })).await?;

    info!("watcher, orchestrator, executor, redis agent all wired up on one in-process bus");
    info!("System running. Press Ctrl+C to stop.");

    let summary_model = Arc::new(UnconfiguredModel);

    let mut heartbeat = tokio::time::interval(Duration::from_millis(heartbeat_ms));
    let mut threshold_ticker =
        tokio::time::interval(Duration::from_secs(redis_agent_settings.threshold_check_interval_seconds));
    let mut summary_ticker = tokio::time::interval(Duration::from_secs(redis_agent_settings.summary_interval_seconds));
    let poll_window = chrono::Duration::seconds(executor_settings.poll_interval_seconds as i64);
    let mut executor_ticker = tokio::time::interval(Duration::from_secs(executor_settings.poll_interval_seconds));

    loop {
        tokio::select! {
            _ = heartbeat.tick() => {
                info!("heartbeat: fabric alive");
            }
            _ = threshold_ticker.tick() => {
                monitor.check_thresholds_once().await;
            }
            _ = summary_ticker.tick() => {
                redis_agent::publish_periodic_summary(
                    bus.as_ref(),
                    store.as_ref(),
                    monitor.as_ref(),
                    summary_model.as_ref(),
                    &channels,
                ).await;
            }
            _ = executor_ticker.tick() => {
                poll_due_experiments(&runner, store.as_ref(), poll_window).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down in-process fabric");
                return Ok(());
            }
        }
    }
}

async fn run_dev_ping() -> Result<()> {
    let channels = Channels::default();
    let bus: Arc<dyn BusClient> = Arc::new(LocalBus::new());
    let mut sub = bus.subscribe(&channels.chat_raw()).await?;

    let raw = RawChatMessage {
        username: "dev".to_string(),
        channel_id: "dev-channel".to_string(),
        channel_name: "dev-channel".to_string(),
        content: "fabric liveness ping".to_string(),
        mentions_bot: true,
    };
    let envelope = Envelope::new("raw_chat_message", "cli", raw);
    let wire = common::envelope::encode(&envelope)?;
    bus.publish(&channels.chat_raw(), &wire).await?;

    match tokio::time::timeout(Duration::from_millis(50), sub.recv()).await {
        Ok(Some(_)) => info!("fabric bus is alive: chat.raw round-tripped the ping"),
        _ => info!("fabric bus did not deliver the ping within the deadline"),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .with_timer(tracing_subscriber::fmt::time::uptime())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Dev { subcommand } => match subcommand {
            DevCommands::Up { heartbeat_ms } => run_dev_up(heartbeat_ms).await?,
            DevCommands::Ping => run_dev_ping().await?,
        },
    }

    Ok(())
}
