//! Full cross-service chain from §8's testable properties: a metric event
//! pushes an experiment over its failure criterion, the Metrics Monitor
//! raises an alert on `to_orchestrator`, and the Orchestrator turns that
//! alert into a `kill_experiment` decision the Dispatcher carries out.

use std::sync::Arc;
use std::time::Duration;

use bus::{BusClient, LocalBus};
use common::config::{CommonSettings, OrchestratorSettings};
use common::{Channels, Priority};
use orchestrator::decision::DecisionAction;
use orchestrator::{context, Dispatcher, OrchestratorAgent};
use redis_agent::{AlertGate, MetricsMonitor};
use store::{InMemoryStore, KvStore};
use test_utils::ScriptedModel;

fn orchestrator_settings() -> OrchestratorSettings {
    OrchestratorSettings {
        common: CommonSettings { bus_url: String::new(), redis_url: String::new(), channel_prefix: String::new() },
        thinking_timeout_seconds: 5,
        roundtable_timeout_seconds: 5,
        roundtable_max_rounds: 1,
        builder_timeout_seconds: 5,
        orchestrator_max_tokens: 1000,
        orchestrator_thinking_budget: 1000,
    }
}

#[tokio::test]
async fn a_failure_threshold_breach_reaches_the_orchestrator_and_archives_the_experiment() {
    let bus: Arc<dyn BusClient> = Arc::new(LocalBus::new());
    let store: Arc<dyn KvStore> = Arc::new(InMemoryStore::new());
    let channels = Channels::default();

    store.hash_set("experiments:e4", "state", "running").await.unwrap();
    store.hash_set("experiments:e4", "failure_criteria", r#"["response_rate < 0.05"]"#).await.unwrap();

    let gate = Arc::new(AlertGate::new(bus.clone(), channels.clone(), Duration::from_secs(300)));
    let monitor = MetricsMonitor::new(store.clone(), gate);

    let metric = serde_json::json!({
        "type": "metric_event",
        "source": "executor",
        "timestamp": "2026-07-28T00:00:00Z",
        "experiment_id": "e4",
        "response_rate": 0.01,
    });
    monitor.process_metric(&metric.to_string()).await;

    let mut incoming = bus.subscribe(&channels.to_orchestrator()).await.unwrap();
    monitor.check_thresholds_once().await;
    let alert_wire = incoming.recv().await.unwrap();
    assert!(alert_wire.contains("failure_threshold"));
    let alert: serde_json::Value = serde_json::from_str(&alert_wire).unwrap();

    let reasoning_reply = r#"{"action":"kill_experiment","reasoning":"response rate collapsed",
        "priority":"high","experiment_id":"e4"}"#;
    let agent = OrchestratorAgent::new(Arc::new(ScriptedModel::new(reasoning_reply)), orchestrator_settings());
    let context = context::load(store.as_ref()).await;
    let decision = agent
        .process_with_thinking(
            alert.get("type").and_then(serde_json::Value::as_str).unwrap_or("failure_threshold"),
            "redis_agent",
            "high",
            &alert,
            &context,
        )
        .await;
    assert_eq!(decision.action, DecisionAction::KillExperiment);
    assert_eq!(decision.priority, Priority::High);
    assert_eq!(decision.experiment_id.as_deref(), Some("e4"));

    let dispatcher = Dispatcher::new(bus.clone(), store.clone(), channels, orchestrator_settings());
    dispatcher.execute(&decision, &alert).await.unwrap();

    let fields = store.hash_get_all("experiments:e4").await.unwrap();
    assert_eq!(fields.get("state").map(String::as_str), Some("archived"));
    assert_eq!(fields.get("archived_by").map(String::as_str), Some("orchestrator"));
}
