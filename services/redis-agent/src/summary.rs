//! Periodic experiment digest published to `to_orchestrator` on a timer
//! (grounded on `original_source/services/redis_agent/analyzer.py::
//! run_periodic_summaries`/`generate_summary`; the LLM call itself is out of
//! scope per §1's Non-goals, so [`SummaryModel`] is the same opaque-model
//! seam `watcher::model::ResponseModel` uses).

use std::sync::Arc;

use async_trait::async_trait;
use common::messages::PeriodicSummary;
use common::{Channels, Envelope};
use store::KvStore;
use thiserror::Error;
use tracing::{info, warn};

use crate::monitor::MetricsMonitor;

const SERVICE_NAME: &str = "redis_agent";

#[derive(Debug, Error)]
pub enum SummaryModelError {
    #[error("summary model call failed: {0}")]
    Failed(String),
}

/// The LLM endpoint that drafts the headline. Unconfigured deployments use
/// a model that always errors; the task falls back to a mechanical headline
/// (`analyzer.py`'s "Gemini not configured" mock summary).
#[async_trait]
pub trait SummaryModel: Send + Sync {
    async fn summarize(&self, brief: &str) -> Result<String, SummaryModelError>;
}

fn mechanical_headline(active: u64, total: u64) -> String {
    format!("{active} of {total} experiments active; no summary model configured")
}

/// Build and publish one periodic summary. Skipped entirely if there are no
/// experiments at all, matching `run_periodic_summaries`'s
/// "no experiments, skip" short circuit.
pub async fn publish_periodic_summary(
    bus: &dyn bus::BusClient,
    store: &dyn KvStore,
    monitor: &MetricsMonitor,
    model: &dyn SummaryModel,
    channels: &Channels,
) {
    let keys = match store.scan_keys("experiments:*").await {
        Ok(keys) => keys,
        Err(err) => {
            warn!(error = %err, "failed to scan experiments for periodic summary");
            return;
        }
    };
    if keys.is_empty() {
        return;
    }

    let mut active = 0u64;
    let mut briefs = Vec::new();
    for key in &keys {
        let Some(experiment_id) = key.strip_prefix("experiments:") else { continue };
        let Ok(fields) = store.hash_get_all(key).await else { continue };
        let state = fields.get("state").map(String::as_str).unwrap_or("");
        if matches!(state.trim(), "" | "active" | "running") {
            active += 1;
        }

        if let Ok(current) = monitor.get_current_metrics(experiment_id).await {
            let mut parts: Vec<String> = current
                .values
                .iter()
                .map(|(name, value)| format!("{name}={value:.3}"))
                .collect();
            parts.sort();
            parts.truncate(5);
            let brief = if parts.is_empty() { "no metrics yet".to_string() } else { parts.join(", ") };
            briefs.push(format!("- {experiment_id}: {brief}"));
        }
    }

    let total = keys.len() as u64;
    let brief_text = briefs.join("\n");
    let headline = match model.summarize(&brief_text).await {
        Ok(text) => text,
        Err(err) => {
            warn!(error = %err, "summary model unavailable, using mechanical headline");
            mechanical_headline(active, total)
        }
    };

    let envelope = Envelope::new(
        "periodic_summary",
        SERVICE_NAME,
        PeriodicSummary { active_experiments: active, total_experiments: total, headline: headline.clone() },
    );
    let Ok(wire) = common::envelope::encode(&envelope) else {
        warn!("failed to encode periodic summary envelope");
        return;
    };
    if let Err(err) = bus.publish(&channels.to_orchestrator(), &wire).await {
        warn!(error = %err, "failed to publish periodic summary");
        return;
    }
    info!(active, total, "published periodic summary");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::AlertGate;
    use bus::LocalBus;
    use std::time::Duration;
    use store::InMemoryStore;

    struct UnconfiguredModel;

    #[async_trait]
    impl SummaryModel for UnconfiguredModel {
        async fn summarize(&self, _brief: &str) -> Result<String, SummaryModelError> {
            Err(SummaryModelError::Failed("no model configured".to_string()))
        }
    }

    #[tokio::test]
    async fn skips_publishing_with_no_experiments_at_all() {
        let store = InMemoryStore::new();
        let bus = Arc::new(LocalBus::new());
        let gate = Arc::new(AlertGate::new(bus.clone(), Channels::default(), Duration::from_secs(300)));
        let monitor = MetricsMonitor::new(Arc::new(InMemoryStore::new()), gate);
        let mut sub = bus.subscribe("to_orchestrator").await.unwrap();

        publish_periodic_summary(bus.as_ref(), &store, &monitor, &UnconfiguredModel, &Channels::default()).await;

        assert!(tokio::time::timeout(Duration::from_millis(50), sub.recv()).await.is_err());
    }

    #[tokio::test]
    async fn falls_back_to_a_mechanical_headline_when_the_model_errors() {
        let store = Arc::new(InMemoryStore::new());
        store.hash_set("experiments:e1", "state", "active").await.unwrap();
        let bus = Arc::new(LocalBus::new());
        let gate = Arc::new(AlertGate::new(bus.clone(), Channels::default(), Duration::from_secs(300)));
        let monitor = MetricsMonitor::new(store.clone(), gate);
        let mut sub = bus.subscribe("to_orchestrator").await.unwrap();

        publish_periodic_summary(bus.as_ref(), store.as_ref(), &monitor, &UnconfiguredModel, &Channels::default()).await;

        let message = sub.recv().await.unwrap();
        assert!(message.contains("periodic_summary"));
        assert!(message.contains("1 of 1 experiments active"));
    }
}
