//! Redis Agent binary: subscribes to `metrics`, runs the §4.7 threshold
//! sweep on a timer, and publishes the §9-supplemented periodic digest.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use common::config::RedisAgentSettings;
use common::Channels;
use redis_agent::{AlertGate, MetricsMonitor, SummaryModel, SummaryModelError};
use router::{Handler, Router};
use store::{InMemoryStore, KvStore, RedisStore};
use tracing::{error, info};

const SERVICE_NAME: &str = "redis_agent";

/// Placeholder for the real summarizer endpoint; a production deployment
/// swaps this for a real client behind the same trait.
struct UnconfiguredModel;

#[async_trait]
impl SummaryModel for UnconfiguredModel {
    async fn summarize(&self, _brief: &str) -> Result<String, SummaryModelError> {
        Err(SummaryModelError::Failed("no summary model configured".to_string()))
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
        "redis_agent.metric_handler"
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing(SERVICE_NAME);
    info!("starting redis agent service");

    let settings = RedisAgentSettings::from_env();
    let channels = Channels::new(settings.common.channel_prefix.clone());

    let bus: Arc<dyn bus::BusClient> = Arc::new(bus::RedisBus::connect(&settings.common.bus_url).await?);
    let store: Arc<dyn KvStore> = match RedisStore::connect(&settings.common.redis_url).await {
        Ok(redis_store) => Arc::new(redis_store),
        Err(err) => {
            error!(error = %err, "could not connect to redis store, falling back to in-memory");
            Arc::new(InMemoryStore::new())
        }
    };

    let gate = Arc::new(AlertGate::new(
        bus.clone(),
        channels.clone(),
        Duration::from_secs(settings.alert_cooldown_seconds.max(0) as u64),
    ));
    let monitor = Arc::new(MetricsMonitor::new(store.clone(), gate));
    let summary_model = Arc::new(UnconfiguredModel);

    let router = Router::new(bus.clone());
    let handler = Arc::new(MetricHandler { monitor: monitor.clone() });
    router.register(&channels.metrics(), handler).await?;

    let mut threshold_ticker = tokio::time::interval(Duration::from_secs(settings.threshold_check_interval_seconds));
    let mut summary_ticker = tokio::time::interval(Duration::from_secs(settings.summary_interval_seconds));

    loop {
        tokio::select! {
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
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down redis agent service");
                return Ok(());
            }
        }
    }
}
