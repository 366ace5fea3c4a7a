//! Executor binary: on a timer, scans `experiments:*` for active
//! experiments whose `schedules:{id}` is due and runs them.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use chrono::Utc;
use common::config::ExecutorSettings;
use common::Channels;
use executor::{ExperimentSchedule, Runner, ToolRegistry};
use store::{InMemoryStore, KvStore, RedisStore};
use tracing::{debug, error, info};

const SERVICE_NAME: &str = "executor";

/// Scan every `experiments:*` hash and run whichever are active and due.
/// Experiments with no `schedules:{id}` entry are never polled — a run
/// must be scheduled explicitly.
async fn poll_once(runner: &Runner, store: &dyn KvStore, poll_window: chrono::Duration) {
    let keys = match store.scan_keys("experiments:*").await {
        Ok(keys) => keys,
        Err(err) => {
            error!(error = %err, "failed to scan experiments during poll");
            return;
        }
    };

    let now = Utc::now();
    for key in keys {
        let Some(experiment_id) = key.strip_prefix("experiments:") else { continue };

        let Some(schedule) = ExperimentSchedule::load(store, experiment_id).await else {
            debug!(experiment_id, "no schedule configured, skipping poll");
            continue;
        };

        if schedule.is_due(now, poll_window) {
            runner.execute_experiment(experiment_id).await;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    common::telemetry::init_tracing(SERVICE_NAME);
    info!("starting executor service");

    let settings = ExecutorSettings::from_env();
    let channels = Channels::new(settings.common.channel_prefix.clone());

    let bus: Arc<dyn bus::BusClient> = Arc::new(bus::RedisBus::connect(&settings.common.bus_url).await?);
    let store: Arc<dyn KvStore> = match RedisStore::connect(&settings.common.redis_url).await {
        Ok(redis_store) => Arc::new(redis_store),
        Err(err) => {
            error!(error = %err, "could not connect to redis store, falling back to in-memory");
            Arc::new(InMemoryStore::new())
        }
    };

    let tools = ToolRegistry::new();
    let runner = Runner::new(
        bus,
        store.clone(),
        channels,
        tools,
        Duration::from_secs(settings.tool_execution_timeout_seconds),
    );

    let poll_interval = Duration::from_secs(settings.poll_interval_seconds);
    let poll_window = chrono::Duration::seconds(settings.poll_interval_seconds as i64);
    let mut ticker = tokio::time::interval(poll_interval);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                poll_once(&runner, store.as_ref(), poll_window).await;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down executor service");
                return Ok(());
            }
        }
    }
}
