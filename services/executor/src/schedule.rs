//! Schedule consultation: `schedules:{id}` is read by the Executor before a
//! run is attempted. `spec.md` §3 names the entity but its component
//! section doesn't spell out the read path; SPEC_FULL.md §9 supplements it
//! with `Executor::is_due` using the `cron` crate, mirroring the original's
//! executor main loop consulting the schedule hash before calling
//! `execute_experiment`.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule as CronSchedule;
use store::KvStore;

/// The `schedules:{id}` hash: `cron`, `timezone`, `enabled`.
#[derive(Debug, Clone)]
pub struct ExperimentSchedule {
    pub cron_expr: String,
    pub timezone: String,
    pub enabled: bool,
}

impl ExperimentSchedule {
    /// Read `schedules:{id}`. `None` if the hash doesn't exist — an
    /// experiment with no schedule is simply never polled.
    pub async fn load(store: &dyn KvStore, experiment_id: &str) -> Option<Self> {
        let key = format!("schedules:{experiment_id}");
        let fields = store.hash_get_all(&key).await.ok()?;
        if fields.is_empty() {
            return None;
        }
        Some(Self {
            cron_expr: fields.get("cron").cloned().unwrap_or_default(),
            timezone: fields.get("timezone").cloned().unwrap_or_else(|| "UTC".to_string()),
            enabled: fields.get("enabled").map(|v| v == "true" || v == "1").unwrap_or(true),
        })
    }

    /// Whether this schedule has a firing time in `(now - window, now]`.
    /// `window` should be the poller's own interval, so every tick sees
    /// each firing exactly once. A malformed cron expression is treated as
    /// "never due" (logged by the caller, not here).
    pub fn is_due(&self, now: DateTime<Utc>, window: Duration) -> bool {
        if !self.enabled || self.cron_expr.trim().is_empty() {
            return false;
        }
        let Ok(schedule) = CronSchedule::from_str(&self.cron_expr) else {
            return false;
        };
        let lookback = now - window;
        schedule.after(&lookback).take_while(|fire_time| *fire_time <= now).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use store::InMemoryStore;

    #[tokio::test]
    async fn missing_schedule_loads_as_none() {
        let store = InMemoryStore::new();
        assert!(ExperimentSchedule::load(&store, "e1").await.is_none());
    }

    #[tokio::test]
    async fn loads_fields_with_enabled_defaulting_true() {
        let store = InMemoryStore::new();
        store.hash_set("schedules:e1", "cron", "* * * * * *").await.unwrap();
        store.hash_set("schedules:e1", "timezone", "UTC").await.unwrap();

        let schedule = ExperimentSchedule::load(&store, "e1").await.unwrap();
        assert_eq!(schedule.cron_expr, "* * * * * *");
        assert!(schedule.enabled);
    }

    #[test]
    fn disabled_schedule_is_never_due() {
        let schedule = ExperimentSchedule { cron_expr: "* * * * * *".into(), timezone: "UTC".into(), enabled: false };
        assert!(!schedule.is_due(Utc::now(), Duration::seconds(30)));
    }

    #[test]
    fn malformed_cron_is_never_due_not_a_panic() {
        let schedule = ExperimentSchedule { cron_expr: "not a cron expr".into(), timezone: "UTC".into(), enabled: true };
        assert!(!schedule.is_due(Utc::now(), Duration::seconds(30)));
    }

    #[test]
    fn every_second_schedule_is_due_within_any_lookback_window() {
        let schedule = ExperimentSchedule { cron_expr: "* * * * * *".into(), timezone: "UTC".into(), enabled: true };
        assert!(schedule.is_due(Utc::now(), Duration::seconds(5)));
    }
}
