//! The Alert Gate: dedup + cooldown window per `(experiment_id, alert_type)`
//! before publishing to `to_orchestrator` (grounded on
//! `original_source/services/redis_agent/alerts.py::send_alert`/
//! `clear_cooldown`).

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use common::{Channels, Envelope};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use serde_json::Value;
use tracing::{debug, info, warn};

const SERVICE_NAME: &str = "redis_agent";

/// One alert kind the Monitor raises. `as_str` feeds both the envelope's
/// `type` discriminator and the cooldown key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    Error,
    SuccessThreshold,
    FailureThreshold,
}

impl AlertKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Error => "error",
            Self::SuccessThreshold => "success_threshold",
            Self::FailureThreshold => "failure_threshold",
        }
    }
}

/// An alert before it is stamped with `source`/`timestamp` and published.
#[derive(Debug, Clone)]
pub struct AlertDraft {
    pub kind: AlertKind,
    pub experiment_id: String,
    pub criterion: Option<String>,
    pub current_value: Option<Value>,
    pub message: String,
    pub severity: Option<String>,
}

/// `(experiment_id, alert_type) -> last-sent monotonic instant`. Guarded by
/// a single mutex per §5's "in-process shared state" policy; the critical
/// section is the cooldown check-and-update, kept O(1).
#[derive(Default)]
pub struct GateState {
    last_sent: Mutex<FxHashMap<(String, String), Instant>>,
}

impl GateState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Publishes alerts on `to_orchestrator` with per-`(experiment_id, type)`
/// cooldown suppression. Constructed once per service and shared with the
/// Metrics Monitor.
pub struct AlertGate {
    bus: Arc<dyn bus::BusClient>,
    channels: Channels,
    cooldown: Duration,
    state: Arc<GateState>,
}

impl AlertGate {
    pub fn new(bus: Arc<dyn bus::BusClient>, channels: Channels, cooldown: Duration) -> Self {
        Self { bus, channels, cooldown, state: Arc::new(GateState::new()) }
    }

    #[cfg(test)]
    fn with_state(bus: Arc<dyn bus::BusClient>, channels: Channels, cooldown: Duration, state: Arc<GateState>) -> Self {
        Self { bus, channels, cooldown, state }
    }

    /// Send `alert`, returning whether it was actually published (`false`
    /// if suppressed by cooldown). The cooldown timestamp is updated
    /// *before* publishing so two concurrent callers racing on the same
    /// key both observe a consistent, already-updated cooldown state.
    pub async fn send_alert(&self, alert: AlertDraft) -> bool {
        let key = (alert.experiment_id.clone(), alert.kind.as_str().to_string());
        let now = Instant::now();

        {
            let mut guard = self.state.last_sent.lock();
            if let Some(last) = guard.get(&key) {
                if now.duration_since(*last) < self.cooldown {
                    debug!(
                        experiment_id = %alert.experiment_id,
                        alert_type = alert.kind.as_str(),
                        "alert skipped (cooldown)"
                    );
                    return false;
                }
            }
            guard.insert(key, now);
        }

        let payload = common::messages::Alert {
            experiment_id: alert.experiment_id.clone(),
            criterion: alert.criterion,
            current_value: alert.current_value.as_ref().and_then(Value::as_f64),
            message: alert.message,
            severity: alert.severity,
        };
        let envelope = Envelope::new(alert.kind.as_str(), SERVICE_NAME, payload);
        let wire = match common::envelope::encode(&envelope) {
            Ok(wire) => wire,
            Err(err) => {
                warn!(error = %err, "failed to encode alert envelope");
                return false;
            }
        };

        if let Err(err) = self.bus.publish(&self.channels.to_orchestrator(), &wire).await {
            warn!(error = %err, "failed to publish alert");
            return false;
        }

        info!(
            experiment_id = %alert.experiment_id,
            alert_type = alert.kind.as_str(),
            timestamp = %Utc::now(),
            "alert sent"
        );
        true
    }

    /// Remove cooldown entries matching `experiment_id`/`alert_type` (`None`
    /// matches every value for that axis). A test-only hook per §4.8.
    pub fn clear_cooldown(&self, experiment_id: Option<&str>, alert_type: Option<&str>) {
        let mut guard = self.state.last_sent.lock();
        if experiment_id.is_none() && alert_type.is_none() {
            guard.clear();
            return;
        }
        guard.retain(|(id, kind), _| {
            let id_matches = experiment_id.map(|wanted| wanted == id).unwrap_or(true);
            let kind_matches = alert_type.map(|wanted| wanted == kind).unwrap_or(true);
            !(id_matches && kind_matches)
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bus::LocalBus;

    fn draft(kind: AlertKind, experiment_id: &str) -> AlertDraft {
        AlertDraft {
            kind,
            experiment_id: experiment_id.to_string(),
            criterion: None,
            current_value: None,
            message: "test alert".to_string(),
            severity: None,
        }
    }

    fn gate() -> (AlertGate, Arc<LocalBus>) {
        let bus = Arc::new(LocalBus::new());
        let gate = AlertGate::new(bus.clone(), Channels::default(), Duration::from_secs(300));
        (gate, bus)
    }

    #[tokio::test]
    async fn first_alert_for_a_key_always_sends() {
        let (gate, bus) = gate();
        let mut sub = bus.subscribe("to_orchestrator").await.unwrap();
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
        assert!(sub.recv().await.is_some());
    }

    #[tokio::test]
    async fn second_alert_within_cooldown_is_suppressed() {
        let (gate, _bus) = gate();
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
        assert!(!gate.send_alert(draft(AlertKind::Error, "e1")).await);
    }

    #[tokio::test]
    async fn different_experiment_ids_are_independent() {
        let (gate, _bus) = gate();
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
        assert!(gate.send_alert(draft(AlertKind::Error, "e2")).await);
    }

    #[tokio::test]
    async fn different_alert_types_are_independent() {
        let (gate, _bus) = gate();
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
        assert!(gate.send_alert(draft(AlertKind::SuccessThreshold, "e1")).await);
    }

    #[tokio::test]
    async fn expired_cooldown_resumes_sending() {
        let bus = Arc::new(LocalBus::new());
        let state = Arc::new(GateState::new());
        let gate = AlertGate::with_state(bus, Channels::default(), Duration::from_millis(20), state);
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
        assert!(!gate.send_alert(draft(AlertKind::Error, "e1")).await);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
    }

    #[tokio::test]
    async fn clear_cooldown_with_no_filters_clears_everything() {
        let (gate, _bus) = gate();
        gate.send_alert(draft(AlertKind::Error, "e1")).await;
        gate.send_alert(draft(AlertKind::SuccessThreshold, "e2")).await;
        gate.clear_cooldown(None, None);
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
        assert!(gate.send_alert(draft(AlertKind::SuccessThreshold, "e2")).await);
    }

    #[tokio::test]
    async fn clear_cooldown_scoped_to_one_experiment_leaves_others_alone() {
        let (gate, _bus) = gate();
        gate.send_alert(draft(AlertKind::Error, "e1")).await;
        gate.send_alert(draft(AlertKind::Error, "e2")).await;
        gate.clear_cooldown(Some("e1"), None);
        assert!(gate.send_alert(draft(AlertKind::Error, "e1")).await);
        assert!(!gate.send_alert(draft(AlertKind::Error, "e2")).await);
    }
}
