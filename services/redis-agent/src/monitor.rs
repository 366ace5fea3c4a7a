//! The Metrics Monitor: ingest metric events, aggregate them per
//! experiment, and evaluate success/failure criteria on a timer (grounded
//! on `original_source/services/redis_agent/monitor.py` line-for-line).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use common::messages::MetricEvent;
use common::Envelope;
use serde_json::Value;
use store::KvStore;
use tracing::{debug, warn};

use crate::alerts::{AlertDraft, AlertGate, AlertKind};

fn aggregated_key(experiment_id: &str) -> String {
    format!("metrics_aggregated:{experiment_id}")
}

fn raw_key(experiment_id: &str) -> String {
    format!("metrics:{experiment_id}")
}

/// A point-in-time snapshot of `metrics_aggregated:{id}`, already merged
/// into `{name}`/`{name}_avg`/`{name}_latest`/event counts/`last_updated`.
/// §5 and SPEC_FULL.md §9 document this as a torn read tolerant of a
/// concurrent writer mid-way through its per-field increments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CurrentMetrics {
    pub values: HashMap<String, f64>,
    pub last_updated: Option<String>,
}

impl CurrentMetrics {
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.last_updated.is_none()
    }

    /// Resolve `name` against the exact key, then `{name}_latest`, then
    /// `{name}_avg` — the order §4.7/§8 specify for criterion evaluation.
    pub fn resolve(&self, name: &str) -> Option<f64> {
        self.values
            .get(name)
            .or_else(|| self.values.get(&format!("{name}_latest")))
            .or_else(|| self.values.get(&format!("{name}_avg")))
            .copied()
    }
}

/// Ingests `metrics` envelopes and runs the periodic threshold check.
pub struct MetricsMonitor {
    store: Arc<dyn KvStore>,
    alert_gate: Arc<AlertGate>,
}

impl MetricsMonitor {
    pub fn new(store: Arc<dyn KvStore>, alert_gate: Arc<AlertGate>) -> Self {
        Self { store, alert_gate }
    }

    /// Process one envelope received on `metrics`. `raw` is the undecoded
    /// wire payload, appended verbatim (plus `received_at`) to
    /// `metrics:{id}`; the typed decode drives aggregation.
    pub async fn process_metric(&self, raw: &str) {
        let envelope: Envelope<MetricEvent> = match common::envelope::decode(raw) {
            Ok(envelope) => envelope,
            Err(err) => {
                warn!(error = %err, "dropping metric envelope missing experiment_id or malformed");
                return;
            }
        };
        let experiment_id = envelope.payload.experiment_id.clone();

        if let Err(err) = self.append_raw(raw, &experiment_id).await {
            warn!(error = %err, experiment_id, "failed to append raw metric");
        }

        if let Err(err) = self.update_aggregations(&experiment_id, &envelope.payload).await {
            warn!(error = %err, experiment_id, "failed to update metric aggregations");
        }

        if envelope.payload.event.as_deref() == Some("error") {
            let message = envelope.payload.message.clone().unwrap_or_else(|| "Unknown error".to_string());
            self.alert_gate
                .send_alert(AlertDraft {
                    kind: AlertKind::Error,
                    experiment_id: experiment_id.clone(),
                    criterion: None,
                    current_value: None,
                    message,
                    severity: Some("high".to_string()),
                })
                .await;
        }
    }

    async fn append_raw(&self, raw: &str, experiment_id: &str) -> Result<(), store::StoreError> {
        let mut value: Value = serde_json::from_str(raw).unwrap_or_else(|_| Value::Object(Default::default()));
        if let Value::Object(map) = &mut value {
            map.insert("received_at".to_string(), Value::String(Utc::now().to_rfc3339()));
        }
        self.store.list_append(&raw_key(experiment_id), &value.to_string()).await
    }

    async fn update_aggregations(&self, experiment_id: &str, metric: &MetricEvent) -> Result<(), store::StoreError> {
        let key = aggregated_key(experiment_id);

        if let Some(event) = &metric.event {
            self.store.hash_incr_by(&key, &format!("{event}_count"), 1).await?;
            debug!(experiment_id, event, "incremented event count");
        }

        for (name, value) in metric.numeric_fields() {
            self.store.hash_incr_by_float(&key, &format!("{name}_sum"), value).await?;
            self.store.hash_incr_by(&key, &format!("{name}_count"), 1).await?;
            self.store.hash_set(&key, &format!("{name}_latest"), &value.to_string()).await?;
        }

        self.store.hash_set(&key, "last_updated", &Utc::now().to_rfc3339()).await
    }

    /// Read back the aggregate snapshot, merging `_sum`/`_count`/`_latest`
    /// fields into one flat view (`monitor.py::get_current_metrics`).
    pub async fn get_current_metrics(&self, experiment_id: &str) -> Result<CurrentMetrics, store::StoreError> {
        let raw = self.store.hash_get_all(&aggregated_key(experiment_id)).await?;
        if raw.is_empty() {
            return Ok(CurrentMetrics::default());
        }

        let mut values = HashMap::new();
        let mut sums: HashMap<String, f64> = HashMap::new();
        let mut counts: HashMap<String, f64> = HashMap::new();
        let mut last_updated = None;

        for (key, value) in &raw {
            if let Some(base) = key.strip_suffix("_sum") {
                if let Ok(parsed) = value.parse::<f64>() {
                    sums.insert(base.to_string(), parsed);
                }
            } else if let Some(base) = key.strip_suffix("_count") {
                if raw.contains_key(&format!("{base}_sum")) {
                    if let Ok(parsed) = value.parse::<f64>() {
                        counts.insert(base.to_string(), parsed);
                    }
                } else if let Ok(parsed) = value.parse::<f64>() {
                    values.insert(key.clone(), parsed);
                }
            } else if let Some(base) = key.strip_suffix("_latest") {
                if let Ok(parsed) = value.parse::<f64>() {
                    values.insert(format!("{base}_latest"), parsed);
                }
            } else if key == "last_updated" {
                last_updated = Some(value.clone());
            }
        }

        for (name, sum) in &sums {
            if let Some(count) = counts.get(name) {
                if *count > 0.0 {
                    values.insert(format!("{name}_avg"), sum / count);
                }
            }
            values.insert(name.clone(), *sum);
        }

        Ok(CurrentMetrics { values, last_updated })
    }
}

/// One parsed `name OP threshold` criterion.
struct Criterion<'a> {
    name: &'a str,
    op: &'a str,
    threshold: f64,
}

fn parse_criterion(criterion: &str) -> Option<Criterion<'_>> {
    let parts: Vec<&str> = criterion.split_whitespace().collect();
    if parts.len() != 3 {
        warn!(criterion, "invalid criterion format, skipping");
        return None;
    }
    let threshold = match parts[2].parse::<f64>() {
        Ok(value) => value,
        Err(_) => {
            warn!(criterion, "invalid threshold value in criterion, skipping");
            return None;
        }
    };
    Some(Criterion { name: parts[0], op: parts[1], threshold })
}

/// `evaluate(criterion, metrics)` from §8's testable properties: true iff
/// the comparison holds using the first of `name`/`name_latest`/`name_avg`
/// present; missing or malformed ⇒ false.
pub fn evaluate_criterion(criterion: &str, metrics: &CurrentMetrics) -> bool {
    let Some(parsed) = parse_criterion(criterion) else { return false };
    let Some(value) = metrics.resolve(parsed.name) else { return false };

    match parsed.op {
        ">" => value > parsed.threshold,
        "<" => value < parsed.threshold,
        ">=" => value >= parsed.threshold,
        "<=" => value <= parsed.threshold,
        "==" => value == parsed.threshold,
        "!=" => value != parsed.threshold,
        other => {
            warn!(operator = other, criterion, "unknown operator in criterion");
            false
        }
    }
}

/// The value that made `criterion` evaluate true, for annotating the alert.
fn criterion_value(criterion: &str, metrics: &CurrentMetrics) -> Option<f64> {
    parse_criterion(criterion).and_then(|parsed| metrics.resolve(parsed.name))
}

fn is_monitorable_state(state: &str) -> bool {
    matches!(state.trim(), "" | "active" | "running")
}

/// Parse a `success_criteria`/`failure_criteria` hash field: a JSON array
/// of strings, or — matching the original's tolerance for a bare string —
/// a single criterion with no array wrapper.
fn parse_criteria_field(raw: &str) -> Vec<String> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    serde_json::from_str::<Vec<String>>(raw).unwrap_or_else(|_| vec![raw.to_string()])
}

impl MetricsMonitor {
    /// One sweep of `experiments:*`: for every active/running experiment,
    /// evaluate its success/failure criteria and raise alerts for any that
    /// fire (`monitor.py::check_experiment_thresholds`).
    pub async fn check_thresholds_once(&self) {
        let keys = match self.store.scan_keys("experiments:*").await {
            Ok(keys) => keys,
            Err(err) => {
                warn!(error = %err, "failed to scan experiments during threshold check");
                return;
            }
        };

        for key in keys {
            let Some(experiment_id) = key.strip_prefix("experiments:") else { continue };
            self.check_experiment_thresholds(experiment_id).await;
        }
    }

    async fn check_experiment_thresholds(&self, experiment_id: &str) {
        let fields = match self.store.hash_get_all(&format!("experiments:{experiment_id}")).await {
            Ok(fields) => fields,
            Err(err) => {
                warn!(error = %err, experiment_id, "failed to load experiment during threshold check");
                return;
            }
        };

        let state = fields.get("state").map(String::as_str).unwrap_or("");
        if !is_monitorable_state(state) {
            return;
        }

        let current = match self.get_current_metrics(experiment_id).await {
            Ok(current) => current,
            Err(err) => {
                warn!(error = %err, experiment_id, "failed to read current metrics");
                return;
            }
        };
        if current.is_empty() {
            return;
        }

        let success_criteria = fields.get("success_criteria").map(String::as_str).unwrap_or("");
        for criterion in parse_criteria_field(success_criteria) {
            if evaluate_criterion(&criterion, &current) {
                self.alert_gate
                    .send_alert(AlertDraft {
                        kind: AlertKind::SuccessThreshold,
                        experiment_id: experiment_id.to_string(),
                        criterion: Some(criterion.clone()),
                        current_value: criterion_value(&criterion, &current).map(Value::from),
                        message: format!("Experiment {experiment_id} hit success: {criterion}"),
                        severity: None,
                    })
                    .await;
            }
        }

        let failure_criteria = fields.get("failure_criteria").map(String::as_str).unwrap_or("");
        for criterion in parse_criteria_field(failure_criteria) {
            if evaluate_criterion(&criterion, &current) {
                self.alert_gate
                    .send_alert(AlertDraft {
                        kind: AlertKind::FailureThreshold,
                        experiment_id: experiment_id.to_string(),
                        criterion: Some(criterion.clone()),
                        current_value: criterion_value(&criterion, &current).map(Value::from),
                        message: format!("Experiment {experiment_id} hit failure: {criterion}"),
                        severity: Some("high".to_string()),
                    })
                    .await;
            }
        }
    }
}
