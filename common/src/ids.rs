//! Typed identifiers shared across the fabric.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of an experiment, stable for its whole lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExperimentId(pub String);

impl ExperimentId {
    /// Build the `experiments:{id}` store key.
    pub fn store_key(&self) -> String {
        format!("experiments:{}", self.0)
    }

    /// Build the `metrics:{id}` raw-stream store key.
    pub fn metrics_key(&self) -> String {
        format!("metrics:{}", self.0)
    }

    /// Build the `metrics_aggregated:{id}` store key.
    pub fn metrics_aggregated_key(&self) -> String {
        format!("metrics_aggregated:{}", self.0)
    }

    /// Build the `metrics_specs:{id}` store key.
    pub fn metrics_spec_key(&self) -> String {
        format!("metrics_specs:{}", self.0)
    }

    /// Build the `schedules:{id}` store key.
    pub fn schedule_key(&self) -> String {
        format!("schedules:{}", self.0)
    }
}

impl fmt::Display for ExperimentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ExperimentId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for ExperimentId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Identifier of one execution attempt of an experiment: `{experiment_id}:{unix_seconds}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Build a run id for `experiment_id` at the given unix-seconds timestamp.
    pub fn new(experiment_id: &ExperimentId, unix_seconds: i64) -> Self {
        Self(format!("{}:{}", experiment_id.0, unix_seconds))
    }

    /// Build the `experiment_runs:{run_id}` store key.
    pub fn store_key(&self) -> String {
        format!("experiment_runs:{}", self.0)
    }

    /// The experiment id this run belongs to, parsed back out of the run id.
    pub fn experiment_id(&self) -> ExperimentId {
        match self.0.rsplit_once(':') {
            Some((exp, _ts)) => ExperimentId(exp.to_string()),
            None => ExperimentId(self.0.clone()),
        }
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a Builder tool-PRD request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub String);

/// Opaque identifier of a single Dispatcher action, for log correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ActionId(pub uuid::Uuid);

impl ActionId {
    /// Mint a fresh action id.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
