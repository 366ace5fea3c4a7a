//! The Experiment Lifecycle state machine: `experiments:{id}.state`.
//!
//! The Executor owns three of the four mutating transitions
//! (`active -> running`, `running -> run`, `running -> failed`); the
//! Dispatcher owns the fourth (`* -> archived`, see
//! `orchestrator::dispatcher::Dispatcher::kill_experiment`) and archival is
//! terminal — this module has no arm that leaves `Archived`.

use tracing::warn;

/// One state of `experiments:{id}.state`. Grounded on
/// `original_source/services/executor/runner.py::execute_experiment`'s
/// `hset(..., "state", ...)` calls and `dispatcher.py::kill_experiment`'s
/// `state=archived`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExperimentState {
    Active,
    Running,
    Run,
    Failed,
    Archived,
}

impl ExperimentState {
    /// Parse the raw `state` hash field. Blank counts as `Active` (the
    /// Monitor's `state ∈ {active, running, ""}` convention in §4.7
    /// applies to the whole lifecycle, not just threshold evaluation).
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "" | "active" => Self::Active,
            "running" => Self::Running,
            "run" => Self::Run,
            "failed" => Self::Failed,
            "archived" => Self::Archived,
            other => {
                warn!(state = other, "unrecognized experiment state, treating as active");
                Self::Active
            }
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Running => "running",
            Self::Run => "run",
            Self::Failed => "failed",
            Self::Archived => "archived",
        }
    }
}

/// Whether `current -> next` is an Executor-owned transition. Every other
/// move (including anything out of `Archived`) is rejected.
pub fn is_legal_transition(current: ExperimentState, next: ExperimentState) -> bool {
    matches!(
        (current, next),
        (ExperimentState::Active, ExperimentState::Running)
            | (ExperimentState::Running, ExperimentState::Run)
            | (ExperimentState::Running, ExperimentState::Failed)
    )
}

/// True only when a fresh run may be started: the experiment must be
/// exactly `Active` (blank counts as active). `Archived` is terminal —
/// the Executor MUST NOT start a new run for it even if a schedule fires.
pub fn can_start_run(current: ExperimentState) -> bool {
    current == ExperimentState::Active
}
