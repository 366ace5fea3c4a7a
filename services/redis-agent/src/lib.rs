//! Redis Agent service: the Metrics Monitor (§4.7) and Alert Gate (§4.8).

pub mod alerts;
pub mod monitor;
pub mod summary;

pub use alerts::{AlertDraft, AlertGate, AlertKind, GateState};
pub use monitor::{evaluate_criterion, CurrentMetrics, MetricsMonitor};
pub use summary::{publish_periodic_summary, SummaryModel, SummaryModelError};
