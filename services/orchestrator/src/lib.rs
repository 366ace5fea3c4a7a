//! Orchestrator: reasons over escalations and periodic summaries with
//! extended thinking, then dispatches the resulting decision.

pub mod agent;
pub mod context;
pub mod decision;
pub mod dispatcher;
pub mod model;
pub mod supervisor;

pub use agent::OrchestratorAgent;
pub use context::Context;
pub use decision::{parse_decision, Decision, DecisionAction};
pub use dispatcher::Dispatcher;
pub use model::{ReasoningError, ReasoningModel};
pub use supervisor::{Supervisor, SupervisorOutcome};
