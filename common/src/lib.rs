//! Shared types for the GTM orchestration fabric: envelopes, identifiers,
//! the error taxonomy, channel names, and per-component configuration.

pub mod channels;
pub mod config;
pub mod envelope;
pub mod error;
pub mod ids;
pub mod messages;
pub mod priority;
pub mod retry;
pub mod telemetry;

pub use channels::Channels;
pub use envelope::{Envelope, EnvelopeHeader};
pub use error::FabricError;
pub use ids::{ActionId, ExperimentId, RequestId, RunId};
pub use priority::Priority;
