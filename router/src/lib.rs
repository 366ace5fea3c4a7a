//! In-process fan-out router (§4.2): one bus subscription per channel,
//! dispatched concurrently to every registered handler.

pub mod envelope_ext;
pub mod handler;
#[allow(clippy::module_inception)]
pub mod router;

pub use envelope_ext::decode_or_warn;
pub use handler::{FnHandler, Handler};
pub use router::Router;
