//! Pub/sub message bus (§4.1): transport-agnostic `BusClient` trait with an
//! in-process implementation for tests/single-binary deployments and a
//! Redis-backed implementation for the real fabric.

pub mod client;
pub mod error;
pub mod local;
pub mod redis_bus;

pub use client::{BusClient, Subscription};
pub use error::BusError;
pub use local::LocalBus;
pub use redis_bus::RedisBus;
