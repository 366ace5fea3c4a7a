//! Key/value store abstraction over the shared broker-adjacent backend (§2):
//! hashes, lists, sorted sets, and atomic counters per the §3 data model.

pub mod error;
pub mod kv_store;
pub mod memory_store;
pub mod redis_store;

pub use error::StoreError;
pub use kv_store::KvStore;
pub use memory_store::InMemoryStore;
pub use redis_store::RedisStore;
