//! The key/value store abstraction §2 calls "co-located with the broker":
//! hashes, lists, sorted sets, and atomic counters over the §3 data model.

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::StoreError;

/// Hash/list/sorted-set/counter primitives the components need. Every
/// method is `&self` — both backends (Redis's `ConnectionManager`, the
/// in-memory test double) are internally synchronized so callers never
/// need exclusive access.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn hash_set(&self, key: &str, field: &str, value: &str) -> Result<(), StoreError>;

    /// `HSET key f1 v1 f2 v2 ...`: set several fields of a hash in one call.
    async fn hash_set_many(&self, key: &str, fields: &[(&str, &str)]) -> Result<(), StoreError>;

    async fn hash_get(&self, key: &str, field: &str) -> Result<Option<String>, StoreError>;
    async fn hash_get_all(&self, key: &str) -> Result<HashMap<String, String>, StoreError>;

    /// `HINCRBY`: atomically add `delta` to `field`, returning the new value.
    async fn hash_incr_by(&self, key: &str, field: &str, delta: i64) -> Result<i64, StoreError>;

    /// `HINCRBYFLOAT`: atomically add `delta` to `field`, returning the new value.
    async fn hash_incr_by_float(
        &self,
        key: &str,
        field: &str,
        delta: f64,
    ) -> Result<f64, StoreError>;

    /// `RPUSH`: append to the tail of an ordered list.
    async fn list_append(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// `LRANGE`: read a range of an ordered list (`stop = -1` for "to the end").
    async fn list_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    /// `ZADD`: add a member scored by `score` (e.g. a unix timestamp) to a sorted set.
    async fn sorted_set_add(&self, key: &str, member: &str, score: f64) -> Result<(), StoreError>;

    /// `ZRANGE`: read members of a sorted set by score-rank range.
    async fn sorted_set_range(&self, key: &str, start: isize, stop: isize) -> Result<Vec<String>, StoreError>;

    /// `SCAN ... MATCH pattern`: best-effort key enumeration, fully drained
    /// (the caller never sees a cursor).
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;
}
