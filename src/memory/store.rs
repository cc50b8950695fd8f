//! The memory-store capability.
//!
//! One operation set, two backends (network KV, embedded file DB).
//! Semantics are defined here once and both backends match them:
//!
//! - `set` replaces any prior value and expiration atomically.
//! - `ttl` returns -2 for a missing (or expired) key, -1 for a key
//!   without expiration, else remaining seconds.
//! - `lrange(key, s, -1)` means "to the end"; negative indices count
//!   from the tail as in the KV protocol.
//! - `ltrim` retains the inclusive range; removed items are gone.
//! - `keys` supports the `*` wildcard only.
//!
//! All operations are total: a disabled or failing backend yields
//! `false`/empty/`None`, never an error; memory is best-effort by
//! design and the pipeline runs without it.

use async_trait::async_trait;

#[async_trait]
pub trait MemoryStore: Send + Sync {
    fn is_enabled(&self) -> bool;

    async fn get(&self, key: &str) -> Option<String>;
    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> bool;
    async fn delete(&self, key: &str) -> bool;
    async fn exists(&self, key: &str) -> bool;

    async fn rpush(&self, key: &str, value: &str) -> bool;
    async fn lpush(&self, key: &str, value: &str) -> bool;
    async fn lrange(&self, key: &str, start: i64, end: i64) -> Vec<String>;
    async fn llen(&self, key: &str) -> i64;
    async fn ltrim(&self, key: &str, start: i64, end: i64) -> bool;

    async fn expire(&self, key: &str, seconds: i64) -> bool;
    async fn ttl(&self, key: &str) -> i64;
    async fn incr(&self, key: &str) -> i64;

    async fn keys(&self, pattern: &str) -> Vec<String>;
    async fn flush_all(&self) -> bool;

    async fn get_json(&self, key: &str) -> Option<serde_json::Value> {
        let raw = self.get(key).await?;
        serde_json::from_str(&raw).ok()
    }

    async fn set_json(&self, key: &str, value: &serde_json::Value, ttl: Option<u64>) -> bool {
        self.set(key, &value.to_string(), ttl).await
    }
}

/// Memory turned off by configuration: everything is a no-op.
pub struct NullStore;

#[async_trait]
impl MemoryStore for NullStore {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn get(&self, _key: &str) -> Option<String> {
        None
    }
    async fn set(&self, _key: &str, _value: &str, _ttl: Option<u64>) -> bool {
        false
    }
    async fn delete(&self, _key: &str) -> bool {
        false
    }
    async fn exists(&self, _key: &str) -> bool {
        false
    }
    async fn rpush(&self, _key: &str, _value: &str) -> bool {
        false
    }
    async fn lpush(&self, _key: &str, _value: &str) -> bool {
        false
    }
    async fn lrange(&self, _key: &str, _start: i64, _end: i64) -> Vec<String> {
        Vec::new()
    }
    async fn llen(&self, _key: &str) -> i64 {
        0
    }
    async fn ltrim(&self, _key: &str, _start: i64, _end: i64) -> bool {
        false
    }
    async fn expire(&self, _key: &str, _seconds: i64) -> bool {
        false
    }
    async fn ttl(&self, _key: &str) -> i64 {
        -2
    }
    async fn incr(&self, _key: &str) -> i64 {
        0
    }
    async fn keys(&self, _pattern: &str) -> Vec<String> {
        Vec::new()
    }
    async fn flush_all(&self) -> bool {
        false
    }
}

/// Resolve a (start, end) pair against a list length, KV-protocol
/// style: negative indices count from the tail, results are clamped,
/// and an inverted range is empty.
pub fn resolve_range(len: i64, start: i64, end: i64) -> Option<(i64, i64)> {
    if len <= 0 {
        return None;
    }
    let s = if start < 0 { (len + start).max(0) } else { start };
    let e = if end < 0 { len + end } else { end.min(len - 1) };
    if s > e || s >= len || e < 0 {
        None
    } else {
        Some((s, e))
    }
}
