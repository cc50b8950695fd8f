//! Network KV memory backend.
//!
//! Connection failure at startup degrades the backend to "disabled":
//! writes return `false`, reads return empty, and the service keeps
//! answering without memory.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::store::MemoryStore;

pub struct RedisStore {
    conn: Option<ConnectionManager>,
}

impl RedisStore {
    pub async fn connect(url: &str) -> Self {
        let conn = match redis::Client::open(url) {
            Ok(client) => match ConnectionManager::new(client).await {
                Ok(mut manager) => {
                    let ping: redis::RedisResult<String> =
                        redis::cmd("PING").query_async(&mut manager).await;
                    match ping {
                        Ok(_) => {
                            tracing::info!(url, "KV store connected");
                            Some(manager)
                        }
                        Err(error) => {
                            tracing::warn!(%error, "KV store ping failed; memory disabled");
                            None
                        }
                    }
                }
                Err(error) => {
                    tracing::warn!(%error, "KV store connection failed; memory disabled");
                    None
                }
            },
            Err(error) => {
                tracing::warn!(%error, "KV store URL invalid; memory disabled");
                None
            }
        };
        Self { conn }
    }

    fn connection(&self) -> Option<ConnectionManager> {
        self.conn.clone()
    }
}

macro_rules! try_command {
    ($result:expr, $default:expr, $op:literal) => {
        match $result {
            Ok(value) => value,
            Err(error) => {
                tracing::error!(%error, concat!("KV ", $op, " failed"));
                $default
            }
        }
    };
}

#[async_trait]
impl MemoryStore for RedisStore {
    fn is_enabled(&self) -> bool {
        self.conn.is_some()
    }

    async fn get(&self, key: &str) -> Option<String> {
        let mut conn = self.connection()?;
        try_command!(conn.get(key).await, None, "GET")
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        let result: redis::RedisResult<()> = match ttl {
            Some(seconds) => conn.set_ex(key, value, seconds).await,
            None => conn.set(key, value).await,
        };
        try_command!(result.map(|_| true), false, "SET")
    }

    async fn delete(&self, key: &str) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        let result: redis::RedisResult<()> = conn.del(key).await;
        try_command!(result.map(|_| true), false, "DEL")
    }

    async fn exists(&self, key: &str) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        try_command!(conn.exists(key).await, false, "EXISTS")
    }

    async fn rpush(&self, key: &str, value: &str) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        let result: redis::RedisResult<i64> = conn.rpush(key, value).await;
        try_command!(result.map(|_| true), false, "RPUSH")
    }

    async fn lpush(&self, key: &str, value: &str) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        let result: redis::RedisResult<i64> = conn.lpush(key, value).await;
        try_command!(result.map(|_| true), false, "LPUSH")
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Vec<String> {
        let Some(mut conn) = self.connection() else { return Vec::new() };
        try_command!(conn.lrange(key, start as isize, end as isize).await, Vec::new(), "LRANGE")
    }

    async fn llen(&self, key: &str) -> i64 {
        let Some(mut conn) = self.connection() else { return 0 };
        try_command!(conn.llen(key).await, 0, "LLEN")
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        let result: redis::RedisResult<()> =
            conn.ltrim(key, start as isize, end as isize).await;
        try_command!(result.map(|_| true), false, "LTRIM")
    }

    async fn expire(&self, key: &str, seconds: i64) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        let result: redis::RedisResult<bool> = conn.expire(key, seconds).await;
        try_command!(result, false, "EXPIRE")
    }

    async fn ttl(&self, key: &str) -> i64 {
        let Some(mut conn) = self.connection() else { return -2 };
        try_command!(conn.ttl(key).await, -2, "TTL")
    }

    async fn incr(&self, key: &str) -> i64 {
        let Some(mut conn) = self.connection() else { return 0 };
        try_command!(conn.incr(key, 1i64).await, 0, "INCR")
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        let Some(mut conn) = self.connection() else { return Vec::new() };
        try_command!(conn.keys(pattern).await, Vec::new(), "KEYS")
    }

    async fn flush_all(&self) -> bool {
        let Some(mut conn) = self.connection() else { return false };
        let result: redis::RedisResult<()> =
            redis::cmd("FLUSHALL").query_async(&mut conn).await;
        if result.is_ok() {
            tracing::warn!("KV store flushed");
        }
        try_command!(result.map(|_| true), false, "FLUSHALL")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // A live KV server is not part of the test environment; the
    // disabled path is what the service relies on when one is absent.
    #[tokio::test]
    async fn unreachable_server_degrades_to_disabled() {
        let store = RedisStore::connect("redis://127.0.0.1:1/").await;
        assert!(!store.is_enabled());
        assert!(!store.set("k", "v", None).await);
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.lrange("l", 0, -1).await, Vec::<String>::new());
        assert_eq!(store.ttl("k").await, -2);
        assert_eq!(store.incr("n").await, 0);
    }
}
