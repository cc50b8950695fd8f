//! Embedded file-DB memory backend.
//!
//! Two relations: `kv_store(key, value, expires_at, created_at)` and
//! `list_store(key, idx, value, created_at)` with `(key, idx)` as the
//! primary key, list positions kept dense `0..len-1`. The driver is
//! synchronous, so every operation opens its own connection inside a
//! blocking task; mutations are serialized through one async mutex
//! while reads proceed concurrently. Expired keys are swept lazily on
//! the next touch of the same key or during writes.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::store::{resolve_range, MemoryStore};
use super::MemoryError;

pub struct EmbeddedStore {
    db_path: PathBuf,
    write_gate: Mutex<()>,
    enabled: AtomicBool,
}

fn now_epoch() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

impl EmbeddedStore {
    pub async fn connect(db_path: PathBuf) -> Result<Self, MemoryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
        }

        let path = db_path.clone();
        tokio::task::spawn_blocking(move || -> Result<(), MemoryError> {
            let conn =
                Connection::open(&path).map_err(|e| MemoryError::Connection(e.to_string()))?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(|e| MemoryError::Storage(e.to_string()))?;
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS kv_store (
                     key        TEXT PRIMARY KEY,
                     value      TEXT NOT NULL,
                     expires_at REAL,
                     created_at REAL NOT NULL DEFAULT (unixepoch('subsec'))
                 );
                 CREATE INDEX IF NOT EXISTS idx_kv_expires ON kv_store(expires_at);
                 CREATE TABLE IF NOT EXISTS list_store (
                     key        TEXT NOT NULL,
                     idx        INTEGER NOT NULL,
                     value      TEXT NOT NULL,
                     created_at REAL NOT NULL DEFAULT (unixepoch('subsec')),
                     PRIMARY KEY (key, idx)
                 );
                 CREATE INDEX IF NOT EXISTS idx_list_key ON list_store(key);",
            )
            .map_err(|e| MemoryError::Storage(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::Storage(e.to_string()))??;

        tracing::info!(path = %db_path.display(), "embedded memory store ready");
        Ok(Self {
            db_path,
            write_gate: Mutex::new(()),
            enabled: AtomicBool::new(true),
        })
    }

    /// Run a read without the write gate.
    async fn read<T, F>(&self, op: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        if !self.is_enabled() {
            return None;
        }
        let path = self.db_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(path)?;
            op(&conn)
        })
        .await;
        match result {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                tracing::error!(%error, "embedded store read failed");
                None
            }
            Err(error) => {
                tracing::error!(%error, "embedded store task failed");
                None
            }
        }
    }

    /// Run a mutation under the write gate.
    async fn write<T, F>(&self, op: F) -> Option<T>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> rusqlite::Result<T> + Send + 'static,
    {
        if !self.is_enabled() {
            return None;
        }
        let _gate = self.write_gate.lock().await;
        let path = self.db_path.clone();
        let result = tokio::task::spawn_blocking(move || {
            let mut conn = Connection::open(path)?;
            // Sweep whatever expired before this mutation.
            conn.execute(
                "DELETE FROM kv_store WHERE expires_at IS NOT NULL AND expires_at < ?1",
                params![now_epoch()],
            )?;
            op(&mut conn)
        })
        .await;
        match result {
            Ok(Ok(value)) => Some(value),
            Ok(Err(error)) => {
                tracing::error!(%error, "embedded store write failed");
                None
            }
            Err(error) => {
                tracing::error!(%error, "embedded store task failed");
                None
            }
        }
    }
}

#[async_trait]
impl MemoryStore for EmbeddedStore {
    fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    async fn get(&self, key: &str) -> Option<String> {
        let key = key.to_string();
        self.read(move |conn| {
            conn.query_row(
                "SELECT value FROM kv_store
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                params![key, now_epoch()],
                |row| row.get(0),
            )
            .optional()
        })
        .await
        .flatten()
    }

    async fn set(&self, key: &str, value: &str, ttl: Option<u64>) -> bool {
        let key = key.to_string();
        let value = value.to_string();
        let expires_at = ttl.map(|secs| now_epoch() + secs as f64);
        self.write(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, expires_at) VALUES (?1, ?2, ?3)",
                params![key, value, expires_at],
            )
        })
        .await
        .is_some()
    }

    async fn delete(&self, key: &str) -> bool {
        let key = key.to_string();
        self.write(move |conn| {
            conn.execute("DELETE FROM kv_store WHERE key = ?1", params![key])?;
            conn.execute("DELETE FROM list_store WHERE key = ?1", params![key])
        })
        .await
        .is_some()
    }

    async fn exists(&self, key: &str) -> bool {
        let key = key.to_string();
        self.read(move |conn| {
            conn.query_row(
                "SELECT 1 FROM kv_store
                 WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)
                 UNION
                 SELECT 1 FROM list_store WHERE key = ?1
                 LIMIT 1",
                params![key, now_epoch()],
                |_| Ok(()),
            )
            .optional()
        })
        .await
        .flatten()
        .is_some()
    }

    async fn rpush(&self, key: &str, value: &str) -> bool {
        let key = key.to_string();
        let value = value.to_string();
        self.write(move |conn| {
            let next: i64 = conn.query_row(
                "SELECT COALESCE(MAX(idx), -1) + 1 FROM list_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            conn.execute(
                "INSERT INTO list_store (key, idx, value) VALUES (?1, ?2, ?3)",
                params![key, next, value],
            )
        })
        .await
        .is_some()
    }

    async fn lpush(&self, key: &str, value: &str) -> bool {
        let key = key.to_string();
        let value = value.to_string();
        self.write(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "UPDATE list_store SET idx = idx + 1 WHERE key = ?1",
                params![key],
            )?;
            tx.execute(
                "INSERT INTO list_store (key, idx, value) VALUES (?1, 0, ?2)",
                params![key, value],
            )?;
            tx.commit()
        })
        .await
        .is_some()
    }

    async fn lrange(&self, key: &str, start: i64, end: i64) -> Vec<String> {
        let key = key.to_string();
        self.read(move |conn| {
            let len: i64 = conn.query_row(
                "SELECT COUNT(*) FROM list_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            let Some((s, e)) = resolve_range(len, start, end) else {
                return Ok(Vec::new());
            };
            let mut stmt = conn.prepare(
                "SELECT value FROM list_store
                 WHERE key = ?1 AND idx >= ?2 AND idx <= ?3
                 ORDER BY idx",
            )?;
            let rows = stmt.query_map(params![key, s, e], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .unwrap_or_default()
    }

    async fn llen(&self, key: &str) -> i64 {
        let key = key.to_string();
        self.read(move |conn| {
            conn.query_row(
                "SELECT COUNT(*) FROM list_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )
        })
        .await
        .unwrap_or(0)
    }

    async fn ltrim(&self, key: &str, start: i64, end: i64) -> bool {
        let key = key.to_string();
        self.write(move |conn| {
            let len: i64 = conn.query_row(
                "SELECT COUNT(*) FROM list_store WHERE key = ?1",
                params![key],
                |row| row.get(0),
            )?;
            let tx = conn.transaction()?;
            match resolve_range(len, start, end) {
                None => {
                    tx.execute("DELETE FROM list_store WHERE key = ?1", params![key])?;
                }
                Some((s, e)) => {
                    // Keep [s, e], then re-pack positions to 0..len-1.
                    let kept: Vec<String> = {
                        let mut stmt = tx.prepare(
                            "SELECT value FROM list_store
                             WHERE key = ?1 AND idx >= ?2 AND idx <= ?3
                             ORDER BY idx",
                        )?;
                        let rows = stmt.query_map(params![key, s, e], |row| row.get(0))?;
                        rows.collect::<rusqlite::Result<_>>()?
                    };
                    tx.execute("DELETE FROM list_store WHERE key = ?1", params![key])?;
                    let mut insert = tx.prepare(
                        "INSERT INTO list_store (key, idx, value) VALUES (?1, ?2, ?3)",
                    )?;
                    for (idx, value) in kept.iter().enumerate() {
                        insert.execute(params![key, idx as i64, value])?;
                    }
                }
            }
            tx.commit()
        })
        .await
        .is_some()
    }

    async fn expire(&self, key: &str, seconds: i64) -> bool {
        let key = key.to_string();
        let expires_at = now_epoch() + seconds as f64;
        self.write(move |conn| {
            conn.execute(
                "UPDATE kv_store SET expires_at = ?1 WHERE key = ?2",
                params![expires_at, key],
            )
        })
        .await
        .is_some()
    }

    async fn ttl(&self, key: &str) -> i64 {
        let key = key.to_string();
        self.read(move |conn| {
            conn.query_row(
                "SELECT expires_at FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, Option<f64>>(0),
            )
            .optional()
        })
        .await
        .flatten()
        .map(|expires_at| match expires_at {
            None => -1,
            Some(at) => {
                let remaining = at - now_epoch();
                if remaining <= 0.0 {
                    // Expired means gone.
                    -2
                } else {
                    remaining as i64
                }
            }
        })
        .unwrap_or(-2)
    }

    async fn incr(&self, key: &str) -> i64 {
        let key = key.to_string();
        self.write(move |conn| {
            let current: Option<String> = conn
                .query_row(
                    "SELECT value FROM kv_store
                     WHERE key = ?1 AND (expires_at IS NULL OR expires_at > ?2)",
                    params![key, now_epoch()],
                    |row| row.get(0),
                )
                .optional()?;
            let next = current
                .and_then(|v| v.parse::<i64>().ok())
                .unwrap_or(0)
                + 1;
            conn.execute(
                "INSERT OR REPLACE INTO kv_store (key, value, expires_at)
                 VALUES (?1, ?2, (SELECT expires_at FROM kv_store WHERE key = ?1))",
                params![key, next.to_string()],
            )?;
            Ok(next)
        })
        .await
        .unwrap_or(0)
    }

    async fn keys(&self, pattern: &str) -> Vec<String> {
        let sql_pattern = pattern.replace('*', "%");
        self.read(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT DISTINCT key FROM (
                     SELECT key FROM kv_store
                     WHERE key LIKE ?1 AND (expires_at IS NULL OR expires_at > ?2)
                     UNION
                     SELECT key FROM list_store WHERE key LIKE ?1
                 )",
            )?;
            let rows = stmt.query_map(params![sql_pattern, now_epoch()], |row| row.get(0))?;
            rows.collect()
        })
        .await
        .unwrap_or_default()
    }

    async fn flush_all(&self) -> bool {
        let flushed = self
            .write(move |conn| {
                conn.execute("DELETE FROM kv_store", [])?;
                conn.execute("DELETE FROM list_store", [])
            })
            .await
            .is_some();
        if flushed {
            tracing::warn!("embedded memory store flushed");
        }
        flushed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, EmbeddedStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = EmbeddedStore::connect(dir.path().join("memory.db"))
            .await
            .unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn set_get_round_trip() {
        let (_dir, store) = store().await;
        assert!(store.set("k", "v", None).await);
        assert_eq!(store.get("k").await.as_deref(), Some("v"));
        assert!(store.exists("k").await);
    }

    #[tokio::test]
    async fn set_replaces_value_and_expiration() {
        let (_dir, store) = store().await;
        store.set("k", "v1", Some(100)).await;
        assert!(store.ttl("k").await > 0);

        // Re-set without TTL clears the expiration.
        store.set("k", "v2", None).await;
        assert_eq!(store.get("k").await.as_deref(), Some("v2"));
        assert_eq!(store.ttl("k").await, -1);
    }

    #[tokio::test]
    async fn ttl_semantics() {
        let (_dir, store) = store().await;
        assert_eq!(store.ttl("missing").await, -2);

        store.set("forever", "v", None).await;
        assert_eq!(store.ttl("forever").await, -1);

        store.set("bounded", "v", Some(3600)).await;
        let remaining = store.ttl("bounded").await;
        assert!(remaining > 3590 && remaining <= 3600);

        store.delete("bounded").await;
        assert_eq!(store.ttl("bounded").await, -2);
    }

    #[tokio::test]
    async fn expired_key_reads_as_absent() {
        let (_dir, store) = store().await;
        store.set("k", "v", Some(1)).await;
        // Force expiry by rewriting the expiration into the past.
        store.expire("k", -10).await;
        assert_eq!(store.get("k").await, None);
        assert!(!store.exists("k").await);
        assert_eq!(store.ttl("k").await, -2);
    }

    #[tokio::test]
    async fn json_round_trip() {
        let (_dir, store) = store().await;
        let value = serde_json::json!({"query": "두통", "hit_count": 3, "sources": [1, 2]});
        assert!(store.set_json("j", &value, Some(60)).await);
        assert_eq!(store.get_json("j").await.unwrap(), value);
    }

    #[tokio::test]
    async fn rpush_appends_lpush_prepends() {
        let (_dir, store) = store().await;
        store.rpush("l", "a").await;
        store.rpush("l", "b").await;
        assert_eq!(store.lrange("l", 0, -1).await, vec!["a", "b"]);

        store.lpush("l2", "a").await;
        store.lpush("l2", "b").await;
        assert_eq!(store.lrange("l2", 0, -1).await, vec!["b", "a"]);
    }

    #[tokio::test]
    async fn lrange_supports_negative_window() {
        let (_dir, store) = store().await;
        for value in ["a", "b", "c", "d", "e"] {
            store.rpush("l", value).await;
        }
        assert_eq!(store.lrange("l", -2, -1).await, vec!["d", "e"]);
        assert_eq!(store.llen("l").await, 5);
    }

    #[tokio::test]
    async fn ltrim_keeps_window_and_reindexes() {
        let (_dir, store) = store().await;
        for value in ["a", "b", "c", "d", "e"] {
            store.rpush("l", value).await;
        }

        assert!(store.ltrim("l", -3, -1).await);
        assert_eq!(store.lrange("l", 0, -1).await, vec!["c", "d", "e"]);
        assert_eq!(store.llen("l").await, 3);

        // Positions must be dense again: index 0 is the new head.
        assert_eq!(store.lrange("l", 0, 0).await, vec!["c"]);
    }

    #[tokio::test]
    async fn ltrim_out_of_range_empties_list() {
        let (_dir, store) = store().await;
        store.rpush("l", "a").await;
        store.ltrim("l", 5, 9).await;
        assert_eq!(store.llen("l").await, 0);
    }

    #[tokio::test]
    async fn incr_starts_at_one_and_counts() {
        let (_dir, store) = store().await;
        assert_eq!(store.incr("n").await, 1);
        assert_eq!(store.incr("n").await, 2);
        assert_eq!(store.incr("n").await, 3);
    }

    #[tokio::test]
    async fn keys_matches_star_pattern() {
        let (_dir, store) = store().await;
        store.set("cache:query:abc", "1", None).await;
        store.set("cache:query:def", "1", None).await;
        store.set("session:s1", "1", None).await;
        store.rpush("history:s1", "turn").await;

        let mut cache_keys = store.keys("cache:query:*").await;
        cache_keys.sort();
        assert_eq!(cache_keys, vec!["cache:query:abc", "cache:query:def"]);

        let history = store.keys("history:*").await;
        assert_eq!(history, vec!["history:s1"]);
    }

    #[tokio::test]
    async fn flush_all_clears_everything() {
        let (_dir, store) = store().await;
        store.set("k", "v", None).await;
        store.rpush("l", "a").await;
        assert!(store.flush_all().await);
        assert_eq!(store.get("k").await, None);
        assert_eq!(store.llen("l").await, 0);
    }

    #[tokio::test]
    async fn delete_removes_both_relations() {
        let (_dir, store) = store().await;
        store.set("k", "v", None).await;
        store.rpush("k", "item").await;
        store.delete("k").await;
        assert!(!store.exists("k").await);
        assert_eq!(store.llen("k").await, 0);
    }
}
