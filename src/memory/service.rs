//! Conversation memory and response caching.
//!
//! Keys: `cache:query:{h}`, `history:{session}`, `session:{session}`
//! where `h` is the first 16 hex chars of SHA-256 over the case-folded
//! trimmed query. History is a ring of the most recent `max_history`
//! turns with a TTL refreshed on every append. When persistent memory
//! is on, every turn is also mirrored into the relational store,
//! best-effort, never raising into the request path.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::store::MemoryStore;
use crate::db::{repository, Database};

const DEFAULT_CACHE_TTL: u64 = 3600;
const DEFAULT_HISTORY_TTL: u64 = 86_400;
const DEFAULT_MAX_HISTORY: usize = 20;

const CACHE_PREFIX: &str = "cache:query:";
const HISTORY_PREFIX: &str = "history:";
const SESSION_PREFIX: &str = "session:";

/// Reference to a source drug attached to a response.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SourceRef {
    pub id: String,
    pub name: String,
    pub similarity: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub query: String,
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub timestamp: String,
    pub query_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CachedResponse {
    pub query: String,
    pub response: String,
    pub sources: Vec<SourceRef>,
    pub cached_at: String,
    pub hit_count: u32,
}

pub struct MemoryService {
    store: Arc<dyn MemoryStore>,
    cache_ttl: u64,
    history_ttl: u64,
    max_history: usize,
    /// Durable mirror target; `None` disables persistent memory.
    mirror: Option<Database>,
}

impl MemoryService {
    pub fn new(store: Arc<dyn MemoryStore>, mirror: Option<Database>) -> Self {
        Self {
            store,
            cache_ttl: DEFAULT_CACHE_TTL,
            history_ttl: DEFAULT_HISTORY_TTL,
            max_history: DEFAULT_MAX_HISTORY,
            mirror,
        }
    }

    pub fn with_limits(mut self, cache_ttl: u64, history_ttl: u64, max_history: usize) -> Self {
        self.cache_ttl = cache_ttl;
        self.history_ttl = history_ttl;
        self.max_history = max_history;
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.store.is_enabled()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }

    /// First 16 hex chars of SHA-256 over the normalized query.
    ///
    /// Stable under case folding and leading/trailing whitespace.
    pub fn hash_query(query: &str) -> String {
        let normalized = query.trim().to_lowercase();
        let digest = Sha256::digest(normalized.as_bytes());
        let hex: String = digest.iter().map(|b| format!("{b:02x}")).collect();
        hex[..16].to_string()
    }

    // ── Response cache ──────────────────────────────────────────

    pub async fn get_cached_response(&self, query: &str) -> Option<CachedResponse> {
        if !self.is_enabled() {
            return None;
        }
        let key = format!("{CACHE_PREFIX}{}", Self::hash_query(query));
        let mut cached: CachedResponse =
            serde_json::from_value(self.store.get_json(&key).await?).ok()?;

        cached.hit_count += 1;
        // Best-effort bookkeeping; concurrent hits may race and
        // last-write-wins is acceptable.
        if let Ok(value) = serde_json::to_value(&cached) {
            self.store.set_json(&key, &value, Some(self.cache_ttl)).await;
        }
        tracing::info!(hits = cached.hit_count, "cache hit");
        Some(cached)
    }

    pub async fn cache_response(
        &self,
        query: &str,
        response: &str,
        sources: &[SourceRef],
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let key = format!("{CACHE_PREFIX}{}", Self::hash_query(query));
        let cached = CachedResponse {
            query: query.to_string(),
            response: response.to_string(),
            sources: sources.to_vec(),
            cached_at: Utc::now().to_rfc3339(),
            hit_count: 1,
        };
        match serde_json::to_value(&cached) {
            Ok(value) => self.store.set_json(&key, &value, Some(self.cache_ttl)).await,
            Err(_) => false,
        }
    }

    pub async fn is_duplicate_query(&self, query: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let key = format!("{CACHE_PREFIX}{}", Self::hash_query(query));
        self.store.exists(&key).await
    }

    // ── Conversation history ────────────────────────────────────

    /// Append a turn to the session ring. Returns the turn count
    /// visible after the append (capped at `max_history`), or `None`
    /// when memory is disabled.
    pub async fn add_to_history(
        &self,
        session_id: &str,
        query: &str,
        response: &str,
        sources: &[SourceRef],
    ) -> Option<i64> {
        if !self.is_enabled() {
            return None;
        }
        let key = format!("{HISTORY_PREFIX}{session_id}");
        let turn = ConversationTurn {
            query: query.to_string(),
            response: response.to_string(),
            sources: sources.to_vec(),
            timestamp: Utc::now().to_rfc3339(),
            query_hash: Self::hash_query(query),
        };
        let encoded = serde_json::to_string(&turn).ok()?;
        if !self.store.rpush(&key, &encoded).await {
            return None;
        }

        let length = self.store.llen(&key).await;
        if length > self.max_history as i64 {
            self.store
                .ltrim(&key, -(self.max_history as i64), -1)
                .await;
        }
        self.store.expire(&key, self.history_ttl as i64).await;

        self.mirror_turn(session_id, &turn).await;

        Some(length.min(self.max_history as i64))
    }

    /// Durable mirror write; failures are logged and swallowed.
    async fn mirror_turn(&self, session_id: &str, turn: &ConversationTurn) {
        let Some(db) = &self.mirror else { return };
        let db = db.clone();
        let session_id = session_id.to_string();
        let turn = turn.clone();

        let result = tokio::task::spawn_blocking(move || -> Result<(), crate::db::DatabaseError> {
            let conn = db.connect()?;
            repository::upsert_session(&conn, &session_id, None)?;
            let turn_number = repository::next_turn_number(&conn, &session_id)?;
            let sources = serde_json::to_value(&turn.sources).ok();
            repository::insert_conversation_turn(
                &conn,
                &session_id,
                turn_number,
                &turn.query,
                &turn.query_hash,
                &turn.response,
                sources.as_ref(),
            )?;
            Ok(())
        })
        .await;

        match result {
            Ok(Ok(())) => {}
            Ok(Err(error)) => tracing::warn!(%error, "history mirror write failed"),
            Err(error) => tracing::warn!(%error, "history mirror task failed"),
        }
    }

    /// Turns for a session, oldest first. Malformed entries are
    /// skipped.
    pub async fn get_history(
        &self,
        session_id: &str,
        limit: Option<usize>,
    ) -> Vec<ConversationTurn> {
        if !self.is_enabled() {
            return Vec::new();
        }
        let key = format!("{HISTORY_PREFIX}{session_id}");
        let items = match limit {
            Some(n) => self.store.lrange(&key, -(n as i64), -1).await,
            None => self.store.lrange(&key, 0, -1).await,
        };
        items
            .iter()
            .filter_map(|item| serde_json::from_str(item).ok())
            .collect()
    }

    /// Formatted block of the most recent turns, responses truncated
    /// to 200 chars, for prompt context.
    pub async fn get_recent_context(&self, session_id: &str, limit: usize) -> String {
        let turns = self.get_history(session_id, Some(limit)).await;
        if turns.is_empty() {
            return String::new();
        }

        let mut parts = vec!["[이전 대화 내용]".to_string()];
        for (i, turn) in turns.iter().enumerate() {
            parts.push(format!("\n사용자 질문 {}: {}", i + 1, turn.query));
            let summary: String = turn.response.chars().take(200).collect();
            let suffix = if turn.response.chars().count() > 200 { "..." } else { "" };
            parts.push(format!("AI 답변 {}: {summary}{suffix}", i + 1));
        }
        parts.join("\n")
    }

    pub async fn clear_history(&self, session_id: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let key = format!("{HISTORY_PREFIX}{session_id}");
        self.store.delete(&key).await
    }

    // ── Sessions ────────────────────────────────────────────────

    pub async fn create_session(
        &self,
        session_id: &str,
        metadata: Option<serde_json::Value>,
    ) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let key = format!("{SESSION_PREFIX}{session_id}");
        let now = Utc::now().to_rfc3339();
        let mut session = serde_json::json!({
            "created_at": now,
            "last_active": now,
        });
        if let (Some(obj), Some(serde_json::Value::Object(extra))) =
            (session.as_object_mut(), metadata)
        {
            for (k, v) in extra {
                obj.insert(k, v);
            }
        }
        self.store
            .set_json(&key, &session, Some(self.history_ttl))
            .await
    }

    pub async fn update_session_activity(&self, session_id: &str) -> bool {
        if !self.is_enabled() {
            return false;
        }
        let key = format!("{SESSION_PREFIX}{session_id}");
        let Some(mut session) = self.store.get_json(&key).await else {
            return false;
        };
        if let Some(obj) = session.as_object_mut() {
            obj.insert(
                "last_active".to_string(),
                serde_json::Value::String(Utc::now().to_rfc3339()),
            );
        }
        self.store
            .set_json(&key, &session, Some(self.history_ttl))
            .await
    }

    pub async fn get_session(&self, session_id: &str) -> Option<serde_json::Value> {
        if !self.is_enabled() {
            return None;
        }
        let key = format!("{SESSION_PREFIX}{session_id}");
        self.store.get_json(&key).await
    }

    pub fn stats(&self) -> serde_json::Value {
        serde_json::json!({
            "enabled": self.is_enabled(),
            "persistent": self.mirror.is_some(),
            "cache_ttl": self.cache_ttl,
            "history_ttl": self.history_ttl,
            "max_history": self.max_history,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::embedded::EmbeddedStore;

    async fn service(dir: &tempfile::TempDir) -> MemoryService {
        let store = EmbeddedStore::connect(dir.path().join("memory.db"))
            .await
            .unwrap();
        MemoryService::new(Arc::new(store), None)
    }

    fn source() -> SourceRef {
        SourceRef {
            id: "D1".to_string(),
            name: "두통엔정".to_string(),
            similarity: 0.82,
        }
    }

    #[test]
    fn hash_is_stable_under_case_and_whitespace() {
        let a = MemoryService::hash_query("두통약 추천  ");
        let b = MemoryService::hash_query("  두통약 추천");
        assert_eq!(a, b);
        assert_eq!(
            MemoryService::hash_query("Tylenol"),
            MemoryService::hash_query("  tylenol  ")
        );
    }

    #[test]
    fn hash_is_16_hex_chars() {
        let hash = MemoryService::hash_query("머리가 아파요");
        assert_eq!(hash.len(), 16);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn different_queries_hash_differently() {
        assert_ne!(
            MemoryService::hash_query("두통"),
            MemoryService::hash_query("복통")
        );
    }

    #[tokio::test]
    async fn cache_miss_then_hit_increments_count() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir).await;

        assert!(service.get_cached_response("두통약 추천").await.is_none());

        service
            .cache_response("두통약 추천", "타이레놀을 참고하세요", &[source()])
            .await;

        let hit = service.get_cached_response("두통약 추천").await.unwrap();
        assert_eq!(hit.response, "타이레놀을 참고하세요");
        assert_eq!(hit.hit_count, 2);
        assert_eq!(hit.sources, vec![source()]);

        let again = service.get_cached_response("두통약 추천").await.unwrap();
        assert_eq!(again.hit_count, 3);
    }

    #[tokio::test]
    async fn cache_key_normalization_hits_variant_spelling() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir).await;
        service.cache_response("Tylenol 추천", "응답", &[]).await;
        assert!(service.get_cached_response("  tylenol 추천 ").await.is_some());
        assert!(service.is_duplicate_query("TYLENOL 추천").await);
    }

    #[tokio::test]
    async fn history_ring_keeps_most_recent_window() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir).await.with_limits(3600, 86_400, 20);

        for i in 1..=25 {
            service
                .add_to_history("S", &format!("질문 {i}"), &format!("응답 {i}"), &[])
                .await
                .unwrap();
        }

        let history = service.get_history("S", None).await;
        assert_eq!(history.len(), 20);
        // Appends 6..=25 survive, in order.
        assert_eq!(history[0].query, "질문 6");
        assert_eq!(history[19].query, "질문 25");
    }

    #[tokio::test]
    async fn turn_count_caps_at_max_history() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir).await.with_limits(3600, 86_400, 3);

        assert_eq!(service.add_to_history("S", "q1", "r1", &[]).await, Some(1));
        assert_eq!(service.add_to_history("S", "q2", "r2", &[]).await, Some(2));
        assert_eq!(service.add_to_history("S", "q3", "r3", &[]).await, Some(3));
        assert_eq!(service.add_to_history("S", "q4", "r4", &[]).await, Some(3));
    }

    #[tokio::test]
    async fn malformed_history_entries_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(
            EmbeddedStore::connect(dir.path().join("memory.db"))
                .await
                .unwrap(),
        );
        let service = MemoryService::new(store.clone(), None);

        let _ = service.add_to_history("S", "정상 질문", "응답", &[]).await;
        store.rpush("history:S", "not json at all").await;
        let _ = service.add_to_history("S", "정상 질문 2", "응답", &[]).await;

        let history = service.get_history("S", None).await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].query, "정상 질문");
    }

    #[tokio::test]
    async fn recent_context_truncates_long_responses() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir).await;
        service
            .add_to_history("S", "질문", &"가".repeat(300), &[])
            .await;

        let context = service.get_recent_context("S", 3).await;
        assert!(context.starts_with("[이전 대화 내용]"));
        assert!(context.contains("사용자 질문 1: 질문"));
        assert!(context.contains("..."));
        assert!(!context.contains(&"가".repeat(201)));
    }

    #[tokio::test]
    async fn clear_history_empties_session() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir).await;
        let _ = service.add_to_history("S", "q", "r", &[]).await;
        assert!(service.clear_history("S").await);
        assert!(service.get_history("S", None).await.is_empty());
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let dir = tempfile::tempdir().unwrap();
        let service = service(&dir).await;

        service
            .create_session("S1", Some(serde_json::json!({"channel": "web"})))
            .await;
        let session = service.get_session("S1").await.unwrap();
        assert_eq!(session["channel"], "web");
        assert!(session["created_at"].is_string());

        assert!(service.update_session_activity("S1").await);
        assert!(!service.update_session_activity("missing").await);
    }

    #[tokio::test]
    async fn durable_mirror_records_turns() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("mirror.db")).unwrap();
        let store = EmbeddedStore::connect(dir.path().join("memory.db"))
            .await
            .unwrap();
        let service = MemoryService::new(Arc::new(store), Some(db.clone()));

        let _ = service.add_to_history("S1", "질문 1", "응답 1", &[source()]).await;
        let _ = service.add_to_history("S1", "질문 2", "응답 2", &[]).await;

        let conn = db.connect().unwrap();
        let rows = repository::session_history(&conn, "S1").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].turn_number, 1);
        assert_eq!(rows[1].turn_number, 2);
        assert_eq!(rows[0].query, "질문 1");
        assert_eq!(rows[0].query_hash, MemoryService::hash_query("질문 1"));
    }
}
