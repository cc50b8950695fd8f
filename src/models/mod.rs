//! Row types for the relational store.

use serde::{Deserialize, Serialize};

/// Drug record as synced from the upstream catalog.
///
/// Immutable after ingest except by resync (full-field overwrite by id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Drug {
    /// Catalog item code (opaque, up to 100 chars).
    pub id: String,
    pub item_name: String,
    pub entp_name: Option<String>,
    pub efficacy: Option<String>,
    pub use_method: Option<String>,
    pub warning_info: Option<String>,
    pub caution_info: Option<String>,
    pub interaction: Option<String>,
    pub side_effects: Option<String>,
    pub storage_method: Option<String>,
    pub data_source: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Disease {
    pub id: String,
    pub name: String,
    pub name_en: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub causes: Option<String>,
    pub symptoms: Option<String>,
    pub diagnosis: Option<String>,
    pub treatment: Option<String>,
    pub prevention: Option<String>,
    pub related_drugs: Option<String>,
}

/// Append-only search analytics row. Write failures are swallowed.
#[derive(Debug, Clone)]
pub struct SearchLog {
    pub query: String,
    pub result_count: i64,
    pub response_time_ms: i64,
}

/// Durable mirror of a conversation session (persistent memory only).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: String,
    pub created_at: String,
    pub last_activity: String,
    pub metadata: Option<serde_json::Value>,
}

/// One durable conversation turn, append-only.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationRow {
    pub id: String,
    pub session_id: String,
    pub turn_number: i64,
    pub query: String,
    pub query_hash: String,
    pub response: String,
    pub sources: Option<serde_json::Value>,
    pub created_at: String,
}
