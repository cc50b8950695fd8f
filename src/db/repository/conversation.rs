//! Durable mirror of sessions and conversation turns.
//!
//! Only written when persistent memory is enabled; the hot path lives
//! in the memory store. Append-only: turns are never updated.

use rusqlite::{params, Connection, Row};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::{ConversationRow, SessionRow};

/// Insert the session row if new, otherwise refresh `last_activity`.
pub fn upsert_session(
    conn: &Connection,
    session_id: &str,
    metadata: Option<&serde_json::Value>,
) -> Result<(), DatabaseError> {
    let metadata_text = metadata.map(|m| m.to_string());
    conn.execute(
        "INSERT INTO sessions (id, metadata) VALUES (?1, ?2)
         ON CONFLICT(id) DO UPDATE SET last_activity = datetime('now')",
        params![session_id, metadata_text],
    )?;
    Ok(())
}

pub fn get_session(conn: &Connection, session_id: &str) -> Result<Option<SessionRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, created_at, last_activity, metadata FROM sessions WHERE id = ?1",
    )?;
    let mut rows = stmt.query_map(params![session_id], |row| {
        let metadata: Option<String> = row.get(3)?;
        Ok(SessionRow {
            id: row.get(0)?,
            created_at: row.get(1)?,
            last_activity: row.get(2)?,
            metadata: metadata.and_then(|m| serde_json::from_str(&m).ok()),
        })
    })?;
    match rows.next() {
        Some(row) => Ok(Some(row?)),
        None => Ok(None),
    }
}

/// Next turn number for the session (1-based).
pub fn next_turn_number(conn: &Connection, session_id: &str) -> Result<i64, DatabaseError> {
    let max: Option<i64> = conn.query_row(
        "SELECT MAX(turn_number) FROM conversation_history WHERE session_id = ?1",
        params![session_id],
        |r| r.get(0),
    )?;
    Ok(max.unwrap_or(0) + 1)
}

pub fn insert_conversation_turn(
    conn: &Connection,
    session_id: &str,
    turn_number: i64,
    query: &str,
    query_hash: &str,
    response: &str,
    sources: Option<&serde_json::Value>,
) -> Result<(), DatabaseError> {
    conn.execute(
        "INSERT INTO conversation_history
         (id, session_id, turn_number, query, query_hash, response, sources)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            Uuid::new_v4().to_string(),
            session_id,
            turn_number,
            query,
            query_hash,
            response,
            sources.map(|s| s.to_string()),
        ],
    )?;
    Ok(())
}

fn conversation_from_row(row: &Row) -> rusqlite::Result<ConversationRow> {
    let sources: Option<String> = row.get(6)?;
    Ok(ConversationRow {
        id: row.get(0)?,
        session_id: row.get(1)?,
        turn_number: row.get(2)?,
        query: row.get(3)?,
        query_hash: row.get(4)?,
        response: row.get(5)?,
        sources: sources.and_then(|s| serde_json::from_str(&s).ok()),
        created_at: row.get(7)?,
    })
}

pub fn session_history(
    conn: &Connection,
    session_id: &str,
) -> Result<Vec<ConversationRow>, DatabaseError> {
    let mut stmt = conn.prepare(
        "SELECT id, session_id, turn_number, query, query_hash, response, sources, created_at
         FROM conversation_history WHERE session_id = ?1 ORDER BY turn_number",
    )?;
    let rows = stmt.query_map(params![session_id], conversation_from_row)?;

    let mut turns = Vec::new();
    for row in rows {
        turns.push(row?);
    }
    Ok(turns)
}

pub fn delete_session(conn: &Connection, session_id: &str) -> Result<(), DatabaseError> {
    conn.execute("DELETE FROM sessions WHERE id = ?1", params![session_id])?;
    Ok(())
}
