use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::DatabaseError;
use crate::models::SearchLog;

/// Append a search log row. Queries are truncated to 500 chars.
pub fn insert_search_log(conn: &Connection, log: &SearchLog) -> Result<(), DatabaseError> {
    let query: String = log.query.chars().take(500).collect();
    conn.execute(
        "INSERT INTO search_logs (id, query, result_count, response_time_ms)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            Uuid::new_v4().to_string(),
            query,
            log.result_count,
            log.response_time_ms,
        ],
    )?;
    Ok(())
}

pub fn count_search_logs(conn: &Connection) -> Result<i64, DatabaseError> {
    Ok(conn.query_row("SELECT COUNT(*) FROM search_logs", [], |r| r.get(0))?)
}
