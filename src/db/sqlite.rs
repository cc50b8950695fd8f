//! Schema migrations and connection setup.
//!
//! Migrations are idempotent `CREATE TABLE IF NOT EXISTS` batches so a
//! fresh database and an existing one take the same path.

use rusqlite::Connection;

use super::DatabaseError;

pub fn apply_pragmas(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.pragma_update(None, "busy_timeout", 5000)?;
    Ok(())
}

pub fn run_migrations(conn: &Connection) -> Result<(), DatabaseError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS drugs (
            id              TEXT PRIMARY KEY,
            item_name       TEXT NOT NULL,
            entp_name       TEXT,
            efficacy        TEXT,
            use_method      TEXT,
            warning_info    TEXT,
            caution_info    TEXT,
            interaction     TEXT,
            side_effects    TEXT,
            storage_method  TEXT,
            data_source     TEXT NOT NULL DEFAULT 'data.go.kr',
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_drugs_item_name ON drugs(item_name);

        CREATE TABLE IF NOT EXISTS drug_vectors (
            id              TEXT PRIMARY KEY,
            drug_id         TEXT NOT NULL REFERENCES drugs(id) ON DELETE CASCADE,
            embedding       BLOB NOT NULL,
            document        TEXT NOT NULL,
            chunk_index     INTEGER NOT NULL DEFAULT 0,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_drug_vectors_drug_id ON drug_vectors(drug_id);

        CREATE TABLE IF NOT EXISTS diseases (
            id              TEXT PRIMARY KEY,
            name            TEXT NOT NULL,
            name_en         TEXT,
            category        TEXT,
            description     TEXT,
            causes          TEXT,
            symptoms        TEXT,
            diagnosis       TEXT,
            treatment       TEXT,
            prevention      TEXT,
            related_drugs   TEXT,
            data_source     TEXT NOT NULL DEFAULT 'manual',
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_diseases_name ON diseases(name);

        CREATE TABLE IF NOT EXISTS disease_vectors (
            id              TEXT PRIMARY KEY,
            disease_id      TEXT NOT NULL REFERENCES diseases(id) ON DELETE CASCADE,
            embedding       BLOB NOT NULL,
            document        TEXT NOT NULL,
            chunk_index     INTEGER NOT NULL DEFAULT 0,
            chunk_type      TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_disease_vectors_disease_id ON disease_vectors(disease_id);

        CREATE TABLE IF NOT EXISTS search_logs (
            id              TEXT PRIMARY KEY,
            query           TEXT NOT NULL,
            result_count    INTEGER NOT NULL DEFAULT 0,
            response_time_ms INTEGER,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_search_logs_created_at ON search_logs(created_at);

        CREATE TABLE IF NOT EXISTS sessions (
            id              TEXT PRIMARY KEY,
            created_at      TEXT NOT NULL DEFAULT (datetime('now')),
            last_activity   TEXT NOT NULL DEFAULT (datetime('now')),
            metadata        TEXT
        );

        CREATE TABLE IF NOT EXISTS conversation_history (
            id              TEXT PRIMARY KEY,
            session_id      TEXT NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
            turn_number     INTEGER NOT NULL,
            query           TEXT NOT NULL,
            query_hash      TEXT NOT NULL,
            response        TEXT NOT NULL,
            sources         TEXT,
            created_at      TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_conv_session_turn
            ON conversation_history(session_id, turn_number);
        CREATE INDEX IF NOT EXISTS idx_conv_query_hash
            ON conversation_history(query_hash);
        ",
    )?;
    Ok(())
}

/// In-memory database with migrations applied, for tests.
pub fn open_memory_database() -> Result<Connection, DatabaseError> {
    let conn = Connection::open_in_memory()?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    run_migrations(&conn)?;
    Ok(conn)
}
