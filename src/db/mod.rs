pub mod repository;
pub mod sqlite;

use std::path::PathBuf;

use rusqlite::Connection;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Handle to the relational store.
///
/// Connections are opened per operation; nothing here is shared across
/// tasks, so no operation ever contends on a live connection handle.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    /// Open (creating parent directories) and migrate the database.
    pub fn open(path: PathBuf) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Self { path };
        let conn = db.connect()?;
        sqlite::run_migrations(&conn)?;
        Ok(db)
    }

    /// Open a fresh connection with the standard pragmas applied.
    pub fn connect(&self) -> Result<Connection, DatabaseError> {
        let conn = Connection::open(&self.path)?;
        sqlite::apply_pragmas(&conn)?;
        Ok(conn)
    }

    pub fn path(&self) -> &PathBuf {
        &self.path
    }
}
