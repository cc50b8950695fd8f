pub mod preprocess;
pub mod sync;

use thiserror::Error;

use crate::db::DatabaseError;
use crate::external::ExternalError;
use crate::search::SearchError;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("catalog fetch failed: {0}")]
    Catalog(#[from] ExternalError),

    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("index error: {0}")]
    Index(#[from] SearchError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for IngestError {
    fn from(err: tokio::task::JoinError) -> Self {
        IngestError::Task(err.to_string())
    }
}
