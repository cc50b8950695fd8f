pub mod bm25;
pub mod dense;
pub mod fusion;
pub mod orchestrator;
pub mod prompt;
pub mod reranker;
pub mod sparse;
pub mod tokenizer;
pub mod vector_store;

use async_trait::async_trait;
use thiserror::Error;

use crate::db::DatabaseError;
use crate::external::ExternalError;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("answer generation failed: {0}")]
    Generation(String),

    #[error("background task failed: {0}")]
    Join(String),
}

impl From<tokio::task::JoinError> for SearchError {
    fn from(err: tokio::task::JoinError) -> Self {
        SearchError::Join(err.to_string())
    }
}

/// Dense embedding capability. One implementation talks to the real
/// embedding API; tests inject deterministic stand-ins.
#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError>;
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalError>;
    fn dimension(&self) -> usize;
}

/// Answer-model capability used at the end of the pipeline.
#[async_trait]
pub trait AnswerModel: Send + Sync {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, ExternalError>;
}
