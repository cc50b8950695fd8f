//! Clients for external collaborators: embedding/answer models, the
//! reranker, and the upstream drug catalog. Each is a thin reqwest
//! wrapper behind a capability trait so the pipeline can be exercised
//! with stand-ins.

pub mod catalog;
pub mod cohere;
pub mod openai;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed response: {0}")]
    Malformed(String),
}
