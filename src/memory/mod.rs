//! Session memory fabric: response cache, conversation history and
//! session records over an interchangeable KV/list store.

pub mod embedded;
pub mod redis_store;
pub mod service;
pub mod store;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store connection failed: {0}")]
    Connection(String),

    #[error("memory store I/O failed: {0}")]
    Storage(String),
}
