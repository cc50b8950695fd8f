//! Shared state handed to every handler.

use std::sync::Arc;

use crate::db::Database;
use crate::graph::GraphSource;
use crate::ingest::sync::SyncService;
use crate::memory::service::MemoryService;
use crate::search::orchestrator::RetrievalEngine;

/// Request-validation bounds, taken from configuration at startup.
#[derive(Debug, Clone)]
pub struct ApiLimits {
    pub default_top_k: usize,
    pub max_top_k: usize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            default_top_k: 5,
            max_top_k: 20,
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub engine: Arc<RetrievalEngine>,
    pub memory: Arc<MemoryService>,
    pub graph: Option<Arc<dyn GraphSource>>,
    pub sync: Arc<SyncService>,
    pub limits: ApiLimits,
}
