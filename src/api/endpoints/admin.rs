//! Admin endpoints: catalog sync, vector rebuild, stats, health.

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::ingest::sync::SyncStats;

const MAX_SYNC_PAGES: usize = 100;

#[derive(Deserialize)]
pub struct SyncRequest {
    pub max_pages: Option<usize>,
    #[serde(default = "default_true")]
    pub build_vectors: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct SyncResponse {
    pub success: bool,
    pub message: String,
    pub stats: SyncStats,
}

/// `POST /admin/sync`
pub async fn sync(
    State(state): State<AppState>,
    Json(request): Json<SyncRequest>,
) -> Result<Json<SyncResponse>, ApiError> {
    let max_pages = request.max_pages.unwrap_or(10);
    if max_pages == 0 || max_pages > MAX_SYNC_PAGES {
        return Err(ApiError::BadRequest(format!(
            "max_pages must be between 1 and {MAX_SYNC_PAGES}"
        )));
    }

    let stats = state.sync.sync_drugs(max_pages, request.build_vectors).await?;
    Ok(Json(SyncResponse {
        success: true,
        message: format!(
            "동기화 완료: {}개 의약품, {}개 벡터",
            stats.saved, stats.vectors_created
        ),
        stats,
    }))
}

#[derive(Serialize)]
pub struct RebuildResponse {
    pub success: bool,
    pub message: String,
    pub vectors_created: usize,
}

/// `POST /admin/rebuild-vectors`
pub async fn rebuild_vectors(
    State(state): State<AppState>,
) -> Result<Json<RebuildResponse>, ApiError> {
    let count = state.sync.rebuild_vectors().await?;
    Ok(Json(RebuildResponse {
        success: true,
        message: format!("벡터 인덱스 재구축 완료: {count}개"),
        vectors_created: count,
    }))
}

/// `GET /admin/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<serde_json::Value>, ApiError> {
    let mut stats = state.sync.stats().await?;
    if let Some(obj) = stats.as_object_mut() {
        obj.insert("memory".to_string(), state.memory.stats());
        obj.insert(
            "graph_enabled".to_string(),
            serde_json::Value::Bool(state.graph.is_some()),
        );
    }
    Ok(Json(stats))
}

/// `GET /admin/health`
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "mediseek",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
