//! `POST /search`: symptom-based drug and disease search.

use std::time::Instant;

use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::db::repository;
use crate::models::SearchLog;
use crate::search::orchestrator::{DiseaseResult, SearchResult};
use crate::search::prompt;

#[derive(Deserialize)]
pub struct SearchRequest {
    pub query: String,
    pub top_k: Option<usize>,
    #[serde(default = "default_true")]
    pub include_ai_response: bool,
    #[serde(default = "default_true")]
    pub include_diseases: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub success: bool,
    pub data: SearchData,
    pub meta: SearchMeta,
}

#[derive(Serialize)]
pub struct SearchData {
    pub results: Vec<SearchResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub disease_results: Option<Vec<DiseaseResult>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ai_response: Option<String>,
    pub disclaimer: String,
}

#[derive(Serialize)]
pub struct SearchMeta {
    pub total_results: usize,
    pub response_time_ms: u64,
    pub query: String,
}

pub async fn search(
    State(state): State<AppState>,
    Json(request): Json<SearchRequest>,
) -> Result<Json<SearchResponse>, ApiError> {
    if request.query.trim().is_empty() {
        return Err(ApiError::BadRequest("query cannot be empty".into()));
    }
    let top_k = request.top_k.unwrap_or(state.limits.default_top_k);
    if top_k > state.limits.max_top_k {
        return Err(ApiError::BadRequest(format!(
            "top_k must be at most {}",
            state.limits.max_top_k
        )));
    }

    let started = Instant::now();

    let (results, disease_results, ai_response, disclaimer) = if request.include_ai_response {
        let response = state
            .engine
            .search_and_generate(
                &request.query,
                top_k,
                request.include_diseases,
                state.graph.is_some(),
            )
            .await?;
        (
            response.results,
            Some(response.disease_results),
            response.ai_response,
            response.disclaimer.to_string(),
        )
    } else {
        let results = state.engine.search(&request.query, top_k, true, None).await?;
        (results, None, None, prompt::DISCLAIMER.to_string())
    };

    let response_time_ms = started.elapsed().as_millis() as u64;
    let total_results = results.len();

    log_search(&state, &request.query, total_results, response_time_ms).await;

    Ok(Json(SearchResponse {
        success: true,
        data: SearchData {
            results,
            disease_results,
            ai_response,
            disclaimer,
        },
        meta: SearchMeta {
            total_results,
            response_time_ms,
            query: request.query,
        },
    }))
}

/// Append-only analytics row; failures are swallowed.
async fn log_search(state: &AppState, query: &str, result_count: usize, response_time_ms: u64) {
    let db = state.db.clone();
    let log = SearchLog {
        query: query.to_string(),
        result_count: result_count as i64,
        response_time_ms: response_time_ms as i64,
    };
    let result = tokio::task::spawn_blocking(move || {
        let conn = db.connect()?;
        repository::insert_search_log(&conn, &log)
    })
    .await;
    if let Ok(Err(error)) = result {
        tracing::debug!(%error, "search log write failed");
    }
}
