//! `POST /chat` and session history endpoints.
//!
//! The chat flow is bookended by memory: a cache hit short-circuits
//! retrieval entirely (still appending a history turn), a miss runs
//! the full pipeline and writes the cache afterwards.

use axum::extract::{Path, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::memory::service::{ConversationTurn, SourceRef};
use crate::search::prompt;

const MAX_CHAT_TOP_K: usize = 10;
const DEFAULT_CHAT_TOP_K: usize = 5;

#[derive(Deserialize)]
pub struct ChatRequest {
    pub message: String,
    pub session_id: Option<String>,
    pub top_k: Option<usize>,
    #[serde(default = "default_true")]
    pub use_memory: bool,
}

fn default_true() -> bool {
    true
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub success: bool,
    pub message: String,
    pub sources: Vec<SourceRef>,
    pub disclaimer: String,
    pub session_id: String,
    pub from_cache: bool,
    pub conversation_turn: i64,
}

pub async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, ApiError> {
    if request.message.trim().is_empty() {
        return Err(ApiError::BadRequest("message cannot be empty".into()));
    }
    let top_k = request.top_k.unwrap_or(DEFAULT_CHAT_TOP_K);
    if top_k == 0 || top_k > MAX_CHAT_TOP_K {
        return Err(ApiError::BadRequest(format!(
            "top_k must be between 1 and {MAX_CHAT_TOP_K}"
        )));
    }

    let (session_id, is_new_session) = match request.session_id {
        Some(id) => (id, false),
        None => (Uuid::new_v4().to_string(), true),
    };

    let memory_active = request.use_memory && state.memory.is_enabled();
    if memory_active {
        if is_new_session {
            state.memory.create_session(&session_id, None).await;
        } else {
            state.memory.update_session_activity(&session_id).await;
        }

        if let Some(cached) = state.memory.get_cached_response(&request.message).await {
            let turn = state
                .memory
                .add_to_history(&session_id, &request.message, &cached.response, &cached.sources)
                .await
                .unwrap_or(0);
            return Ok(Json(ChatResponse {
                success: true,
                message: cached.response,
                sources: cached.sources,
                disclaimer: prompt::DISCLAIMER.to_string(),
                session_id,
                from_cache: true,
                conversation_turn: turn,
            }));
        }
    }

    let response = state
        .engine
        .search_and_generate(&request.message, top_k, true, state.graph.is_some())
        .await?;

    let sources: Vec<SourceRef> = response
        .results
        .iter()
        .map(|r| SourceRef {
            id: r.drug_id.clone(),
            name: r.item_name.clone(),
            similarity: (r.similarity * 100.0).round() / 100.0,
        })
        .collect();

    let message = response
        .ai_response
        .unwrap_or_else(|| prompt::ANSWER_FALLBACK_MESSAGE.to_string());

    let mut conversation_turn = 0;
    if memory_active {
        state
            .memory
            .cache_response(&request.message, &message, &sources)
            .await;
        conversation_turn = state
            .memory
            .add_to_history(&session_id, &request.message, &message, &sources)
            .await
            .unwrap_or(0);
    }

    Ok(Json(ChatResponse {
        success: true,
        message,
        sources,
        disclaimer: response.disclaimer.to_string(),
        session_id,
        from_cache: false,
        conversation_turn,
    }))
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub success: bool,
    pub session_id: String,
    pub turns: Vec<ConversationTurn>,
    pub total: usize,
}

/// `GET /chat/history/{session_id}`
pub async fn history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let turns = state.memory.get_history(&session_id, None).await;
    let total = turns.len();
    Ok(Json(HistoryResponse {
        success: true,
        session_id,
        turns,
        total,
    }))
}

#[derive(Serialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub session_id: String,
}

/// `DELETE /chat/history/{session_id}`
pub async fn clear_history(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<Json<ClearHistoryResponse>, ApiError> {
    let success = state.memory.clear_history(&session_id).await;
    Ok(Json(ClearHistoryResponse {
        success,
        session_id,
    }))
}
