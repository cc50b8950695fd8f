//! Drug catalog read endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::db::repository;
use crate::models::Drug;

const MAX_PAGE_SIZE: usize = 100;

#[derive(Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Serialize)]
pub struct DrugListResponse {
    pub success: bool,
    pub drugs: Vec<Drug>,
    pub total: i64,
    pub limit: usize,
    pub offset: usize,
}

/// `GET /drugs`
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<DrugListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(20).min(MAX_PAGE_SIZE);
    let offset = query.offset.unwrap_or(0);

    let db = state.db.clone();
    let (drugs, total) = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = db.connect()?;
        Ok((
            repository::list_drugs(&conn, limit, offset)?,
            repository::count_drugs(&conn)?,
        ))
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    Ok(Json(DrugListResponse {
        success: true,
        drugs,
        total,
        limit,
        offset,
    }))
}

#[derive(Serialize)]
pub struct DrugDetailResponse {
    pub success: bool,
    pub drug: Drug,
}

/// `GET /drugs/{id}`
pub async fn detail(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DrugDetailResponse>, ApiError> {
    let db = state.db.clone();
    let drug = tokio::task::spawn_blocking(move || -> Result<_, ApiError> {
        let conn = db.connect()?;
        Ok(repository::get_drug(&conn, &id)?)
    })
    .await
    .map_err(|e| ApiError::Internal(e.to_string()))??;

    match drug {
        Some(drug) => Ok(Json(DrugDetailResponse {
            success: true,
            drug,
        })),
        None => Err(ApiError::NotFound("Drug not found".into())),
    }
}
