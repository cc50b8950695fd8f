//! Graph read endpoints. Every route answers 503 when the graph
//! collaborator is not configured.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::error::ApiError;
use crate::api::types::AppState;
use crate::graph::{
    CrossInteraction, DiseaseDrug, DrugInteraction, GraphData, GraphSource, GraphStats,
    RelatedDrug, SymptomDrug,
};

fn require_graph(state: &AppState) -> Result<Arc<dyn GraphSource>, ApiError> {
    state
        .graph
        .clone()
        .ok_or_else(|| ApiError::ServiceUnavailable("graph service disabled".into()))
}

#[derive(Deserialize)]
pub struct DepthQuery {
    pub depth: Option<usize>,
}

#[derive(Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// `GET /graph/health`
pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "enabled": state.graph.is_some(),
    }))
}

#[derive(Serialize)]
pub struct GraphStatsResponse {
    pub success: bool,
    pub stats: GraphStats,
}

/// `GET /graph/stats`
pub async fn stats(State(state): State<AppState>) -> Result<Json<GraphStatsResponse>, ApiError> {
    let graph = require_graph(&state)?;
    let stats = graph.stats().await?;
    Ok(Json(GraphStatsResponse {
        success: true,
        stats,
    }))
}

#[derive(Serialize)]
pub struct InteractionsResponse {
    pub success: bool,
    pub drug_id: String,
    pub interactions: Vec<DrugInteraction>,
    pub total: usize,
}

/// `GET /graph/drug/{id}/interactions?depth=1..3`
pub async fn interactions(
    State(state): State<AppState>,
    Path(drug_id): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<InteractionsResponse>, ApiError> {
    let depth = query.depth.unwrap_or(1);
    if !(1..=3).contains(&depth) {
        return Err(ApiError::BadRequest("depth must be between 1 and 3".into()));
    }
    let graph = require_graph(&state)?;
    let interactions = graph.drug_interactions(&drug_id).await?;
    let total = interactions.len();
    Ok(Json(InteractionsResponse {
        success: true,
        drug_id,
        interactions,
        total,
    }))
}

#[derive(Serialize)]
pub struct RelatedResponse {
    pub success: bool,
    pub drug_id: String,
    pub related: Vec<RelatedDrug>,
}

/// `GET /graph/drug/{id}/related?limit=1..50`
pub async fn related(
    State(state): State<AppState>,
    Path(drug_id): Path<String>,
    Query(query): Query<LimitQuery>,
) -> Result<Json<RelatedResponse>, ApiError> {
    let limit = query.limit.unwrap_or(10);
    if !(1..=50).contains(&limit) {
        return Err(ApiError::BadRequest("limit must be between 1 and 50".into()));
    }
    let graph = require_graph(&state)?;
    let related = graph.related_drugs(&drug_id, limit).await?;
    Ok(Json(RelatedResponse {
        success: true,
        drug_id,
        related,
    }))
}

#[derive(Serialize)]
pub struct DrugGraphResponse {
    pub success: bool,
    pub drug_id: String,
    pub graph: GraphData,
}

/// `GET /graph/drug/{id}/graph?depth=1..3`
pub async fn drug_graph(
    State(state): State<AppState>,
    Path(drug_id): Path<String>,
    Query(query): Query<DepthQuery>,
) -> Result<Json<DrugGraphResponse>, ApiError> {
    let depth = query.depth.unwrap_or(2);
    if !(1..=3).contains(&depth) {
        return Err(ApiError::BadRequest("depth must be between 1 and 3".into()));
    }
    let graph = require_graph(&state)?;
    let data = graph.drug_graph(&drug_id, depth).await?;
    Ok(Json(DrugGraphResponse {
        success: true,
        drug_id,
        graph: data,
    }))
}

#[derive(Serialize)]
pub struct DiseaseDrugsResponse {
    pub success: bool,
    pub disease_id: String,
    pub drugs: Vec<DiseaseDrug>,
}

/// `GET /graph/disease/{id}/drugs`
pub async fn disease_drugs(
    State(state): State<AppState>,
    Path(disease_id): Path<String>,
) -> Result<Json<DiseaseDrugsResponse>, ApiError> {
    let graph = require_graph(&state)?;
    let drugs = graph.drugs_for_disease(&disease_id, 20).await?;
    Ok(Json(DiseaseDrugsResponse {
        success: true,
        disease_id,
        drugs,
    }))
}

#[derive(Serialize)]
pub struct SymptomDrugsResponse {
    pub success: bool,
    pub symptom: String,
    pub drugs: Vec<SymptomDrug>,
}

/// `GET /graph/symptom/{symptom}/drugs`
pub async fn symptom_drugs(
    State(state): State<AppState>,
    Path(symptom): Path<String>,
) -> Result<Json<SymptomDrugsResponse>, ApiError> {
    let graph = require_graph(&state)?;
    let drugs = graph.drugs_for_symptom(&symptom, 20).await?;
    Ok(Json(SymptomDrugsResponse {
        success: true,
        symptom,
        drugs,
    }))
}

#[derive(Serialize)]
pub struct CrossInteractionsResponse {
    pub success: bool,
    pub interactions: Vec<CrossInteraction>,
}

#[derive(Deserialize)]
pub struct CrossQuery {
    /// Comma-separated drug ids.
    pub ids: String,
}

/// `GET /graph/interactions?ids=a,b,c`
pub async fn cross_interactions(
    State(state): State<AppState>,
    Query(query): Query<CrossQuery>,
) -> Result<Json<CrossInteractionsResponse>, ApiError> {
    let ids: Vec<String> = query
        .ids
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if ids.len() < 2 {
        return Err(ApiError::BadRequest(
            "at least two drug ids are required".into(),
        ));
    }
    let graph = require_graph(&state)?;
    let interactions = graph.cross_interactions(&ids).await?;
    Ok(Json(CrossInteractionsResponse {
        success: true,
        interactions,
    }))
}
