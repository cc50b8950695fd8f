//! Property-graph knowledge about drugs, diseases and symptoms.
//!
//! Node labels `Drug`, `Disease`, `Symptom`; relations
//! `INTERACTS_WITH`, `TREATS`, `RELIEVES`, `SIMILAR_TO`. Retrieval
//! uses the graph only to enrich an existing result set; a graph
//! failure never fails a search.

pub mod neo4j;

use std::collections::HashSet;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use crate::search::orchestrator::SearchResult;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("graph connection failed: {0}")]
    Connection(String),

    #[error("graph query failed: {0}")]
    Query(String),

    #[error("graph service disabled")]
    Disabled,
}

#[derive(Debug, Clone, Serialize)]
pub struct DrugInteraction {
    pub drug_id: String,
    pub item_name: String,
    pub interaction_type: String,
    pub severity: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RelatedDrug {
    pub drug_id: String,
    pub item_name: String,
    pub relationship_type: String,
    pub score: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct DiseaseDrug {
    pub drug_id: String,
    pub item_name: String,
    pub entp_name: Option<String>,
    pub efficacy_level: String,
    pub evidence: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SymptomDrug {
    pub drug_id: String,
    pub item_name: String,
    pub entp_name: Option<String>,
    pub effectiveness: f64,
}

/// Pairwise interaction between two drugs of one result set.
#[derive(Debug, Clone, Serialize)]
pub struct CrossInteraction {
    pub drug_id_1: String,
    pub item_name_1: String,
    pub drug_id_2: String,
    pub item_name_2: String,
    pub interaction_type: String,
    pub severity: i64,
    pub description: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub label: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct GraphEdge {
    pub source: String,
    pub target: String,
    pub rel_type: String,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct GraphData {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

#[derive(Debug, Clone, Serialize, Default)]
pub struct GraphStats {
    pub drugs: i64,
    pub diseases: i64,
    pub symptoms: i64,
    pub relationships: i64,
}

#[async_trait]
pub trait GraphSource: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Interactions of one drug, ordered by severity descending.
    async fn drug_interactions(&self, drug_id: &str)
        -> Result<Vec<DrugInteraction>, GraphError>;

    /// Similar and interacting drugs, deduplicated and scored
    /// (`similarity_score`, or `1 − severity/5` for interactions).
    async fn related_drugs(&self, drug_id: &str, limit: usize)
        -> Result<Vec<RelatedDrug>, GraphError>;

    /// Drugs treating a disease, primary efficacy first.
    async fn drugs_for_disease(
        &self,
        disease_id: &str,
        limit: usize,
    ) -> Result<Vec<DiseaseDrug>, GraphError>;

    /// Drugs relieving a symptom (exact or case-folded name), most
    /// effective first.
    async fn drugs_for_symptom(
        &self,
        symptom: &str,
        limit: usize,
    ) -> Result<Vec<SymptomDrug>, GraphError>;

    /// Neighborhood of a drug for visualization, depth 1..=3.
    async fn drug_graph(&self, drug_id: &str, depth: usize) -> Result<GraphData, GraphError>;

    /// Pairwise interactions among two or more drugs.
    async fn cross_interactions(
        &self,
        drug_ids: &[String],
    ) -> Result<Vec<CrossInteraction>, GraphError>;

    async fn stats(&self) -> Result<GraphStats, GraphError>;
}

pub fn severity_label(severity: i64) -> &'static str {
    match severity {
        5 => "위험",
        4 => "경고",
        3 => "중간",
        2 => "주의",
        _ => "낮음",
    }
}

/// Format the graph-relation block appended to the prompt context.
///
/// Looks at the first 3 result drugs (up to 3 related drugs each,
/// deduplicated against the result set), up to 2 query symptoms (up to
/// 3 drugs each), and pairwise interactions across the result set.
/// Returns `None` when the graph yields nothing.
pub async fn build_enrichment(
    graph: &dyn GraphSource,
    results: &[SearchResult],
    symptoms: &[String],
) -> Option<String> {
    if !graph.is_enabled() || results.is_empty() {
        return None;
    }

    let result_ids: HashSet<&str> = results.iter().map(|r| r.drug_id.as_str()).collect();
    let mut sections: Vec<String> = Vec::new();

    let mut related_lines: Vec<String> = Vec::new();
    for result in results.iter().take(3) {
        match graph.related_drugs(&result.drug_id, 3).await {
            Ok(related) => {
                let entries: Vec<String> = related
                    .into_iter()
                    .filter(|d| !result_ids.contains(d.drug_id.as_str()))
                    .take(3)
                    .map(|d| format!("{} ({}, {:.2})", d.item_name, d.relationship_type, d.score))
                    .collect();
                if !entries.is_empty() {
                    related_lines
                        .push(format!("- {} 관련: {}", result.item_name, entries.join(", ")));
                }
            }
            Err(error) => tracing::warn!(%error, drug_id = %result.drug_id, "related lookup failed"),
        }
    }
    if !related_lines.is_empty() {
        sections.push(format!("관련 약물:\n{}", related_lines.join("\n")));
    }

    let mut symptom_lines: Vec<String> = Vec::new();
    for symptom in symptoms.iter().take(2) {
        match graph.drugs_for_symptom(symptom, 3).await {
            Ok(drugs) if !drugs.is_empty() => {
                let entries: Vec<String> = drugs
                    .into_iter()
                    .map(|d| format!("{} (효과 {:.2})", d.item_name, d.effectiveness))
                    .collect();
                symptom_lines.push(format!("- {symptom}: {}", entries.join(", ")));
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, symptom, "symptom lookup failed"),
        }
    }
    if !symptom_lines.is_empty() {
        sections.push(format!("증상 완화 약물:\n{}", symptom_lines.join("\n")));
    }

    if result_ids.len() >= 2 {
        let ids: Vec<String> = results.iter().map(|r| r.drug_id.clone()).collect();
        match graph.cross_interactions(&ids).await {
            Ok(interactions) if !interactions.is_empty() => {
                let lines: Vec<String> = interactions
                    .into_iter()
                    .map(|i| {
                        let mut line = format!(
                            "- {} ↔ {}: {} (위험도: {})",
                            i.item_name_1,
                            i.item_name_2,
                            i.interaction_type,
                            severity_label(i.severity),
                        );
                        if !i.description.is_empty() {
                            line.push_str(&format!(" - {}", i.description));
                        }
                        line
                    })
                    .collect();
                sections.push(format!(
                    "함께 검색된 약물 간 상호작용:\n{}",
                    lines.join("\n")
                ));
            }
            Ok(_) => {}
            Err(error) => tracing::warn!(%error, "cross interaction lookup failed"),
        }
    }

    if sections.is_empty() {
        None
    } else {
        Some(format!("[약물 관계 정보]\n{}", sections.join("\n")))
    }
}
