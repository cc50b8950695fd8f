//! Score fusion for the dense + lexical fallback path.
//!
//! Component scores live in [0, 1]: dense is cosine similarity, sparse
//! is the raw lexical score capped against a configured ceiling. The
//! hybrid score is the weighted sum: deterministic, no adaptive
//! reweighting.

use serde::Serialize;

use crate::search::bm25::Bm25Hit;

/// One candidate moving through the pipeline.
///
/// Every retrieval stage reads and writes this shape; conversion to
/// the response type happens once at pipeline exit.
#[derive(Debug, Clone, Serialize)]
pub struct CandidateRecord {
    pub drug_id: String,
    pub item_name: String,
    pub entp_name: Option<String>,
    pub efficacy: Option<String>,
    pub use_method: Option<String>,
    pub caution_info: Option<String>,
    pub side_effects: Option<String>,
    /// Original dense cosine similarity where present.
    pub similarity: f32,
    pub dense_score: Option<f32>,
    pub sparse_score: Option<f32>,
    pub hybrid_score: Option<f32>,
    pub relevance_score: Option<f32>,
    pub original_rank: Option<usize>,
}

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub dense: f32,
    pub sparse: f32,
}

impl Default for FusionWeights {
    fn default() -> Self {
        Self {
            dense: 0.7,
            sparse: 0.3,
        }
    }
}

/// Cap a raw sparse score into [0, 1] against the configured ceiling.
pub fn normalize_sparse(raw: f32, max_score: f32) -> f32 {
    if max_score <= 0.0 {
        return 0.0;
    }
    (raw / max_score).clamp(0.0, 1.0)
}

/// Union dense and lexical candidates by drug id and rank by the
/// weighted hybrid score. A missing component scores zero. Ordering is
/// non-increasing and stable on ties; the result is truncated to
/// `top_k`.
pub fn fuse(
    dense: Vec<CandidateRecord>,
    lexical: Vec<Bm25Hit>,
    weights: FusionWeights,
    sparse_max_score: f32,
    top_k: usize,
) -> Vec<CandidateRecord> {
    let mut merged: Vec<CandidateRecord> = Vec::with_capacity(dense.len() + lexical.len());

    for mut candidate in dense {
        let dense_score = candidate.dense_score.unwrap_or(candidate.similarity);
        let sparse_raw = lexical
            .iter()
            .find(|hit| hit.document.drug_id == candidate.drug_id)
            .map(|hit| hit.bm25_score);
        let sparse_score = sparse_raw
            .map(|raw| normalize_sparse(raw, sparse_max_score))
            .unwrap_or(0.0);

        candidate.dense_score = Some(dense_score);
        candidate.sparse_score = Some(sparse_score);
        candidate.hybrid_score =
            Some(weights.dense * dense_score + weights.sparse * sparse_score);
        merged.push(candidate);
    }

    for hit in lexical {
        if merged.iter().any(|c| c.drug_id == hit.document.drug_id) {
            continue;
        }
        let sparse_score = normalize_sparse(hit.bm25_score, sparse_max_score);
        let hybrid = weights.sparse * sparse_score;
        merged.push(CandidateRecord {
            drug_id: hit.document.drug_id,
            item_name: hit.document.item_name,
            entp_name: hit.document.entp_name,
            efficacy: hit.document.efficacy,
            use_method: hit.document.use_method,
            caution_info: hit.document.caution_info,
            side_effects: hit.document.side_effects,
            // No dense similarity exists for a lexical-only hit; carry
            // the hybrid score so downstream consumers see a value.
            similarity: hybrid,
            dense_score: Some(0.0),
            sparse_score: Some(sparse_score),
            hybrid_score: Some(hybrid),
            relevance_score: None,
            original_rank: None,
        });
    }

    sort_by_hybrid(&mut merged);
    merged.truncate(top_k);
    merged
}

/// Stable non-increasing sort on the hybrid score.
pub fn sort_by_hybrid(candidates: &mut [CandidateRecord]) {
    candidates.sort_by(|a, b| {
        let a = a.hybrid_score.unwrap_or(0.0);
        let b = b.hybrid_score.unwrap_or(0.0);
        b.partial_cmp(&a).unwrap_or(std::cmp::Ordering::Equal)
    });
}
