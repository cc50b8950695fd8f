//! Cross-encoder reranking stage.
//!
//! Candidate text is re-composed at rerank time rather than reusing
//! the indexing text: leading with efficacy gives the cross-encoder
//! the strongest symptom→indication signal. Any failure degrades to
//! truncation of the incoming order; reranking never aborts a search.

use std::sync::Arc;

use async_trait::async_trait;

use crate::external::ExternalError;
use crate::search::dense::DiseaseCandidate;
use crate::search::fusion::CandidateRecord;

#[derive(Debug, Clone)]
pub struct RerankHit {
    pub index: usize,
    pub relevance_score: f32,
}

#[async_trait]
pub trait RerankModel: Send + Sync {
    fn is_enabled(&self) -> bool;

    /// Score `documents` against `query`; returns up to `top_n` hits
    /// ordered by relevance descending.
    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ExternalError>;
}

#[derive(Clone)]
pub struct Reranker {
    model: Arc<dyn RerankModel>,
}

impl Reranker {
    pub fn new(model: Arc<dyn RerankModel>) -> Self {
        Self { model }
    }

    pub fn is_enabled(&self) -> bool {
        self.model.is_enabled()
    }

    /// Rerank drug candidates down to `top_n`.
    ///
    /// Disabled model, empty input, or a failed call all fall back to
    /// the incoming order truncated to `top_n`.
    pub async fn rerank_drugs(
        &self,
        query: &str,
        mut candidates: Vec<CandidateRecord>,
        top_n: usize,
    ) -> Vec<CandidateRecord> {
        if !self.model.is_enabled() || candidates.is_empty() {
            candidates.truncate(top_n);
            return candidates;
        }

        let documents: Vec<String> = candidates.iter().map(drug_document).collect();
        match self.model.rerank(query, &documents, top_n).await {
            Ok(hits) => apply_hits(candidates, hits, top_n),
            Err(error) => {
                tracing::error!(%error, "rerank failed; keeping fused order");
                candidates.truncate(top_n);
                candidates
            }
        }
    }

    /// Rerank disease candidates using the synthesized disease text.
    pub async fn rerank_diseases(
        &self,
        query: &str,
        mut candidates: Vec<DiseaseCandidate>,
        top_n: usize,
    ) -> Vec<DiseaseCandidate> {
        if !self.model.is_enabled() || candidates.is_empty() {
            candidates.truncate(top_n);
            return candidates;
        }

        let documents: Vec<String> = candidates.iter().map(disease_document).collect();
        match self.model.rerank(query, &documents, top_n).await {
            Ok(hits) => {
                let mut reranked = Vec::with_capacity(hits.len().min(top_n));
                for hit in hits.into_iter().take(top_n) {
                    if let Some(candidate) = candidates.get(hit.index) {
                        let mut candidate = candidate.clone();
                        candidate.relevance_score = Some(hit.relevance_score);
                        candidate.original_rank = Some(hit.index);
                        reranked.push(candidate);
                    }
                }
                reranked
            }
            Err(error) => {
                tracing::error!(%error, "disease rerank failed; keeping dense order");
                candidates.truncate(top_n);
                candidates
            }
        }
    }
}

fn apply_hits(
    candidates: Vec<CandidateRecord>,
    hits: Vec<RerankHit>,
    top_n: usize,
) -> Vec<CandidateRecord> {
    let mut reranked = Vec::with_capacity(hits.len().min(top_n));
    for hit in hits.into_iter().take(top_n) {
        if let Some(candidate) = candidates.get(hit.index) {
            let mut candidate = candidate.clone();
            candidate.relevance_score = Some(hit.relevance_score);
            candidate.original_rank = Some(hit.index);
            reranked.push(candidate);
        }
    }
    reranked
}

/// Rerank text for a drug record, efficacy first.
fn drug_document(candidate: &CandidateRecord) -> String {
    let efficacy = candidate.efficacy.as_deref().unwrap_or("");
    let mut text = format!("{}. 제품명: {}.", efficacy, candidate.item_name);
    if let Some(caution) = &candidate.caution_info {
        let head: String = caution.chars().take(200).collect();
        text.push_str(&format!(" 적용: {head}"));
    }
    text
}

/// Rerank text for a disease record.
fn disease_document(candidate: &DiseaseCandidate) -> String {
    format!(
        "질병: {}. 증상: {}. 원인: {}. 치료: {}",
        candidate.name,
        candidate.symptoms.as_deref().unwrap_or(""),
        candidate.causes.as_deref().unwrap_or(""),
        candidate.treatment.as_deref().unwrap_or(""),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedRanker {
        enabled: bool,
        hits: Vec<RerankHit>,
        fail: bool,
    }

    #[async_trait]
    impl RerankModel for FixedRanker {
        fn is_enabled(&self) -> bool {
            self.enabled
        }

        async fn rerank(
            &self,
            _query: &str,
            _documents: &[String],
            _top_n: usize,
        ) -> Result<Vec<RerankHit>, ExternalError> {
            if self.fail {
                return Err(ExternalError::Api {
                    status: 500,
                    message: "boom".to_string(),
                });
            }
            Ok(self.hits.clone())
        }
    }

    fn candidate(id: &str, efficacy: &str) -> CandidateRecord {
        CandidateRecord {
            drug_id: id.to_string(),
            item_name: format!("제품{id}"),
            entp_name: None,
            efficacy: Some(efficacy.to_string()),
            use_method: None,
            caution_info: Some("주의사항 본문".to_string()),
            side_effects: None,
            similarity: 0.5,
            dense_score: Some(0.5),
            sparse_score: None,
            hybrid_score: Some(0.5),
            relevance_score: None,
            original_rank: None,
        }
    }

    #[tokio::test]
    async fn reorders_by_relevance_and_records_original_rank() {
        let reranker = Reranker::new(Arc::new(FixedRanker {
            enabled: true,
            fail: false,
            hits: vec![
                RerankHit { index: 2, relevance_score: 0.95 },
                RerankHit { index: 0, relevance_score: 0.40 },
            ],
        }));

        let input = vec![candidate("A", "두통"), candidate("B", "감기"), candidate("C", "복통")];
        let out = reranker.rerank_drugs("배가 아파요", input, 2).await;

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].drug_id, "C");
        assert_eq!(out[0].relevance_score, Some(0.95));
        assert_eq!(out[0].original_rank, Some(2));
        // Fused score survives for diagnostics.
        assert_eq!(out[0].hybrid_score, Some(0.5));
    }

    #[tokio::test]
    async fn disabled_model_truncates() {
        let reranker = Reranker::new(Arc::new(FixedRanker {
            enabled: false,
            fail: false,
            hits: vec![],
        }));
        let input = vec![candidate("A", "a"), candidate("B", "b"), candidate("C", "c")];
        let out = reranker.rerank_drugs("q", input, 2).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].drug_id, "A");
        assert!(out[0].relevance_score.is_none());
    }

    #[tokio::test]
    async fn failure_truncates_instead_of_propagating() {
        let reranker = Reranker::new(Arc::new(FixedRanker {
            enabled: true,
            fail: true,
            hits: vec![],
        }));
        let input = vec![candidate("A", "a"), candidate("B", "b")];
        let out = reranker.rerank_drugs("q", input, 1).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].drug_id, "A");
    }

    #[tokio::test]
    async fn empty_input_stays_empty() {
        let reranker = Reranker::new(Arc::new(FixedRanker {
            enabled: true,
            fail: false,
            hits: vec![],
        }));
        let out = reranker.rerank_drugs("q", Vec::new(), 5).await;
        assert!(out.is_empty());
    }

    #[test]
    fn drug_document_leads_with_efficacy() {
        let doc = drug_document(&candidate("A", "두통, 발열"));
        assert!(doc.starts_with("두통, 발열. 제품명: 제품A."));
        assert!(doc.contains("적용: 주의사항 본문"));
    }
}
