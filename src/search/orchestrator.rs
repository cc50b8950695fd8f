//! End-to-end query pipeline.
//!
//! Embed once per request, retrieve from the native hybrid store (or
//! the relational dense index + lexical index fallback), fuse, rerank,
//! optionally enrich from the graph, assemble the prompt context and
//! call the answer model. Retrieval always returns a structured
//! response: collaborator failures degrade the pipeline instead of
//! aborting it.

use std::sync::Arc;

use serde::Serialize;

use crate::graph::{build_enrichment, GraphSource};
use crate::search::bm25::Bm25Index;
use crate::search::dense::{DenseIndex, DiseaseCandidate};
use crate::search::fusion::{fuse, CandidateRecord, FusionWeights};
use crate::search::prompt;
use crate::search::reranker::Reranker;
use crate::search::sparse::SparseEncode;
use crate::search::tokenizer::KoreanTokenizer;
use crate::search::vector_store::VectorStoreBackend;
use crate::search::{AnswerModel, Embedder, SearchError};

/// Disease results attached to an integrated answer.
const ANSWER_DISEASE_TOP_K: usize = 2;

#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub drug_id: String,
    pub item_name: String,
    pub entp_name: Option<String>,
    pub efficacy: Option<String>,
    pub use_method: Option<String>,
    pub caution_info: Option<String>,
    pub side_effects: Option<String>,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dense_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sparse_score: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hybrid_score: Option<f32>,
}

impl From<CandidateRecord> for SearchResult {
    fn from(candidate: CandidateRecord) -> Self {
        Self {
            drug_id: candidate.drug_id,
            item_name: candidate.item_name,
            entp_name: candidate.entp_name,
            efficacy: candidate.efficacy,
            use_method: candidate.use_method,
            caution_info: candidate.caution_info,
            side_effects: candidate.side_effects,
            similarity: candidate.similarity,
            relevance_score: candidate.relevance_score,
            dense_score: candidate.dense_score,
            sparse_score: candidate.sparse_score,
            hybrid_score: candidate.hybrid_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct DiseaseResult {
    pub disease_id: String,
    pub name: String,
    pub name_en: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub causes: Option<String>,
    pub symptoms: Option<String>,
    pub treatment: Option<String>,
    pub prevention: Option<String>,
    pub related_drugs: Option<String>,
    pub similarity: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance_score: Option<f32>,
}

impl From<DiseaseCandidate> for DiseaseResult {
    fn from(candidate: DiseaseCandidate) -> Self {
        Self {
            disease_id: candidate.disease_id,
            name: candidate.name,
            name_en: candidate.name_en,
            category: candidate.category,
            description: candidate.description,
            causes: candidate.causes,
            symptoms: candidate.symptoms,
            treatment: candidate.treatment,
            prevention: candidate.prevention,
            related_drugs: candidate.related_drugs,
            similarity: candidate.similarity,
            relevance_score: candidate.relevance_score,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub results: Vec<SearchResult>,
    pub disease_results: Vec<DiseaseResult>,
    pub ai_response: Option<String>,
    pub disclaimer: &'static str,
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub enable_hybrid: bool,
    pub weights: FusionWeights,
    pub bm25_max_score: f32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            enable_hybrid: true,
            weights: FusionWeights::default(),
            bm25_max_score: 30.0,
        }
    }
}

pub struct RetrievalEngine {
    dense: DenseIndex,
    bm25: Arc<Bm25Index>,
    embedder: Arc<dyn Embedder>,
    sparse_encoder: Arc<dyn SparseEncode>,
    reranker: Reranker,
    answerer: Arc<dyn AnswerModel>,
    native_store: Option<Arc<dyn VectorStoreBackend>>,
    graph: Option<Arc<dyn GraphSource>>,
    tokenizer: KoreanTokenizer,
    options: EngineOptions,
}

impl RetrievalEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        dense: DenseIndex,
        bm25: Arc<Bm25Index>,
        embedder: Arc<dyn Embedder>,
        sparse_encoder: Arc<dyn SparseEncode>,
        reranker: Reranker,
        answerer: Arc<dyn AnswerModel>,
        native_store: Option<Arc<dyn VectorStoreBackend>>,
        graph: Option<Arc<dyn GraphSource>>,
        options: EngineOptions,
    ) -> Self {
        Self {
            dense,
            bm25,
            embedder,
            sparse_encoder,
            reranker,
            answerer,
            native_store,
            graph,
            tokenizer: KoreanTokenizer::new(),
            options,
        }
    }

    pub fn bm25(&self) -> &Arc<Bm25Index> {
        &self.bm25
    }

    async fn query_embedding(
        &self,
        query: &str,
        provided: Option<Vec<f32>>,
    ) -> Result<Vec<f32>, SearchError> {
        match provided {
            Some(embedding) => Ok(embedding),
            None => self
                .embedder
                .embed(query)
                .await
                .map_err(|e| SearchError::Embedding(e.to_string())),
        }
    }

    /// Symptom-based drug search.
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        use_reranking: bool,
        query_embedding: Option<Vec<f32>>,
    ) -> Result<Vec<SearchResult>, SearchError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.query_embedding(query, query_embedding).await?;

        let rerank_active = use_reranking && self.reranker.is_enabled();
        let expand_factor = if rerank_active { 5 } else { 3 };
        let initial_k = top_k * expand_factor;

        let candidates = match self.native_store.as_ref().filter(|s| s.is_ready()) {
            Some(store) => {
                let sparse_query = self.sparse_encoder.encode(query, true).await;
                match store
                    .hybrid_search(&embedding, &sparse_query, initial_k, self.options.weights)
                    .await
                {
                    Ok(candidates) => candidates,
                    Err(error) => {
                        tracing::warn!(%error, "native store search failed; using fallback");
                        self.fallback_search(query, embedding, initial_k).await?
                    }
                }
            }
            None => self.fallback_search(query, embedding, initial_k).await?,
        };

        let final_candidates = if rerank_active {
            self.reranker.rerank_drugs(query, candidates, top_k).await
        } else {
            candidates.into_iter().take(top_k).collect()
        };

        tracing::info!(
            results = final_candidates.len(),
            hybrid = self.options.enable_hybrid,
            reranked = rerank_active,
            "drug search complete"
        );
        Ok(final_candidates.into_iter().map(SearchResult::from).collect())
    }

    /// Relational dense index + lexical index fusion.
    async fn fallback_search(
        &self,
        query: &str,
        embedding: Vec<f32>,
        initial_k: usize,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        let dense_candidates = self.dense.search_drugs(embedding, initial_k).await?;

        if !self.options.enable_hybrid {
            return Ok(dense_candidates);
        }

        let lexical = match self.bm25.search(query, initial_k * 3).await {
            Ok(hits) => hits,
            Err(error) => {
                tracing::warn!(%error, "lexical search failed; dense-only");
                return Ok(dense_candidates);
            }
        };

        Ok(fuse(
            dense_candidates,
            lexical,
            self.options.weights,
            self.options.bm25_max_score,
            initial_k,
        ))
    }

    /// Symptom-based disease search with per-disease chunk dedup.
    pub async fn search_diseases(
        &self,
        query: &str,
        top_k: usize,
        use_reranking: bool,
        query_embedding: Option<Vec<f32>>,
    ) -> Result<Vec<DiseaseResult>, SearchError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let embedding = self.query_embedding(query, query_embedding).await?;

        let rerank_active = use_reranking && self.reranker.is_enabled();
        let initial_k = if rerank_active { top_k * 2 } else { top_k };

        // Chunk rows outnumber diseases; over-fetch before dedup.
        let rows = self.dense.search_diseases(embedding, initial_k * 3).await?;
        let mut candidates = dedupe_diseases(rows);
        candidates.truncate(initial_k);

        let final_candidates = if rerank_active {
            self.reranker.rerank_diseases(query, candidates, top_k).await
        } else {
            candidates.into_iter().take(top_k).collect()
        };

        Ok(final_candidates.into_iter().map(DiseaseResult::from).collect())
    }

    /// Retrieval plus integrated answer generation.
    ///
    /// Drug and disease searches run sequentially; they share the
    /// relational store and must not contend on it.
    pub async fn search_and_generate(
        &self,
        query: &str,
        top_k: usize,
        include_diseases: bool,
        include_graph: bool,
    ) -> Result<RagResponse, SearchError> {
        let embedding = self
            .embedder
            .embed(query)
            .await
            .map_err(|e| SearchError::Embedding(e.to_string()))?;

        let results = self
            .search(query, top_k, true, Some(embedding.clone()))
            .await?;

        let disease_results = if include_diseases {
            self.search_diseases(query, ANSWER_DISEASE_TOP_K, true, Some(embedding))
                .await?
        } else {
            Vec::new()
        };

        if results.is_empty() && disease_results.is_empty() {
            return Ok(RagResponse {
                results,
                disease_results,
                ai_response: Some(prompt::NO_RESULTS_MESSAGE.to_string()),
                disclaimer: prompt::DISCLAIMER,
            });
        }

        let graph_block = match (include_graph, &self.graph) {
            (true, Some(graph)) => {
                let symptoms = self.tokenizer.extract_symptoms(query, 2);
                build_enrichment(graph.as_ref(), &results, &symptoms).await
            }
            _ => None,
        };

        let context =
            prompt::format_integrated_context(&results, &disease_results, graph_block.as_deref());

        let ai_response = match self
            .answerer
            .generate(
                prompt::integrated_system_prompt(),
                &prompt::integrated_user_prompt(query, &context),
            )
            .await
        {
            Ok(text) => text,
            Err(error) => {
                tracing::error!(%error, "answer generation failed");
                prompt::ANSWER_FALLBACK_MESSAGE.to_string()
            }
        };

        Ok(RagResponse {
            results,
            disease_results,
            ai_response: Some(ai_response),
            disclaimer: prompt::DISCLAIMER,
        })
    }
}

/// Keep the highest-similarity chunk per disease.
///
/// Input rows are ordered by similarity descending, so the first row
/// seen for a disease is its best chunk.
pub fn dedupe_diseases(rows: Vec<DiseaseCandidate>) -> Vec<DiseaseCandidate> {
    let mut seen = std::collections::HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.disease_id.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::db::repository::{upsert_disease, upsert_drug};
    use crate::db::Database;
    use crate::external::ExternalError;
    use crate::models::{Disease, Drug};
    use crate::search::dense::NewVector;
    use crate::search::reranker::{RerankHit, RerankModel};
    use crate::search::sparse::SparseVector;

    const DIM: usize = 3;

    /// Keyword-axis embedder: axis 0 = headache, 1 = cold, 2 = digestion.
    struct KeywordEmbedder {
        calls: AtomicUsize,
    }

    impl KeywordEmbedder {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(keyword_axis(text))
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalError> {
            Ok(texts.iter().map(|t| keyword_axis(t)).collect())
        }

        fn dimension(&self) -> usize {
            DIM
        }
    }

    fn keyword_axis(text: &str) -> Vec<f32> {
        let mut v = vec![0.05f32; DIM];
        if text.contains("두통") || text.contains("머리") {
            v[0] = 1.0;
        }
        if text.contains("감기") || text.contains("콧물") {
            v[1] = 1.0;
        }
        if text.contains("소화") || text.contains("복통") {
            v[2] = 1.0;
        }
        v
    }

    struct NeverSparse;

    #[async_trait]
    impl SparseEncode for NeverSparse {
        fn is_available(&self) -> bool {
            false
        }
        async fn encode(&self, _text: &str, _expand: bool) -> SparseVector {
            SparseVector::default()
        }
        async fn encode_batch(&self, texts: &[String], _batch: usize) -> Vec<SparseVector> {
            vec![SparseVector::default(); texts.len()]
        }
    }

    struct DisabledRerank;

    #[async_trait]
    impl RerankModel for DisabledRerank {
        fn is_enabled(&self) -> bool {
            false
        }
        async fn rerank(
            &self,
            _query: &str,
            _documents: &[String],
            _top_n: usize,
        ) -> Result<Vec<RerankHit>, ExternalError> {
            Ok(Vec::new())
        }
    }

    struct CannedAnswer;

    #[async_trait]
    impl AnswerModel for CannedAnswer {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, ExternalError> {
            Ok("추천 답변".to_string())
        }
    }

    struct FailingAnswer;

    #[async_trait]
    impl AnswerModel for FailingAnswer {
        async fn generate(&self, _system: &str, _prompt: &str) -> Result<String, ExternalError> {
            Err(ExternalError::Api {
                status: 500,
                message: "down".to_string(),
            })
        }
    }

    async fn seeded_engine(dir: &tempfile::TempDir, answerer: Arc<dyn AnswerModel>) -> RetrievalEngine {
        let db = Database::open(dir.path().join("engine.db")).unwrap();
        let conn = db.connect().unwrap();
        for (id, name, efficacy) in [
            ("D1", "두통엔정", "두통, 치통, 발열 완화"),
            ("D2", "콜드콜시럽", "감기 증상 완화, 콧물, 기침"),
            ("D3", "소화엔정", "소화불량, 복통 개선"),
        ] {
            upsert_drug(
                &conn,
                &Drug {
                    id: id.to_string(),
                    item_name: name.to_string(),
                    entp_name: Some("한국제약".to_string()),
                    efficacy: Some(efficacy.to_string()),
                    use_method: Some("1일 3회".to_string()),
                    warning_info: None,
                    caution_info: None,
                    interaction: None,
                    side_effects: None,
                    storage_method: None,
                    data_source: "seed".to_string(),
                },
            )
            .unwrap();
        }
        upsert_disease(
            &conn,
            &Disease {
                id: "DIS1".to_string(),
                name: "긴장성 두통".to_string(),
                name_en: None,
                category: None,
                description: None,
                causes: Some("스트레스".to_string()),
                symptoms: Some("두통".to_string()),
                diagnosis: None,
                treatment: Some("진통제".to_string()),
                prevention: None,
                related_drugs: None,
            },
        )
        .unwrap();
        drop(conn);

        let dense = DenseIndex::new(db.clone(), DIM);
        dense
            .insert_drug_vectors(vec![
                NewVector {
                    owner_id: "D1".to_string(),
                    embedding: keyword_axis("두통"),
                    document: "두통 문서".to_string(),
                    chunk_index: 0,
                    chunk_type: None,
                },
                NewVector {
                    owner_id: "D2".to_string(),
                    embedding: keyword_axis("감기"),
                    document: "감기 문서".to_string(),
                    chunk_index: 0,
                    chunk_type: None,
                },
                NewVector {
                    owner_id: "D3".to_string(),
                    embedding: keyword_axis("소화"),
                    document: "소화 문서".to_string(),
                    chunk_index: 0,
                    chunk_type: None,
                },
            ])
            .await
            .unwrap();
        dense
            .insert_disease_vectors(vec![
                NewVector {
                    owner_id: "DIS1".to_string(),
                    embedding: keyword_axis("두통"),
                    document: "증상 청크".to_string(),
                    chunk_index: 0,
                    chunk_type: Some("symptoms".to_string()),
                },
                NewVector {
                    owner_id: "DIS1".to_string(),
                    embedding: keyword_axis("기타"),
                    document: "전체 청크".to_string(),
                    chunk_index: 1,
                    chunk_type: Some("full".to_string()),
                },
            ])
            .await
            .unwrap();

        RetrievalEngine::new(
            dense,
            Arc::new(Bm25Index::new(db)),
            Arc::new(KeywordEmbedder::new()),
            Arc::new(NeverSparse),
            Reranker::new(Arc::new(DisabledRerank)),
            answerer,
            None,
            None,
            EngineOptions::default(),
        )
    }

    #[tokio::test]
    async fn headache_query_ranks_headache_drug_first() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(&dir, Arc::new(CannedAnswer)).await;

        let results = engine.search("머리가 아파요", 3, false, None).await.unwrap();
        assert_eq!(results[0].item_name, "두통엔정");
        assert!(results[0].similarity > 0.0);
        assert!(results[0].hybrid_score.is_some());
    }

    #[tokio::test]
    async fn synonym_expansion_recovers_lexical_match() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(&dir, Arc::new(CannedAnswer)).await;

        // "배가" reaches "복통" only through query-side expansion; the
        // embedder sees nothing useful in this phrasing, so the lexical
        // leg has to carry the match.
        let results = engine.search("배가 아파요", 3, false, None).await.unwrap();
        let names: Vec<&str> = results.iter().map(|r| r.item_name.as_str()).collect();
        assert!(names.contains(&"소화엔정"), "expected 소화엔정 in {names:?}");
        assert_eq!(results[0].item_name, "소화엔정");
    }

    #[tokio::test]
    async fn top_k_zero_returns_empty_without_embedding() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(&dir, Arc::new(CannedAnswer)).await;
        let results = engine.search("두통", 0, false, None).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn sparse_failure_still_returns_dense_results() {
        // No native store, lexical corpus present, sparse encoder dead:
        // the pipeline must still surface dense hits.
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(&dir, Arc::new(CannedAnswer)).await;
        let results = engine.search("두통이 심해요", 3, false, None).await.unwrap();
        assert!(!results.is_empty());
    }

    #[tokio::test]
    async fn disease_search_dedupes_chunks() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(&dir, Arc::new(CannedAnswer)).await;

        let diseases = engine
            .search_diseases("머리가 아파요 두통", 3, false, None)
            .await
            .unwrap();
        assert_eq!(diseases.len(), 1);
        assert_eq!(diseases[0].disease_id, "DIS1");
    }

    #[tokio::test]
    async fn generate_embeds_exactly_once() {
        let dir = tempfile::tempdir().unwrap();
        let embedder = Arc::new(KeywordEmbedder::new());
        let db = Database::open(dir.path().join("once.db")).unwrap();
        let engine = RetrievalEngine::new(
            DenseIndex::new(db.clone(), DIM),
            Arc::new(Bm25Index::new(db)),
            embedder.clone(),
            Arc::new(NeverSparse),
            Reranker::new(Arc::new(DisabledRerank)),
            Arc::new(CannedAnswer),
            None,
            None,
            EngineOptions::default(),
        );

        engine
            .search_and_generate("머리가 아파요", 3, true, false)
            .await
            .unwrap();
        assert_eq!(embedder.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_corpus_returns_apology() {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("empty.db")).unwrap();
        let engine = RetrievalEngine::new(
            DenseIndex::new(db.clone(), DIM),
            Arc::new(Bm25Index::new(db)),
            Arc::new(KeywordEmbedder::new()),
            Arc::new(NeverSparse),
            Reranker::new(Arc::new(DisabledRerank)),
            Arc::new(CannedAnswer),
            None,
            None,
            EngineOptions::default(),
        );

        let response = engine
            .search_and_generate("머리가 아파요", 3, true, false)
            .await
            .unwrap();
        assert!(response.results.is_empty());
        assert_eq!(
            response.ai_response.as_deref(),
            Some(prompt::NO_RESULTS_MESSAGE)
        );
        assert_eq!(response.disclaimer, prompt::DISCLAIMER);
    }

    #[tokio::test]
    async fn answer_failure_degrades_to_fallback_message() {
        let dir = tempfile::tempdir().unwrap();
        let engine = seeded_engine(&dir, Arc::new(FailingAnswer)).await;

        let response = engine
            .search_and_generate("머리가 아파요", 3, true, false)
            .await
            .unwrap();
        assert!(!response.results.is_empty());
        assert_eq!(
            response.ai_response.as_deref(),
            Some(prompt::ANSWER_FALLBACK_MESSAGE)
        );
    }

    #[test]
    fn dedupe_keeps_first_occurrence_per_disease() {
        let make = |id: &str, sim: f32| DiseaseCandidate {
            disease_id: id.to_string(),
            name: id.to_string(),
            name_en: None,
            category: None,
            description: None,
            causes: None,
            symptoms: None,
            treatment: None,
            prevention: None,
            related_drugs: None,
            chunk_type: None,
            similarity: sim,
            relevance_score: None,
            original_rank: None,
        };
        let deduped = dedupe_diseases(vec![
            make("A", 0.9),
            make("B", 0.8),
            make("A", 0.7),
            make("B", 0.1),
        ]);
        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].similarity, 0.9);
        assert_eq!(deduped[1].similarity, 0.8);
    }
}
