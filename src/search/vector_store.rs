//! Native multi-vector store adapter.
//!
//! One collection, two named vector fields: "dense" (cosine) and
//! "sparse" (inner product over lexical weights). Point ids are
//! UUIDv5 of the drug id so re-upserts land on the same point. When
//! this store is unreachable the orchestrator runs the relational
//! dense index + lexical index fallback instead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, NamedVectors, PointStruct, Query, QueryPointsBuilder,
    SparseVectorParamsBuilder, SparseVectorsConfigBuilder, UpsertPointsBuilder, Value, Vector,
    VectorInput, VectorParamsBuilder, VectorsConfigBuilder,
};
use qdrant_client::{Payload, Qdrant};
use uuid::Uuid;

use crate::search::fusion::{normalize_sparse, sort_by_hybrid, CandidateRecord, FusionWeights};
use crate::search::sparse::SparseVector;
use crate::search::SearchError;

pub const DENSE_VECTOR_NAME: &str = "dense";
pub const SPARSE_VECTOR_NAME: &str = "sparse";

/// Document metadata stored alongside both vectors.
#[derive(Debug, Clone)]
pub struct IndexDocument {
    pub drug_id: String,
    pub item_name: String,
    pub entp_name: Option<String>,
    pub efficacy: Option<String>,
    pub use_method: Option<String>,
    pub caution_info: Option<String>,
    pub side_effects: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CollectionStats {
    pub name: String,
    pub points: u64,
    pub status: String,
}

#[async_trait]
pub trait VectorStoreBackend: Send + Sync {
    fn is_ready(&self) -> bool;

    async fn upsert_documents(
        &self,
        docs: &[IndexDocument],
        dense: &[Vec<f32>],
        sparse: &[SparseVector],
    ) -> Result<usize, SearchError>;

    async fn hybrid_search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        top_k: usize,
        weights: FusionWeights,
    ) -> Result<Vec<CandidateRecord>, SearchError>;

    async fn dense_search(
        &self,
        dense: &[f32],
        top_k: usize,
    ) -> Result<Vec<CandidateRecord>, SearchError>;

    async fn collection_info(&self) -> Result<CollectionStats, SearchError>;

    async fn delete_collection(&self) -> Result<(), SearchError>;
}

pub struct QdrantStore {
    client: Qdrant,
    collection: String,
    sparse_max_score: f32,
    ready: AtomicBool,
}

impl QdrantStore {
    /// Connect and make sure the collection exists with both vector
    /// fields configured.
    pub async fn connect(
        url: &str,
        collection: &str,
        dense_dim: usize,
        sparse_max_score: f32,
    ) -> Result<Self, SearchError> {
        let client = Qdrant::from_url(url)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;

        let store = Self {
            client,
            collection: collection.to_string(),
            sparse_max_score,
            ready: AtomicBool::new(false),
        };
        store.ensure_collection(dense_dim as u64).await?;
        store.ready.store(true, Ordering::Relaxed);
        tracing::info!(collection, "vector store ready");
        Ok(store)
    }

    async fn ensure_collection(&self, dense_dim: u64) -> Result<(), SearchError> {
        let exists = self
            .client
            .collection_exists(&self.collection)
            .await
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;
        if exists {
            return Ok(());
        }

        let mut vectors = VectorsConfigBuilder::default();
        vectors.add_named_vector_params(
            DENSE_VECTOR_NAME,
            VectorParamsBuilder::new(dense_dim, Distance::Cosine),
        );
        let mut sparse_vectors = SparseVectorsConfigBuilder::default();
        sparse_vectors
            .add_named_vector_params(SPARSE_VECTOR_NAME, SparseVectorParamsBuilder::default());

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(vectors)
                    .sparse_vectors_config(sparse_vectors),
            )
            .await
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;
        tracing::info!(collection = %self.collection, dense_dim, "collection created");
        Ok(())
    }

    fn point_id_for(drug_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_DNS, drug_id.as_bytes()).to_string()
    }
}

#[async_trait]
impl VectorStoreBackend for QdrantStore {
    fn is_ready(&self) -> bool {
        self.ready.load(Ordering::Relaxed)
    }

    async fn upsert_documents(
        &self,
        docs: &[IndexDocument],
        dense: &[Vec<f32>],
        sparse: &[SparseVector],
    ) -> Result<usize, SearchError> {
        if docs.len() != dense.len() || docs.len() != sparse.len() {
            return Err(SearchError::VectorStore(format!(
                "document/vector count mismatch: {} docs, {} dense, {} sparse",
                docs.len(),
                dense.len(),
                sparse.len()
            )));
        }

        let mut total = 0;
        for ((doc_chunk, dense_chunk), sparse_chunk) in
            docs.chunks(100).zip(dense.chunks(100)).zip(sparse.chunks(100))
        {
            let mut points = Vec::with_capacity(doc_chunk.len());
            for ((doc, dense_vec), sparse_vec) in
                doc_chunk.iter().zip(dense_chunk).zip(sparse_chunk)
            {
                let payload: Payload = serde_json::json!({
                    "drug_id": doc.drug_id,
                    "item_name": doc.item_name,
                    "entp_name": doc.entp_name.clone().unwrap_or_default(),
                    "efficacy": doc.efficacy.clone().unwrap_or_default(),
                    "use_method": doc.use_method.clone().unwrap_or_default(),
                    "caution_info": doc.caution_info.clone().unwrap_or_default(),
                    "side_effects": doc.side_effects.clone().unwrap_or_default(),
                })
                .try_into()
                .map_err(|e| SearchError::VectorStore(format!("payload: {e}")))?;

                let vectors = NamedVectors::default()
                    .add_vector(DENSE_VECTOR_NAME, Vector::new_dense(dense_vec.clone()))
                    .add_vector(
                        SPARSE_VECTOR_NAME,
                        Vector::new_sparse(sparse_vec.indices.clone(), sparse_vec.values.clone()),
                    );

                points.push(PointStruct::new(
                    Self::point_id_for(&doc.drug_id),
                    vectors,
                    payload,
                ));
            }

            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points))
                .await
                .map_err(|e| SearchError::VectorStore(e.to_string()))?;
            total += doc_chunk.len();
            tracing::debug!(total, "vector store batch upserted");
        }

        Ok(total)
    }

    async fn hybrid_search(
        &self,
        dense: &[f32],
        sparse: &SparseVector,
        top_k: usize,
        weights: FusionWeights,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let dense_response = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection)
                    .query(Query::new_nearest(dense.to_vec()))
                    .using(DENSE_VECTOR_NAME)
                    .limit((top_k * 2) as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;

        let sparse_points = if sparse.is_empty() {
            Vec::new()
        } else {
            self.client
                .query(
                    QueryPointsBuilder::new(&self.collection)
                        .query(Query::new_nearest(VectorInput::new_sparse(
                            sparse.indices.clone(),
                            sparse.values.clone(),
                        )))
                        .using(SPARSE_VECTOR_NAME)
                        .limit((top_k * 2) as u64)
                        .with_payload(true),
                )
                .await
                .map_err(|e| SearchError::VectorStore(e.to_string()))?
                .result
        };

        let mut merged: Vec<CandidateRecord> = Vec::new();

        for point in dense_response.result {
            let Some(mut candidate) = candidate_from_payload(&point.payload) else {
                continue;
            };
            let dense_score = point.score.clamp(0.0, 1.0);
            candidate.similarity = dense_score;
            candidate.dense_score = Some(dense_score);
            candidate.sparse_score = Some(0.0);
            merged.push(candidate);
        }

        for point in sparse_points {
            let Some(candidate) = candidate_from_payload(&point.payload) else {
                continue;
            };
            let sparse_score = normalize_sparse(point.score, self.sparse_max_score);
            if let Some(existing) = merged.iter_mut().find(|c| c.drug_id == candidate.drug_id) {
                existing.sparse_score = Some(sparse_score);
            } else {
                let mut candidate = candidate;
                candidate.dense_score = Some(0.0);
                candidate.sparse_score = Some(sparse_score);
                merged.push(candidate);
            }
        }

        for candidate in &mut merged {
            let dense_score = candidate.dense_score.unwrap_or(0.0);
            let sparse_score = candidate.sparse_score.unwrap_or(0.0);
            let hybrid = weights.dense * dense_score + weights.sparse * sparse_score;
            candidate.hybrid_score = Some(hybrid);
            if candidate.dense_score == Some(0.0) {
                // Sparse-only hit: no cosine similarity exists.
                candidate.similarity = hybrid;
            }
        }

        sort_by_hybrid(&mut merged);
        merged.truncate(top_k);
        Ok(merged)
    }

    async fn dense_search(
        &self,
        dense: &[f32],
        top_k: usize,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let response = self
            .client
            .query(
                QueryPointsBuilder::new(&self.collection)
                    .query(Query::new_nearest(dense.to_vec()))
                    .using(DENSE_VECTOR_NAME)
                    .limit(top_k as u64)
                    .with_payload(true),
            )
            .await
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .filter_map(|point| {
                let mut candidate = candidate_from_payload(&point.payload)?;
                let score = point.score.clamp(0.0, 1.0);
                candidate.similarity = score;
                candidate.dense_score = Some(score);
                Some(candidate)
            })
            .collect())
    }

    async fn collection_info(&self) -> Result<CollectionStats, SearchError> {
        let info = self
            .client
            .collection_info(&self.collection)
            .await
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;
        let result = info
            .result
            .ok_or_else(|| SearchError::VectorStore("no collection info".to_string()))?;
        Ok(CollectionStats {
            name: self.collection.clone(),
            points: result.points_count.unwrap_or(0),
            status: result.status().as_str_name().to_string(),
        })
    }

    async fn delete_collection(&self) -> Result<(), SearchError> {
        self.client
            .delete_collection(&self.collection)
            .await
            .map_err(|e| SearchError::VectorStore(e.to_string()))?;
        self.ready.store(false, Ordering::Relaxed);
        tracing::warn!(collection = %self.collection, "collection deleted");
        Ok(())
    }
}

fn payload_str(
    payload: &std::collections::HashMap<String, Value>,
    key: &str,
) -> Option<String> {
    payload
        .get(key)
        .and_then(|v| v.as_str())
        .map(|s| s.to_string())
        .filter(|s| !s.is_empty())
}

fn candidate_from_payload(
    payload: &std::collections::HashMap<String, Value>,
) -> Option<CandidateRecord> {
    let drug_id = payload_str(payload, "drug_id")?;
    Some(CandidateRecord {
        drug_id,
        item_name: payload_str(payload, "item_name").unwrap_or_default(),
        entp_name: payload_str(payload, "entp_name"),
        efficacy: payload_str(payload, "efficacy"),
        use_method: payload_str(payload, "use_method"),
        caution_info: payload_str(payload, "caution_info"),
        side_effects: payload_str(payload, "side_effects"),
        similarity: 0.0,
        dense_score: None,
        sparse_score: None,
        hybrid_score: None,
        relevance_score: None,
        original_rank: None,
    })
}
