//! Catalog → store → indices synchronization.
//!
//! Sync fetches pages, cleans, upserts drug rows, then (optionally)
//! rebuilds vectors: wipe dense rows, embed in batches, insert fresh,
//! upsert into the native store when present, refresh the lexical
//! index. Rebuild is the same without the fetch. Data committed before
//! a failing step stays committed.

use std::sync::Arc;

use serde::Serialize;

use super::preprocess::{disease_documents, drug_document, preprocess};
use super::IngestError;
use crate::db::{repository, Database};
use crate::external::catalog::CatalogClient;
use crate::models::Drug;
use crate::search::bm25::Bm25Index;
use crate::search::dense::{DenseIndex, NewVector};
use crate::search::sparse::SparseEncode;
use crate::search::vector_store::{IndexDocument, VectorStoreBackend};
use crate::search::Embedder;

// Sparse model batches stay small for memory; the dense embedding
// client batches at 100 internally.
const SPARSE_BATCH: usize = 8;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncStats {
    pub fetched: usize,
    pub processed: usize,
    pub saved: usize,
    pub vectors_created: usize,
    pub errors: usize,
}

pub struct SyncService {
    db: Database,
    catalog: CatalogClient,
    embedder: Arc<dyn Embedder>,
    sparse_encoder: Arc<dyn SparseEncode>,
    dense: DenseIndex,
    native_store: Option<Arc<dyn VectorStoreBackend>>,
    bm25: Arc<Bm25Index>,
}

impl SyncService {
    pub fn new(
        db: Database,
        catalog: CatalogClient,
        embedder: Arc<dyn Embedder>,
        sparse_encoder: Arc<dyn SparseEncode>,
        dense: DenseIndex,
        native_store: Option<Arc<dyn VectorStoreBackend>>,
        bm25: Arc<Bm25Index>,
    ) -> Self {
        Self {
            db,
            catalog,
            embedder,
            sparse_encoder,
            dense,
            native_store,
            bm25,
        }
    }

    /// Fetch up to `max_pages` catalog pages and upsert them, then
    /// rebuild vectors when `build_vectors` is set.
    pub async fn sync_drugs(
        &self,
        max_pages: usize,
        build_vectors: bool,
    ) -> Result<SyncStats, IngestError> {
        let mut stats = SyncStats::default();

        let raw = match self.catalog.collect_all(max_pages, 100).await {
            Ok(raw) => raw,
            Err(error) => {
                stats.errors += 1;
                tracing::error!(%error, "catalog fetch failed");
                return Err(error.into());
            }
        };
        stats.fetched = raw.len();
        if raw.is_empty() {
            tracing::warn!("catalog returned no records");
            return Ok(stats);
        }

        let processed: Vec<(Drug, String)> = raw.iter().map(preprocess).collect();
        stats.processed = processed.len();

        stats.saved = self.save_drugs(&processed).await?;

        if build_vectors {
            match self.build_vectors(&processed).await {
                Ok(count) => stats.vectors_created = count,
                Err(error) => {
                    stats.errors += 1;
                    tracing::error!(%error, ?stats, "vector build failed after save");
                    return Err(error);
                }
            }
        }

        tracing::info!(?stats, "sync complete");
        Ok(stats)
    }

    async fn save_drugs(&self, processed: &[(Drug, String)]) -> Result<usize, IngestError> {
        let db = self.db.clone();
        let drugs: Vec<Drug> = processed.iter().map(|(drug, _)| drug.clone()).collect();
        let saved = tokio::task::spawn_blocking(move || -> Result<usize, IngestError> {
            let conn = db.connect()?;
            let mut saved = 0;
            for drug in &drugs {
                match repository::upsert_drug(&conn, drug) {
                    Ok(()) => saved += 1,
                    Err(error) => {
                        tracing::warn!(%error, drug_id = %drug.id, "drug save failed; skipping")
                    }
                }
            }
            Ok(saved)
        })
        .await??;
        Ok(saved)
    }

    /// Wipe and rebuild all drug vectors from the given documents.
    async fn build_vectors(&self, processed: &[(Drug, String)]) -> Result<usize, IngestError> {
        self.dense.delete_all_drug_vectors().await?;

        let documents: Vec<String> = processed.iter().map(|(_, doc)| doc.clone()).collect();
        let embeddings = self
            .embedder
            .embed_batch(&documents)
            .await
            .map_err(|e| IngestError::Embedding(e.to_string()))?;
        if embeddings.len() != documents.len() {
            return Err(IngestError::Embedding(format!(
                "expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }
        let rows: Vec<NewVector> = processed
            .iter()
            .zip(&embeddings)
            .map(|((drug, document), embedding)| NewVector {
                owner_id: drug.id.clone(),
                embedding: embedding.clone(),
                document: document.clone(),
                chunk_index: 0,
                chunk_type: None,
            })
            .collect();
        let count = self.dense.insert_drug_vectors(rows).await?;

        if let Some(store) = self.native_store.as_ref().filter(|s| s.is_ready()) {
            let sparse = self
                .sparse_encoder
                .encode_batch(&documents, SPARSE_BATCH)
                .await;
            let docs: Vec<IndexDocument> = processed
                .iter()
                .map(|(drug, _)| IndexDocument {
                    drug_id: drug.id.clone(),
                    item_name: drug.item_name.clone(),
                    entp_name: drug.entp_name.clone(),
                    efficacy: drug.efficacy.clone(),
                    use_method: drug.use_method.clone(),
                    caution_info: drug.caution_info.clone(),
                    side_effects: drug.side_effects.clone(),
                })
                .collect();
            store.upsert_documents(&docs, &embeddings, &sparse).await?;
        }

        self.bm25.refresh().await?;
        Ok(count)
    }

    /// Regenerate documents from stored drugs and rebuild vectors.
    pub async fn rebuild_vectors(&self) -> Result<usize, IngestError> {
        let db = self.db.clone();
        let drugs = tokio::task::spawn_blocking(move || -> Result<Vec<Drug>, IngestError> {
            let conn = db.connect()?;
            Ok(repository::all_drugs(&conn)?)
        })
        .await??;

        if drugs.is_empty() {
            tracing::warn!("no drugs stored; nothing to rebuild");
            return Ok(0);
        }

        let processed: Vec<(Drug, String)> = drugs
            .into_iter()
            .map(|drug| {
                let document = drug_document(&drug);
                (drug, document)
            })
            .collect();
        self.build_vectors(&processed).await
    }

    /// Build disease vectors from stored disease rows (seed path).
    pub async fn rebuild_disease_vectors(&self) -> Result<usize, IngestError> {
        let db = self.db.clone();
        let diseases = tokio::task::spawn_blocking(move || -> Result<_, IngestError> {
            let conn = db.connect()?;
            Ok(repository::all_diseases(&conn)?)
        })
        .await??;

        if diseases.is_empty() {
            return Ok(0);
        }

        self.dense.delete_all_disease_vectors().await?;

        let mut texts: Vec<String> = Vec::new();
        let mut owners: Vec<(String, i64, &'static str)> = Vec::new();
        for disease in &diseases {
            for (chunk_index, (text, chunk_type)) in
                disease_documents(disease).into_iter().enumerate()
            {
                texts.push(text);
                owners.push((disease.id.clone(), chunk_index as i64, chunk_type));
            }
        }

        let embeddings = self
            .embedder
            .embed_batch(&texts)
            .await
            .map_err(|e| IngestError::Embedding(e.to_string()))?;

        let rows: Vec<NewVector> = owners
            .into_iter()
            .zip(texts)
            .zip(embeddings)
            .map(|(((owner_id, chunk_index, chunk_type), document), embedding)| NewVector {
                owner_id,
                embedding,
                document,
                chunk_index,
                chunk_type: Some(chunk_type.to_string()),
            })
            .collect();
        Ok(self.dense.insert_disease_vectors(rows).await?)
    }

    pub async fn stats(&self) -> Result<serde_json::Value, IngestError> {
        let db = self.db.clone();
        let (drugs, diseases) = tokio::task::spawn_blocking(move || -> Result<_, IngestError> {
            let conn = db.connect()?;
            Ok((
                repository::count_drugs(&conn)?,
                repository::count_diseases(&conn)?,
            ))
        })
        .await??;

        let vectors = self.dense.drug_vector_count().await?;
        Ok(serde_json::json!({
            "drugs_count": drugs,
            "diseases_count": diseases,
            "vectors_count": vectors,
            "bm25_documents": self.bm25.document_count(),
        }))
    }
}
