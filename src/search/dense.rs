//! Dense (cosine) k-NN over embeddings stored in the relational store.
//!
//! Embeddings live as little-endian f32 blobs next to their parent
//! rows. Search scans and scores in a blocking task; the corpus is
//! catalog-sized (thousands of rows), so a brute-force scan answers
//! well inside the fallback path's deadline.

use rusqlite::{params, Connection};
use uuid::Uuid;

use crate::db::{Database, DatabaseError};
use crate::search::fusion::CandidateRecord;
use crate::search::SearchError;

/// New embedding row to persist.
#[derive(Debug, Clone)]
pub struct NewVector {
    pub owner_id: String,
    pub embedding: Vec<f32>,
    pub document: String,
    pub chunk_index: i64,
    /// Disease vectors only; tags what the chunk covers.
    pub chunk_type: Option<String>,
}

/// One disease row scored against the query.
#[derive(Debug, Clone)]
pub struct DiseaseCandidate {
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
    pub chunk_type: Option<String>,
    pub similarity: f32,
    pub relevance_score: Option<f32>,
    pub original_rank: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct DenseIndex {
    db: Database,
    dimension: usize,
}

impl DenseIndex {
    pub fn new(db: Database, dimension: usize) -> Self {
        Self { db, dimension }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn check_dimension(&self, embedding: &[f32]) -> Result<(), DatabaseError> {
        if embedding.len() != self.dimension {
            return Err(DatabaseError::DimensionMismatch {
                expected: self.dimension,
                actual: embedding.len(),
            });
        }
        Ok(())
    }

    // ── Drug vectors ────────────────────────────────────────────

    pub async fn insert_drug_vectors(&self, rows: Vec<NewVector>) -> Result<usize, SearchError> {
        for row in &rows {
            self.check_dimension(&row.embedding)?;
        }
        let db = self.db.clone();
        let count = tokio::task::spawn_blocking(move || -> Result<usize, SearchError> {
            let mut conn = db.connect()?;
            let tx = conn.transaction().map_err(DatabaseError::from)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO drug_vectors (id, drug_id, embedding, document, chunk_index)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    )
                    .map_err(DatabaseError::from)?;
                for row in &rows {
                    stmt.execute(params![
                        Uuid::new_v4().to_string(),
                        row.owner_id,
                        embedding_to_bytes(&row.embedding),
                        row.document,
                        row.chunk_index,
                    ])
                    .map_err(DatabaseError::from)?;
                }
            }
            tx.commit().map_err(DatabaseError::from)?;
            Ok(rows.len())
        })
        .await??;

        tracing::debug!(count, "drug vectors stored");
        Ok(count)
    }

    pub async fn delete_all_drug_vectors(&self) -> Result<usize, SearchError> {
        let db = self.db.clone();
        let count = tokio::task::spawn_blocking(move || -> Result<usize, SearchError> {
            let conn = db.connect()?;
            let n = conn
                .execute("DELETE FROM drug_vectors", [])
                .map_err(DatabaseError::from)?;
            Ok(n)
        })
        .await??;
        if count > 0 {
            tracing::warn!(count, "all drug vectors deleted");
        }
        Ok(count)
    }

    pub async fn drug_vector_count(&self) -> Result<i64, SearchError> {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || -> Result<i64, SearchError> {
            let conn = db.connect()?;
            let n = conn
                .query_row("SELECT COUNT(*) FROM drug_vectors", [], |r| r.get(0))
                .map_err(DatabaseError::from)?;
            Ok(n)
        })
        .await??)
    }

    /// Cosine k-NN over drug vectors, joined to drug fields.
    ///
    /// Similarity is `1 − cosine_distance`, clamped to [0, 1].
    pub async fn search_drugs(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<CandidateRecord>, SearchError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(&embedding)?;
        let db = self.db.clone();

        let results = tokio::task::spawn_blocking(move || -> Result<_, SearchError> {
            let conn = db.connect()?;
            search_drug_rows(&conn, &embedding, top_k)
        })
        .await??;
        Ok(results)
    }

    // ── Disease vectors ─────────────────────────────────────────

    pub async fn insert_disease_vectors(&self, rows: Vec<NewVector>) -> Result<usize, SearchError> {
        for row in &rows {
            self.check_dimension(&row.embedding)?;
        }
        let db = self.db.clone();
        let count = tokio::task::spawn_blocking(move || -> Result<usize, SearchError> {
            let mut conn = db.connect()?;
            let tx = conn.transaction().map_err(DatabaseError::from)?;
            {
                let mut stmt = tx
                    .prepare(
                        "INSERT INTO disease_vectors
                         (id, disease_id, embedding, document, chunk_index, chunk_type)
                         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    )
                    .map_err(DatabaseError::from)?;
                for row in &rows {
                    stmt.execute(params![
                        Uuid::new_v4().to_string(),
                        row.owner_id,
                        embedding_to_bytes(&row.embedding),
                        row.document,
                        row.chunk_index,
                        row.chunk_type,
                    ])
                    .map_err(DatabaseError::from)?;
                }
            }
            tx.commit().map_err(DatabaseError::from)?;
            Ok(rows.len())
        })
        .await??;

        tracing::debug!(count, "disease vectors stored");
        Ok(count)
    }

    pub async fn delete_all_disease_vectors(&self) -> Result<usize, SearchError> {
        let db = self.db.clone();
        Ok(tokio::task::spawn_blocking(move || -> Result<usize, SearchError> {
            let conn = db.connect()?;
            let n = conn
                .execute("DELETE FROM disease_vectors", [])
                .map_err(DatabaseError::from)?;
            Ok(n)
        })
        .await??)
    }

    /// Cosine k-NN over disease vectors. One row per stored chunk;
    /// per-disease dedup happens downstream.
    pub async fn search_diseases(
        &self,
        embedding: Vec<f32>,
        top_k: usize,
    ) -> Result<Vec<DiseaseCandidate>, SearchError> {
        if top_k == 0 {
            return Ok(Vec::new());
        }
        self.check_dimension(&embedding)?;
        let db = self.db.clone();

        let results = tokio::task::spawn_blocking(move || -> Result<_, SearchError> {
            let conn = db.connect()?;
            search_disease_rows(&conn, &embedding, top_k)
        })
        .await??;
        Ok(results)
    }
}

fn search_drug_rows(
    conn: &Connection,
    query: &[f32],
    top_k: usize,
) -> Result<Vec<CandidateRecord>, SearchError> {
    let mut stmt = conn
        .prepare(
            "SELECT v.embedding, d.id, d.item_name, d.entp_name, d.efficacy,
                    d.use_method, d.caution_info, d.side_effects
             FROM drug_vectors v
             JOIN drugs d ON v.drug_id = d.id",
        )
        .map_err(DatabaseError::from)?;

    let rows = stmt
        .query_map([], |row| {
            let blob: Vec<u8> = row.get(0)?;
            Ok((
                blob,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, Option<String>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
            ))
        })
        .map_err(DatabaseError::from)?;

    let mut scored: Vec<CandidateRecord> = Vec::new();
    for row in rows {
        let (blob, drug_id, item_name, entp_name, efficacy, use_method, caution, side_effects) =
            row.map_err(DatabaseError::from)?;
        let embedding = bytes_to_embedding(&blob);
        let similarity = cosine_similarity(query, &embedding).clamp(0.0, 1.0);
        scored.push(CandidateRecord {
            drug_id,
            item_name,
            entp_name,
            efficacy,
            use_method,
            caution_info: caution,
            side_effects,
            similarity,
            dense_score: Some(similarity),
            sparse_score: None,
            hybrid_score: None,
            relevance_score: None,
            original_rank: None,
        });
    }

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    Ok(scored)
}

fn search_disease_rows(
    conn: &Connection,
    query: &[f32],
    top_k: usize,
) -> Result<Vec<DiseaseCandidate>, SearchError> {
    let mut stmt = conn
        .prepare(
            "SELECT v.embedding, v.chunk_type, d.id, d.name, d.name_en, d.category,
                    d.description, d.causes, d.symptoms, d.treatment, d.prevention,
                    d.related_drugs
             FROM disease_vectors v
             JOIN diseases d ON v.disease_id = d.id",
        )
        .map_err(DatabaseError::from)?;

    let rows = stmt
        .query_map([], |row| {
            let blob: Vec<u8> = row.get(0)?;
            Ok((
                blob,
                row.get::<_, Option<String>>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, Option<String>>(5)?,
                row.get::<_, Option<String>>(6)?,
                row.get::<_, Option<String>>(7)?,
                row.get::<_, Option<String>>(8)?,
                row.get::<_, Option<String>>(9)?,
                row.get::<_, Option<String>>(10)?,
                row.get::<_, Option<String>>(11)?,
            ))
        })
        .map_err(DatabaseError::from)?;

    let mut scored: Vec<DiseaseCandidate> = Vec::new();
    for row in rows {
        let (
            blob,
            chunk_type,
            disease_id,
            name,
            name_en,
            category,
            description,
            causes,
            symptoms,
            treatment,
            prevention,
            related_drugs,
        ) = row.map_err(DatabaseError::from)?;
        let embedding = bytes_to_embedding(&blob);
        let similarity = cosine_similarity(query, &embedding).clamp(0.0, 1.0);
        scored.push(DiseaseCandidate {
            disease_id,
            name,
            name_en,
            category,
            description,
            causes,
            symptoms,
            treatment,
            prevention,
            related_drugs,
            chunk_type,
            similarity,
            relevance_score: None,
            original_rank: None,
        });
    }

    scored.sort_by(|a, b| {
        b.similarity
            .partial_cmp(&a.similarity)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    scored.truncate(top_k);
    Ok(scored)
}

/// f32 slice → little-endian byte blob.
pub fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
}

/// Little-endian byte blob → f32 vector.
pub fn bytes_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
