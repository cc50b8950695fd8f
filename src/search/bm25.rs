//! Lexical ranking over the drug corpus.
//!
//! Okapi BM25 with the usual parameters (k1 = 1.5, b = 0.75) and an
//! epsilon floor on negative IDF values. The index is a process-wide
//! resource built lazily from the relational store on first use:
//! initialization runs under an async mutex, and the finished
//! `{model, documents, corpus}` triple is published as one `Arc`
//! swap so readers only ever see the pre-init or post-init state.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tokio::sync::Mutex;

use crate::db::{repository, Database};
use crate::models::Drug;
use crate::search::tokenizer::KoreanTokenizer;
use crate::search::SearchError;

const K1: f64 = 1.5;
const B: f64 = 0.75;
const EPSILON: f64 = 0.25;

/// Okapi BM25 ranking model over a tokenized corpus.
#[derive(Debug)]
pub struct Bm25Model {
    term_freqs: Vec<HashMap<String, u32>>,
    doc_lens: Vec<usize>,
    avg_doc_len: f64,
    idf: HashMap<String, f64>,
}

impl Bm25Model {
    pub fn fit(corpus: &[Vec<String>]) -> Self {
        let n = corpus.len();
        let mut term_freqs: Vec<HashMap<String, u32>> = Vec::with_capacity(n);
        let mut doc_freqs: HashMap<String, u32> = HashMap::new();
        let mut doc_lens: Vec<usize> = Vec::with_capacity(n);

        for doc in corpus {
            let mut freqs: HashMap<String, u32> = HashMap::new();
            for token in doc {
                *freqs.entry(token.clone()).or_insert(0) += 1;
            }
            for term in freqs.keys() {
                *doc_freqs.entry(term.clone()).or_insert(0) += 1;
            }
            doc_lens.push(doc.len());
            term_freqs.push(freqs);
        }

        let avg_doc_len = if n == 0 {
            0.0
        } else {
            doc_lens.iter().sum::<usize>() as f64 / n as f64
        };

        // Standard IDF goes negative for terms in more than half the
        // corpus; those are floored at epsilon * average IDF.
        let mut idf: HashMap<String, f64> = HashMap::with_capacity(doc_freqs.len());
        let mut idf_sum = 0.0;
        let mut negative_terms: Vec<String> = Vec::new();
        for (term, df) in &doc_freqs {
            let value = ((n as f64 - *df as f64 + 0.5) / (*df as f64 + 0.5)).ln();
            idf_sum += value;
            if value < 0.0 {
                negative_terms.push(term.clone());
            }
            idf.insert(term.clone(), value);
        }
        if !idf.is_empty() {
            let floor = EPSILON * (idf_sum / idf.len() as f64);
            for term in negative_terms {
                idf.insert(term, floor);
            }
        }

        Self {
            term_freqs,
            doc_lens,
            avg_doc_len,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.doc_lens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.doc_lens.is_empty()
    }

    /// BM25 score of the query against every document.
    pub fn scores(&self, query_tokens: &[String]) -> Vec<f64> {
        let mut scores = vec![0.0; self.len()];
        if self.avg_doc_len == 0.0 {
            return scores;
        }

        for token in query_tokens {
            let Some(idf) = self.idf.get(token) else { continue };
            for (i, freqs) in self.term_freqs.iter().enumerate() {
                let tf = *freqs.get(token).unwrap_or(&0) as f64;
                if tf == 0.0 {
                    continue;
                }
                let norm = K1 * (1.0 - B + B * self.doc_lens[i] as f64 / self.avg_doc_len);
                scores[i] += idf * tf * (K1 + 1.0) / (tf + norm);
            }
        }
        scores
    }
}

/// Document fields carried alongside the lexical index.
#[derive(Debug, Clone)]
pub struct Bm25Document {
    pub drug_id: String,
    pub item_name: String,
    pub entp_name: Option<String>,
    pub efficacy: Option<String>,
    pub use_method: Option<String>,
    pub caution_info: Option<String>,
    pub side_effects: Option<String>,
}

#[derive(Debug, Clone)]
pub struct Bm25Hit {
    pub document: Bm25Document,
    pub bm25_score: f32,
}

/// Immutable index state, published whole.
#[derive(Debug)]
pub struct Bm25Snapshot {
    pub model: Bm25Model,
    pub documents: Vec<Bm25Document>,
    pub corpus: Vec<Vec<String>>,
}

/// Process-wide lexical index with lazy initialization.
pub struct Bm25Index {
    db: Database,
    tokenizer: KoreanTokenizer,
    init_lock: Mutex<()>,
    snapshot: RwLock<Option<Arc<Bm25Snapshot>>>,
}

impl Bm25Index {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            tokenizer: KoreanTokenizer::new(),
            init_lock: Mutex::new(()),
            snapshot: RwLock::new(None),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.snapshot.read().map(|s| s.is_some()).unwrap_or(false)
    }

    fn current(&self) -> Option<Arc<Bm25Snapshot>> {
        self.snapshot.read().ok().and_then(|s| s.clone())
    }

    fn publish(&self, snapshot: Option<Arc<Bm25Snapshot>>) {
        if let Ok(mut slot) = self.snapshot.write() {
            *slot = snapshot;
        }
    }

    async fn ensure_initialized(&self) -> Result<Option<Arc<Bm25Snapshot>>, SearchError> {
        if let Some(snapshot) = self.current() {
            return Ok(Some(snapshot));
        }

        let _guard = self.init_lock.lock().await;
        // A concurrent caller may have finished the build while we
        // waited on the lock.
        if let Some(snapshot) = self.current() {
            return Ok(Some(snapshot));
        }

        let snapshot = self.build_snapshot().await?;
        let snapshot = snapshot.map(Arc::new);
        self.publish(snapshot.clone());
        Ok(snapshot)
    }

    async fn build_snapshot(&self) -> Result<Option<Bm25Snapshot>, SearchError> {
        let db = self.db.clone();
        let tokenizer = self.tokenizer.clone();

        let snapshot = tokio::task::spawn_blocking(move || -> Result<_, SearchError> {
            let conn = db.connect()?;
            let drugs = repository::drugs_with_efficacy(&conn)?;

            let mut documents = Vec::new();
            let mut corpus = Vec::new();
            for drug in &drugs {
                let text = document_text(drug);
                let tokens = tokenizer.tokenize(&text, false);
                if tokens.is_empty() {
                    continue;
                }
                documents.push(Bm25Document {
                    drug_id: drug.id.clone(),
                    item_name: drug.item_name.clone(),
                    entp_name: drug.entp_name.clone(),
                    efficacy: drug.efficacy.clone(),
                    use_method: drug.use_method.clone(),
                    caution_info: drug.caution_info.clone(),
                    side_effects: drug.side_effects.clone(),
                });
                corpus.push(tokens);
            }

            if corpus.is_empty() {
                return Ok(None);
            }

            let model = Bm25Model::fit(&corpus);
            Ok(Some(Bm25Snapshot {
                model,
                documents,
                corpus,
            }))
        })
        .await??;

        match &snapshot {
            Some(s) => {
                tracing::info!(documents = s.documents.len(), "lexical index built");
            }
            None => tracing::warn!("lexical index not built: corpus is empty"),
        }
        Ok(snapshot)
    }

    /// Search the index, initializing it on first use.
    ///
    /// Returns only strictly positive scores, ordered descending.
    pub async fn search(&self, query: &str, top_k: usize) -> Result<Vec<Bm25Hit>, SearchError> {
        let Some(snapshot) = self.ensure_initialized().await? else {
            return Ok(Vec::new());
        };

        let query_tokens = self.tokenizer.tokenize(query, true);
        if query_tokens.is_empty() {
            return Ok(Vec::new());
        }

        let scores = snapshot.model.scores(&query_tokens);
        let mut scored: Vec<(usize, f64)> = scores
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(idx, score)| Bm25Hit {
                document: snapshot.documents[idx].clone(),
                bm25_score: score as f32,
            })
            .collect())
    }

    /// Drop the current snapshot and rebuild from the store.
    ///
    /// Concurrent readers keep the old snapshot until the new one is
    /// published; no read observes a partial triple.
    pub async fn refresh(&self) -> Result<(), SearchError> {
        let _guard = self.init_lock.lock().await;
        let snapshot = self.build_snapshot().await?;
        self.publish(snapshot.map(Arc::new));
        Ok(())
    }

    pub fn document_count(&self) -> usize {
        self.current().map(|s| s.documents.len()).unwrap_or(0)
    }
}

/// Indexing text: name + efficacy + leading slices of usage/cautions.
fn document_text(drug: &Drug) -> String {
    let mut parts: Vec<String> = vec![drug.item_name.clone()];
    if let Some(efficacy) = &drug.efficacy {
        parts.push(efficacy.clone());
    }
    if let Some(use_method) = &drug.use_method {
        parts.push(use_method.chars().take(200).collect());
    }
    if let Some(caution) = &drug.caution_info {
        parts.push(caution.chars().take(200).collect());
    }
    parts.join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repository::upsert_drug;

    fn tokens(texts: &[&str]) -> Vec<Vec<String>> {
        texts
            .iter()
            .map(|t| t.split_whitespace().map(String::from).collect())
            .collect()
    }

    #[test]
    fn matching_document_scores_higher() {
        let corpus = tokens(&[
            "두통 발열 해열제",
            "소화 불량 제산제",
            "기침 감기 시럽",
        ]);
        let model = Bm25Model::fit(&corpus);
        let scores = model.scores(&["두통".to_string()]);
        assert!(scores[0] > 0.0);
        assert_eq!(scores[1], 0.0);
        assert_eq!(scores[2], 0.0);
    }

    #[test]
    fn unknown_term_scores_zero_everywhere() {
        let corpus = tokens(&["두통 발열", "소화 불량"]);
        let model = Bm25Model::fit(&corpus);
        let scores = model.scores(&["혈압".to_string()]);
        assert!(scores.iter().all(|s| *s == 0.0));
    }

    #[test]
    fn term_frequency_raises_score() {
        let corpus = tokens(&["두통 두통 두통 발열", "두통 소화 불량 제산제"]);
        let model = Bm25Model::fit(&corpus);
        let scores = model.scores(&["두통".to_string()]);
        assert!(scores[0] > scores[1]);
    }

    #[test]
    fn ubiquitous_terms_keep_positive_floor() {
        // "약" appears in every document; raw IDF would be negative.
        let corpus = tokens(&["약 두통", "약 소화", "약 기침"]);
        let model = Bm25Model::fit(&corpus);
        let scores = model.scores(&["약".to_string()]);
        assert!(scores.iter().all(|s| *s > 0.0));
    }

    #[test]
    fn empty_corpus_fits_and_scores_empty() {
        let model = Bm25Model::fit(&[]);
        assert!(model.is_empty());
        assert!(model.scores(&["두통".to_string()]).is_empty());
    }

    // ── Index lifecycle ─────────────────────────────────────────

    fn seeded_db(dir: &tempfile::TempDir) -> Database {
        let db = Database::open(dir.path().join("test.db")).unwrap();
        let conn = db.connect().unwrap();
        for (id, name, efficacy) in [
            ("D1", "두통엔정", "두통, 치통, 발열에 효과"),
            ("D2", "콜드시럽", "감기 증상 완화, 콧물, 기침"),
            ("D3", "소화엔정", "소화불량, 복부 팽만감"),
        ] {
            upsert_drug(
                &conn,
                &crate::models::Drug {
                    id: id.to_string(),
                    item_name: name.to_string(),
                    entp_name: None,
                    efficacy: Some(efficacy.to_string()),
                    use_method: Some("1일 3회 식후 복용".to_string()),
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
        db
    }

    #[tokio::test]
    async fn lazy_init_on_first_search() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::new(seeded_db(&dir));
        assert!(!index.is_initialized());

        let hits = index.search("두통이 심해요", 3).await.unwrap();
        assert!(index.is_initialized());
        assert!(!hits.is_empty());
        assert_eq!(hits[0].document.drug_id, "D1");
        assert!(hits[0].bm25_score > 0.0);
    }

    #[tokio::test]
    async fn scores_are_ordered_descending() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::new(seeded_db(&dir));
        let hits = index.search("감기 기침 콧물", 10).await.unwrap();
        for pair in hits.windows(2) {
            assert!(pair[0].bm25_score >= pair[1].bm25_score);
        }
    }

    #[tokio::test]
    async fn empty_query_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let index = Bm25Index::new(seeded_db(&dir));
        let hits = index.search("", 5).await.unwrap();
        assert!(hits.is_empty());
        // Stopword-only queries tokenize to nothing as well.
        let hits = index.search("매우 정말", 5).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn refresh_picks_up_corpus_mutation() {
        let dir = tempfile::tempdir().unwrap();
        let db = seeded_db(&dir);
        let index = Bm25Index::new(db.clone());

        let hits = index.search("비염", 5).await.unwrap();
        assert!(hits.is_empty());

        let conn = db.connect().unwrap();
        upsert_drug(
            &conn,
            &crate::models::Drug {
                id: "D4".to_string(),
                item_name: "알러지정".to_string(),
                entp_name: None,
                efficacy: Some("알레르기 비염, 두드러기".to_string()),
                use_method: None,
                warning_info: None,
                caution_info: None,
                interaction: None,
                side_effects: None,
                storage_method: None,
                data_source: "seed".to_string(),
            },
        )
        .unwrap();
        drop(conn);

        // Pre-refresh snapshot still served.
        assert_eq!(index.document_count(), 3);

        index.refresh().await.unwrap();
        assert_eq!(index.document_count(), 4);
        let hits = index.search("비염", 5).await.unwrap();
        assert_eq!(hits[0].document.drug_id, "D4");
    }

    #[tokio::test]
    async fn concurrent_first_use_builds_once() {
        let dir = tempfile::tempdir().unwrap();
        let index = std::sync::Arc::new(Bm25Index::new(seeded_db(&dir)));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let index = index.clone();
            handles.push(tokio::spawn(async move {
                index.search("두통", 3).await.unwrap()
            }));
        }
        for handle in handles {
            let hits = handle.await.unwrap();
            assert_eq!(hits[0].document.drug_id, "D1");
        }
        assert_eq!(index.document_count(), 3);
    }
}
