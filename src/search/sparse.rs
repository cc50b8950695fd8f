//! Sparse (lexical-weight) encoding.
//!
//! The encoder wraps a multilingual lexical-weight model served over
//! HTTP. A connection or model failure flips a permanent latch for the
//! process: every later call returns an empty vector immediately and
//! the orchestrator falls back to dense-only retrieval, instead of
//! re-attempting a load that already failed once.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

const ENCODE_TIMEOUT: Duration = Duration::from_secs(10);

/// Wire shape shared with the vector store: two equal-length arrays.
/// Indices need not be distinct or sorted.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Sum of all weights, the raw sparse score of the vector.
    pub fn total_weight(&self) -> f32 {
        self.values.iter().sum()
    }
}

#[async_trait]
pub trait SparseEncode: Send + Sync {
    /// Whether the encoder can currently produce vectors.
    fn is_available(&self) -> bool;

    /// Encode one text. Returns an empty vector on any failure.
    async fn encode(&self, text: &str, expand: bool) -> SparseVector;

    /// Encode a batch, `batch_size` texts per request. Failed batches
    /// yield empty vectors in place.
    async fn encode_batch(&self, texts: &[String], batch_size: usize) -> Vec<SparseVector>;
}

/// Lay phrase → medical terms appended before query encoding.
/// Document encoding never expands.
const QUERY_EXPANSIONS: &[(&str, &[&str])] = &[
    ("머리가 아파", &["두통"]),
    ("머리 아파", &["두통"]),
    ("배가 아파", &["복통", "위통"]),
    ("배 아파", &["복통"]),
    ("목이 아파", &["인후통"]),
    ("열이 나", &["발열"]),
    ("속이 쓰려", &["속쓰림"]),
    ("어지러", &["어지러움", "현기증"]),
    ("코가 막", &["코막힘", "비염"]),
    ("잠이 안", &["불면"]),
];

pub struct LexicalWeightEncoder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    load_failed: AtomicBool,
}

#[derive(Deserialize)]
struct SparseEntry {
    index: u32,
    value: f32,
}

impl LexicalWeightEncoder {
    pub fn new(base_url: &str, model: &str) -> Self {
        let base_url = base_url.trim_end_matches('/').to_string();
        if base_url.is_empty() {
            tracing::warn!("sparse encoder disabled: no endpoint configured");
        }
        Self {
            client: reqwest::Client::new(),
            base_url,
            model: model.to_string(),
            load_failed: AtomicBool::new(false),
        }
    }

    fn expand_query(text: &str) -> String {
        let mut expanded = text.to_string();
        for (phrase, terms) in QUERY_EXPANSIONS {
            if text.contains(phrase) {
                for term in *terms {
                    expanded.push(' ');
                    expanded.push_str(term);
                }
            }
        }
        expanded
    }

    async fn request(&self, inputs: &[String]) -> Result<Vec<SparseVector>, String> {
        let response = self
            .client
            .post(format!("{}/embed_sparse", self.base_url))
            .timeout(ENCODE_TIMEOUT)
            .json(&json!({ "inputs": inputs, "model": self.model }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        if !response.status().is_success() {
            return Err(format!("status {}", response.status()));
        }

        let rows: Vec<Vec<SparseEntry>> = response.json().await.map_err(|e| e.to_string())?;
        Ok(rows
            .into_iter()
            .map(|entries| {
                let mut vector = SparseVector::default();
                for entry in entries {
                    vector.indices.push(entry.index);
                    vector.values.push(entry.value);
                }
                vector
            })
            .collect())
    }
}

#[async_trait]
impl SparseEncode for LexicalWeightEncoder {
    fn is_available(&self) -> bool {
        !self.base_url.is_empty() && !self.load_failed.load(Ordering::Relaxed)
    }

    async fn encode(&self, text: &str, expand: bool) -> SparseVector {
        if !self.is_available() {
            return SparseVector::default();
        }

        let input = if expand {
            Self::expand_query(text)
        } else {
            text.to_string()
        };

        match self.request(std::slice::from_ref(&input)).await {
            Ok(mut vectors) => vectors.pop().unwrap_or_default(),
            Err(error) => {
                tracing::error!(%error, "sparse encode failed; latching encoder off");
                self.load_failed.store(true, Ordering::Relaxed);
                SparseVector::default()
            }
        }
    }

    async fn encode_batch(&self, texts: &[String], batch_size: usize) -> Vec<SparseVector> {
        if !self.is_available() || texts.is_empty() {
            return vec![SparseVector::default(); texts.len()];
        }

        let batch_size = batch_size.max(1);
        let mut results = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(batch_size) {
            match self.request(chunk).await {
                Ok(vectors) if vectors.len() == chunk.len() => results.extend(vectors),
                Ok(_) | Err(_) => {
                    tracing::error!(batch = chunk.len(), "sparse batch failed; filling empty");
                    results.extend(vec![SparseVector::default(); chunk.len()]);
                }
            }
        }
        results
    }
}
