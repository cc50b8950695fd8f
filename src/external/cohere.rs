//! Cross-encoder reranking client (Cohere-style rerank API).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::ExternalError;
use crate::search::reranker::{RerankHit, RerankModel};

const RERANK_TIMEOUT: Duration = Duration::from_secs(10);

pub struct CohereReranker {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    enabled: bool,
}

#[derive(Deserialize)]
struct RerankResponse {
    results: Vec<RerankResult>,
}

#[derive(Deserialize)]
struct RerankResult {
    index: usize,
    relevance_score: f32,
}

impl CohereReranker {
    pub fn new(base_url: &str, api_key: &str, model: &str, enabled: bool) -> Self {
        let enabled = enabled && !api_key.is_empty();
        if enabled {
            tracing::info!(model, "reranker enabled");
        } else {
            tracing::warn!("reranker disabled: no API key or turned off");
        }
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            enabled,
        }
    }
}

#[async_trait]
impl RerankModel for CohereReranker {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn rerank(
        &self,
        query: &str,
        documents: &[String],
        top_n: usize,
    ) -> Result<Vec<RerankHit>, ExternalError> {
        let response = self
            .client
            .post(format!("{}/v2/rerank", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(RERANK_TIMEOUT)
            .json(&json!({
                "model": self.model,
                "query": query,
                "documents": documents,
                "top_n": top_n.min(documents.len()),
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExternalError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: RerankResponse = response.json().await?;
        Ok(body
            .results
            .into_iter()
            .map(|r| RerankHit {
                index: r.index,
                relevance_score: r.relevance_score,
            })
            .collect())
    }
}
