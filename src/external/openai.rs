//! Embedding + answer model client (OpenAI-style API).

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::ExternalError;
use crate::search::{AnswerModel, Embedder};

const EMBED_TIMEOUT: Duration = Duration::from_secs(30);
const CHAT_TIMEOUT: Duration = Duration::from_secs(60);

pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    embedding_model: String,
    embedding_dimensions: usize,
    llm_model: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingRow>,
}

#[derive(Deserialize)]
struct EmbeddingRow {
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: String,
}

impl OpenAiClient {
    pub fn new(
        base_url: &str,
        api_key: &str,
        embedding_model: &str,
        embedding_dimensions: usize,
        llm_model: &str,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            embedding_model: embedding_model.to_string(),
            embedding_dimensions,
            llm_model: llm_model.to_string(),
        }
    }

    async fn embeddings_request(&self, input: &[String]) -> Result<Vec<Vec<f32>>, ExternalError> {
        let response = self
            .client
            .post(format!("{}/v1/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(EMBED_TIMEOUT)
            .json(&json!({
                "model": self.embedding_model,
                "input": input,
                "dimensions": self.embedding_dimensions,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExternalError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: EmbeddingResponse = response.json().await?;
        if body.data.len() != input.len() {
            return Err(ExternalError::Malformed(format!(
                "expected {} embeddings, got {}",
                input.len(),
                body.data.len()
            )));
        }
        Ok(body.data.into_iter().map(|row| row.embedding).collect())
    }
}

#[async_trait]
impl Embedder for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ExternalError> {
        let mut rows = self.embeddings_request(&[text.to_string()]).await?;
        rows.pop()
            .ok_or_else(|| ExternalError::Malformed("empty embedding response".to_string()))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ExternalError> {
        let mut all = Vec::with_capacity(texts.len());
        // The API accepts large batches but memory and retry blast
        // radius stay manageable at 100 inputs per request.
        for chunk in texts.chunks(100) {
            let rows = self.embeddings_request(chunk).await?;
            all.extend(rows);
        }
        Ok(all)
    }

    fn dimension(&self) -> usize {
        self.embedding_dimensions
    }
}

#[async_trait]
impl AnswerModel for OpenAiClient {
    async fn generate(&self, system: &str, prompt: &str) -> Result<String, ExternalError> {
        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .timeout(CHAT_TIMEOUT)
            .json(&json!({
                "model": self.llm_model,
                "messages": [
                    {"role": "system", "content": system},
                    {"role": "user", "content": prompt},
                ],
                "temperature": 0.3,
                "max_tokens": 2500,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExternalError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: ChatResponse = response.json().await?;
        body.choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| ExternalError::Malformed("no choices in response".to_string()))
    }
}
