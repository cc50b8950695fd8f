//! Upstream drug catalog client (public e-drug information API).
//!
//! Paged JSON list endpoint; a page that comes back empty ends the
//! collection loop early.

use std::time::Duration;

use serde::Deserialize;

use super::ExternalError;

const CATALOG_TIMEOUT: Duration = Duration::from_secs(30);
const PAGE_DELAY: Duration = Duration::from_millis(500);

/// Raw catalog record, field names as the upstream API spells them.
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogDrug {
    #[serde(rename = "itemSeq")]
    pub item_seq: String,
    #[serde(rename = "itemName")]
    pub item_name: String,
    #[serde(rename = "entpName", default)]
    pub entp_name: Option<String>,
    #[serde(rename = "efcyQesitm", default)]
    pub efficacy: Option<String>,
    #[serde(rename = "useMethodQesitm", default)]
    pub use_method: Option<String>,
    #[serde(rename = "atpnWarnQesitm", default)]
    pub warning: Option<String>,
    #[serde(rename = "atpnQesitm", default)]
    pub caution: Option<String>,
    #[serde(rename = "intrcQesitm", default)]
    pub interaction: Option<String>,
    #[serde(rename = "seQesitm", default)]
    pub side_effects: Option<String>,
    #[serde(rename = "depositMethodQesitm", default)]
    pub storage: Option<String>,
}

#[derive(Deserialize)]
struct CatalogResponse {
    #[serde(default)]
    body: CatalogBody,
}

#[derive(Deserialize, Default)]
struct CatalogBody {
    #[serde(default)]
    items: Vec<CatalogDrug>,
    #[serde(rename = "totalCount", default)]
    total_count: u64,
}

pub struct CatalogClient {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl CatalogClient {
    pub fn new(base_url: &str, api_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
        }
    }

    pub async fn get_page(
        &self,
        page_no: usize,
        num_of_rows: usize,
    ) -> Result<Vec<CatalogDrug>, ExternalError> {
        let response = self
            .client
            .get(&self.base_url)
            .timeout(CATALOG_TIMEOUT)
            .query(&[
                ("serviceKey", self.api_key.as_str()),
                ("pageNo", &page_no.to_string()),
                ("numOfRows", &num_of_rows.to_string()),
                ("type", "json"),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(ExternalError::Api {
                status: response.status().as_u16(),
                message: response.text().await.unwrap_or_default(),
            });
        }

        let body: CatalogResponse = response.json().await?;
        Ok(body.body.items)
    }

    pub async fn total_count(&self) -> Result<u64, ExternalError> {
        let response = self
            .client
            .get(&self.base_url)
            .timeout(CATALOG_TIMEOUT)
            .query(&[
                ("serviceKey", self.api_key.as_str()),
                ("pageNo", "1"),
                ("numOfRows", "1"),
                ("type", "json"),
            ])
            .send()
            .await?;

        let body: CatalogResponse = response.json().await?;
        Ok(body.body.total_count)
    }

    /// Collect up to `max_pages` pages, stopping at the first empty one.
    pub async fn collect_all(
        &self,
        max_pages: usize,
        num_of_rows: usize,
    ) -> Result<Vec<CatalogDrug>, ExternalError> {
        let mut all = Vec::new();
        for page in 1..=max_pages {
            let drugs = self.get_page(page, num_of_rows).await?;
            if drugs.is_empty() {
                tracing::info!(page, "catalog exhausted");
                break;
            }
            all.extend(drugs);
            // Stay under the upstream rate limit.
            tokio::time::sleep(PAGE_DELAY).await;
        }
        tracing::info!(count = all.len(), "catalog collection complete");
        Ok(all)
    }
}
