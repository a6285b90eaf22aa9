//! [`RetrievalIndex`] backed by an Azure AI Search index.
//!
//! The index has two fields: `id` (key) and `content` (searchable).
//! Documents are pushed with `mergeOrUpload`, so re-indexing an id
//! overwrites it. Queries use the simple syntax with the label quoted as
//! a phrase; `@search.score` values are mapped into `[0, 1)`.

use async_trait::async_trait;
use incident_census_core::index::normalize_score;
use incident_census_core::models::{sort_results, Document, RetrievalResult};
use incident_census_core::providers::RetrievalIndex;
use incident_census_core::{CensusError, Result};
use serde::Deserialize;
use serde_json::json;

use crate::http::{self, Service};
use crate::sqlite_index::phrase_query;

/// Azure caps both upload batches and `top` at 1000.
const PAGE_SIZE: usize = 1000;

pub struct AzureSearchIndex {
    client: reqwest::Client,
    endpoint: String,
    index_name: String,
    api_key: String,
    api_version: String,
}

#[derive(Deserialize)]
struct SearchResponse {
    value: Vec<SearchHit>,
}

#[derive(Deserialize)]
struct SearchHit {
    id: String,
    #[serde(rename = "@search.score")]
    score: f64,
    #[serde(rename = "@search.highlights", default)]
    highlights: Option<Highlights>,
}

#[derive(Deserialize)]
struct Highlights {
    #[serde(default)]
    content: Vec<String>,
}

#[derive(Deserialize)]
struct IndexResponse {
    value: Vec<IndexStatus>,
}

#[derive(Deserialize)]
struct IndexStatus {
    key: String,
    status: bool,
    #[serde(rename = "errorMessage", default)]
    error_message: Option<String>,
}

impl AzureSearchIndex {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        index_name: &str,
        api_key: String,
        api_version: &str,
    ) -> Self {
        Self {
            client,
            endpoint: http::trim_endpoint(endpoint).to_string(),
            index_name: index_name.to_string(),
            api_key,
            api_version: api_version.to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!(
            "{}/indexes/{}{}?api-version={}",
            self.endpoint, self.index_name, path, self.api_version
        )
    }

    /// Create the index if it does not exist, or update its definition.
    async fn ensure_index(&self) -> Result<()> {
        let definition = json!({
            "name": self.index_name,
            "fields": [
                { "name": "id", "type": "Edm.String", "key": true },
                { "name": "content", "type": "Edm.String", "searchable": true },
            ],
        });
        http::send(
            Service::Index,
            self.client
                .put(self.url(""))
                .header("api-key", &self.api_key)
                .json(&definition),
        )
        .await?;
        Ok(())
    }

    async fn upload(&self, batch: &[Document]) -> Result<()> {
        let actions: Vec<_> = batch
            .iter()
            .map(|d| {
                json!({
                    "@search.action": "mergeOrUpload",
                    "id": d.id,
                    "content": d.text,
                })
            })
            .collect();
        let response = http::send(
            Service::Index,
            self.client
                .post(self.url("/docs/index"))
                .header("api-key", &self.api_key)
                .json(&json!({ "value": actions })),
        )
        .await?;
        let body: IndexResponse = response
            .json()
            .await
            .map_err(|e| http::decode_error(Service::Index, e))?;

        let failed: Vec<&IndexStatus> = body.value.iter().filter(|s| !s.status).collect();
        if let Some(first) = failed.first() {
            return Err(CensusError::index(format!(
                "{} of {} documents failed to index (first: {}: {})",
                failed.len(),
                batch.len(),
                first.key,
                first.error_message.as_deref().unwrap_or("unknown error"),
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl RetrievalIndex for AzureSearchIndex {
    fn name(&self) -> &str {
        "azure"
    }

    async fn index(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Err(CensusError::index("refusing to index an empty batch"));
        }
        self.ensure_index().await?;
        for batch in documents.chunks(PAGE_SIZE) {
            self.upload(batch).await?;
            tracing::info!(
                index = %self.index_name,
                uploaded = batch.len(),
                "uploaded documents"
            );
        }
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        strictness: f64,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(search) = phrase_query(text) else {
            return Ok(Vec::new());
        };

        let mut results = Vec::new();
        let mut skip = 0usize;
        while skip < top_k {
            let top = (top_k - skip).min(PAGE_SIZE);
            let body = json!({
                "search": search,
                "queryType": "simple",
                "searchMode": "all",
                "select": "id",
                "highlight": "content",
                "top": top,
                "skip": skip,
            });
            let response = http::send(
                Service::Index,
                self.client
                    .post(self.url("/docs/search"))
                    .header("api-key", &self.api_key)
                    .json(&body),
            )
            .await?;
            let page: SearchResponse = response
                .json()
                .await
                .map_err(|e| http::decode_error(Service::Index, e))?;

            let fetched = page.value.len();
            results.extend(page.value.into_iter().map(|hit| RetrievalResult {
                document_id: hit.id,
                score: normalize_score(hit.score),
                snippet: hit.highlights.and_then(|h| h.content.into_iter().next()),
            }));
            if fetched < top {
                break;
            }
            skip += fetched;
        }

        results.retain(|r| r.score >= strictness);
        sort_results(&mut results);
        results.truncate(top_k);
        tracing::debug!(query = %search, hits = results.len(), "azure search query");
        Ok(results)
    }

    async fn document_count(&self) -> Result<usize> {
        let response = http::send(
            Service::Index,
            self.client
                .get(self.url("/docs/$count"))
                .header("api-key", &self.api_key),
        )
        .await?;
        let text = response
            .text()
            .await
            .map_err(|e| http::decode_error(Service::Index, e))?;
        text.trim_start_matches('\u{feff}')
            .trim()
            .parse()
            .map_err(|e| http::decode_error(Service::Index, e))
    }
}
