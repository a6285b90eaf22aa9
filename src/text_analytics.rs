//! [`PhraseExtractor`] backed by the Azure AI Language key-phrase API.
//!
//! One text per request. The service rejects documents over 5120
//! characters, which is advertised through `max_input_chars` so longer
//! reports are split before they are sent.

use std::collections::BTreeSet;

use async_trait::async_trait;
use incident_census_core::phrase::normalize_phrase;
use incident_census_core::providers::PhraseExtractor;
use incident_census_core::{CensusError, Result};
use serde::Deserialize;
use serde_json::json;

use crate::http::{self, Service};

pub const DEFAULT_MAX_INPUT_CHARS: usize = 5120;

pub struct TextAnalyticsExtractor {
    client: reqwest::Client,
    url: String,
    api_key: String,
    language: String,
    max_input_chars: usize,
}

#[derive(Deserialize)]
struct KeyPhraseResponse {
    #[serde(default)]
    documents: Vec<KeyPhraseDocument>,
    #[serde(default)]
    errors: Vec<DocumentError>,
}

#[derive(Deserialize)]
struct KeyPhraseDocument {
    #[serde(rename = "keyPhrases", default)]
    key_phrases: Vec<String>,
}

#[derive(Deserialize)]
struct DocumentError {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    code: String,
    message: String,
}

impl TextAnalyticsExtractor {
    pub fn new(
        client: reqwest::Client,
        endpoint: &str,
        api_key: String,
        language: &str,
        max_input_chars: Option<usize>,
    ) -> Self {
        Self {
            client,
            url: format!(
                "{}/text/analytics/v3.1/keyPhrases",
                http::trim_endpoint(endpoint)
            ),
            api_key,
            language: language.to_string(),
            max_input_chars: max_input_chars.unwrap_or(DEFAULT_MAX_INPUT_CHARS),
        }
    }
}

#[async_trait]
impl PhraseExtractor for TextAnalyticsExtractor {
    fn name(&self) -> &str {
        "azure"
    }

    async fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        if text.trim().is_empty() {
            return Ok(BTreeSet::new());
        }
        let body = json!({
            "documents": [{ "id": "1", "language": self.language, "text": text }],
        });
        let response = http::send(
            Service::Extraction,
            self.client
                .post(&self.url)
                .header("Ocp-Apim-Subscription-Key", &self.api_key)
                .json(&body),
        )
        .await?;
        let parsed: KeyPhraseResponse = response
            .json()
            .await
            .map_err(|e| http::decode_error(Service::Extraction, e))?;

        if let Some(err) = parsed.errors.first() {
            return Err(CensusError::extraction(format!(
                "{}: {}",
                err.error.code, err.error.message
            )));
        }

        Ok(parsed
            .documents
            .into_iter()
            .flat_map(|d| d.key_phrases)
            .map(|p| normalize_phrase(&p))
            .filter(|p| !p.is_empty())
            .collect())
    }

    fn max_input_chars(&self) -> Option<usize> {
        Some(self.max_input_chars)
    }
}
