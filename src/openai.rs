//! [`GenerativeCounter`] on a chat-completions API (OpenAI or Azure
//! OpenAI).
//!
//! The model sees the candidate reports and is asked how many describe
//! a distinct incident of the requested type. It answers with
//! `{"count": N, "rationale": "..."}`; a bare integer is accepted too.
//! Anything else is reported as a permanent generation error so the
//! caller can retry once with [`PromptFormat::Strict`].

use async_trait::async_trait;
use incident_census_core::models::Document;
use incident_census_core::providers::{CountAnswer, GenerativeCounter, PromptFormat};
use incident_census_core::{CensusError, Result};
use serde::Deserialize;
use serde_json::json;

use crate::http::{self, Service};

const OPENAI_ENDPOINT: &str = "https://api.openai.com/v1";

const SYSTEM_PROMPT: &str = "You are an AI assistant tasked with analyzing incident reports. \
Your job is to count the number of distinct incidents related to a specific query.";

/// Where requests go and how they authenticate.
#[derive(Debug, Clone)]
enum Flavor {
    OpenAi { model: String },
    Azure,
}

pub struct ChatCounter {
    client: reqwest::Client,
    url: String,
    api_key: String,
    flavor: Flavor,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: Message,
}

#[derive(Deserialize)]
struct Message {
    #[serde(default)]
    content: Option<String>,
}

impl ChatCounter {
    /// `api.openai.com` (or a compatible `endpoint`) with a bearer token.
    pub fn openai(
        client: reqwest::Client,
        endpoint: Option<&str>,
        model: &str,
        api_key: String,
        max_tokens: u32,
    ) -> Self {
        let base = http::trim_endpoint(endpoint.unwrap_or(OPENAI_ENDPOINT));
        Self {
            client,
            url: format!("{base}/chat/completions"),
            api_key,
            flavor: Flavor::OpenAi {
                model: model.to_string(),
            },
            max_tokens,
        }
    }

    /// An Azure OpenAI deployment, authenticated with `api-key`.
    pub fn azure(
        client: reqwest::Client,
        endpoint: &str,
        deployment: &str,
        api_version: &str,
        api_key: String,
        max_tokens: u32,
    ) -> Self {
        Self {
            client,
            url: format!(
                "{}/openai/deployments/{}/chat/completions?api-version={}",
                http::trim_endpoint(endpoint),
                deployment,
                api_version
            ),
            api_key,
            flavor: Flavor::Azure,
            max_tokens,
        }
    }

    fn request_body(&self, incident_type: &str, candidates: &[Document], format: PromptFormat) -> serde_json::Value {
        let mut body = json!({
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": user_prompt(incident_type, candidates, format) },
            ],
            "temperature": 0,
            "max_tokens": self.max_tokens,
        });
        if let Flavor::OpenAi { model } = &self.flavor {
            body["model"] = json!(model);
        }
        body
    }
}

pub fn user_prompt(incident_type: &str, candidates: &[Document], format: PromptFormat) -> String {
    let reports = candidates
        .iter()
        .enumerate()
        .map(|(i, d)| format!("Report {}:\n{}", i + 1, d.text))
        .collect::<Vec<_>>()
        .join("\n\n");

    let instruction = match format {
        PromptFormat::Standard => format!(
            "Based on the following {n} incident reports, how many distinct incidents related to \
             '{incident_type}' can you identify? Answer with a JSON object of the form \
             {{\"count\": <integer between 0 and {n}>, \"rationale\": \"<one sentence>\"}}.",
            n = candidates.len()
        ),
        PromptFormat::Strict => format!(
            "Count the distinct incidents related to '{incident_type}' in the {n} incident reports \
             below. Respond with exactly one JSON object and nothing else, no prose and no code \
             fences: {{\"count\": <integer between 0 and {n}>, \"rationale\": \"<one sentence>\"}}",
            n = candidates.len()
        ),
    };

    format!("{instruction}\n\nIncident reports:\n{reports}")
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Parse the model's reply into a [`CountAnswer`].
pub fn parse_answer(content: &str) -> Result<CountAnswer> {
    let body = strip_code_fence(content);
    if let Ok(answer) = serde_json::from_str::<CountAnswer>(body) {
        return Ok(answer);
    }
    if let Ok(count) = body.parse::<u64>() {
        return Ok(CountAnswer {
            count,
            rationale: None,
        });
    }
    let preview: String = content.chars().take(120).collect();
    Err(CensusError::malformed_answer(format!(
        "unparsable model answer: {preview:?}"
    )))
}

#[async_trait]
impl GenerativeCounter for ChatCounter {
    fn name(&self) -> &str {
        match self.flavor {
            Flavor::OpenAi { .. } => "openai",
            Flavor::Azure => "azure-openai",
        }
    }

    async fn count(
        &self,
        incident_type: &str,
        candidates: &[Document],
        format: PromptFormat,
    ) -> Result<CountAnswer> {
        let body = self.request_body(incident_type, candidates, format);
        let request = self.client.post(&self.url).json(&body);
        let request = match self.flavor {
            Flavor::OpenAi { .. } => request.bearer_auth(&self.api_key),
            Flavor::Azure => request.header("api-key", &self.api_key),
        };

        let response = http::send(Service::Generation, request).await?;
        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| http::decode_error(Service::Generation, e))?;
        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default();
        tracing::debug!(incident_type, candidates = candidates.len(), answer = %content, "model answered");
        parse_answer(&content)
    }
}
