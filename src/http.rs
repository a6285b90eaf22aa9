//! Shared plumbing for the REST adapters.
//!
//! Maps HTTP outcomes onto [`CensusError`] the same way for every
//! service: 429 and 5xx are transient, network failures and timeouts are
//! transient, everything else is permanent.

use std::time::Duration;

use anyhow::Result as AnyResult;
use incident_census_core::CensusError;
use reqwest::StatusCode;

/// Which capability an HTTP call belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Index,
    Extraction,
    Generation,
}

impl Service {
    fn error(self, message: String, transient: bool) -> CensusError {
        match (self, transient) {
            (Service::Index, false) => CensusError::index(message),
            (Service::Index, true) => CensusError::index_transient(message),
            (Service::Extraction, false) => CensusError::extraction(message),
            (Service::Extraction, true) => CensusError::extraction_transient(message),
            (Service::Generation, false) => CensusError::generation(message),
            (Service::Generation, true) => CensusError::generation_transient(message),
        }
    }
}

pub fn is_transient_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

pub fn status_error(service: Service, status: StatusCode, body: &str) -> CensusError {
    let body: String = body.chars().take(500).collect();
    service.error(
        format!("HTTP {status}: {body}"),
        is_transient_status(status),
    )
}

pub fn network_error(service: Service, e: reqwest::Error) -> CensusError {
    service.error(format!("request failed: {e}"), true)
}

pub fn decode_error(service: Service, e: impl std::fmt::Display) -> CensusError {
    service.error(format!("unexpected response body: {e}"), false)
}

/// Client shared by all adapters. The per-attempt deadline is enforced by
/// the retry layer; this one only guards against hung connections.
pub fn client(timeout: Duration) -> AnyResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("incident-census/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// Send `request`, returning the response on 2xx and a classified error
/// otherwise.
pub async fn send(
    service: Service,
    request: reqwest::RequestBuilder,
) -> Result<reqwest::Response, CensusError> {
    let response = request
        .send()
        .await
        .map_err(|e| network_error(service, e))?;
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(service, status, &body))
}

pub fn trim_endpoint(endpoint: &str) -> &str {
    endpoint.trim().trim_end_matches('/')
}
