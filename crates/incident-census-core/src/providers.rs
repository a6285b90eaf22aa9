//! Capability traits for the external services the pipeline depends on.
//!
//! The core only ever talks to these traits. The app crate provides the
//! concrete adapters (SQLite FTS5, Azure AI Search, Azure AI Language,
//! OpenAI chat) and the core ships an in-memory index and an offline
//! key-phrase extractor.
//!
//! All traits are object-safe and used as `Arc<dyn Trait>`.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{Document, RetrievalResult};

/// A searchable index over the run's documents.
#[async_trait]
pub trait RetrievalIndex: Send + Sync {
    /// Short provider name for logs ("sqlite", "azure", "memory").
    fn name(&self) -> &str;

    /// Add or overwrite `documents`. Re-indexing an id replaces it.
    /// Fails when the batch is empty or the backing store is unreachable.
    async fn index(&self, documents: &[Document]) -> Result<()>;

    /// Results with `score >= strictness`, best first, at most `top_k`.
    /// Scores are normalized to `[0.0, 1.0]`.
    async fn query(&self, text: &str, top_k: usize, strictness: f64)
        -> Result<Vec<RetrievalResult>>;

    async fn document_count(&self) -> Result<usize>;
}

/// Extracts salient phrases from a piece of text.
#[async_trait]
pub trait PhraseExtractor: Send + Sync {
    fn name(&self) -> &str;

    /// Normalized (lower-cased, whitespace-collapsed) phrases found in
    /// `text`. Must be deterministic for the same input.
    async fn extract(&self, text: &str) -> Result<BTreeSet<String>>;

    /// Largest input this provider accepts, in bytes. Longer text is
    /// split by [`segment::extract_chunked`](crate::segment::extract_chunked).
    fn max_input_chars(&self) -> Option<usize> {
        None
    }
}

/// How hard the prompt insists on a machine-readable answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PromptFormat {
    #[default]
    Standard,
    /// Used for the single retry after an unparsable answer.
    Strict,
}

/// A generative model's judgement about one batch of candidates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CountAnswer {
    pub count: u64,
    #[serde(default)]
    pub rationale: Option<String>,
}

/// Asks a generative model how many of `candidates` describe an incident
/// of the given type.
#[async_trait]
pub trait GenerativeCounter: Send + Sync {
    fn name(&self) -> &str;

    async fn count(
        &self,
        incident_type: &str,
        candidates: &[Document],
        format: PromptFormat,
    ) -> Result<CountAnswer>;
}
