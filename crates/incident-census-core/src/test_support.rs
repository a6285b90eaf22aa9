//! Mock providers shared by the unit tests.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CensusError, Result};
use crate::index::{InMemoryIndex, SharedIndex};
use crate::models::{Document, RetrievalResult};
use crate::providers::{
    CountAnswer, GenerativeCounter, PhraseExtractor, PromptFormat, RetrievalIndex,
};
use crate::retry::RetryPolicy;
use crate::store::DocumentStore;
use crate::strategy::RunContext;

pub fn fast_retry() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        base_delay: Duration::from_millis(1),
        timeout: Duration::from_secs(5),
    }
}

fn numbered(texts: &[String]) -> DocumentStore {
    DocumentStore::from_documents(
        texts
            .iter()
            .enumerate()
            .map(|(i, t)| Document::new(format!("d{i}"), t.clone()))
            .collect(),
    )
    .unwrap()
}

/// Context over `docs` placeholder documents `d0..dN` and `index`.
pub fn context(index: impl RetrievalIndex + 'static, docs: usize) -> RunContext {
    let texts: Vec<String> = (0..docs).map(|i| format!("document {i}")).collect();
    RunContext::new(Arc::new(numbered(&texts)), SharedIndex::new(Arc::new(index)))
        .with_retry(fast_retry())
        .with_concurrency(2)
}

/// Replace the context's documents with `texts`, keeping ids `d0..dN`.
pub fn with_texts(mut ctx: RunContext, texts: &[String]) -> RunContext {
    ctx.store = Arc::new(numbered(texts));
    ctx
}

/// Context over an [`InMemoryIndex`] holding `texts`.
pub async fn memory_context(texts: &[&str]) -> RunContext {
    let texts: Vec<String> = texts.iter().map(|t| t.to_string()).collect();
    let store = numbered(&texts);
    let index = InMemoryIndex::new();
    index.index(store.documents()).await.unwrap();
    RunContext::new(Arc::new(store), SharedIndex::new(Arc::new(index)))
        .with_retry(fast_retry())
        .with_concurrency(2)
}

enum FixedMode {
    Uniform { hits: usize, score: f64 },
    PerLabel,
    Failing(String),
}

/// Index with canned results for ids `d0..`.
pub struct FixedIndex {
    mode: FixedMode,
}

impl FixedIndex {
    /// `hits` results, all with `score`.
    pub fn uniform(hits: usize, score: f64) -> Self {
        Self {
            mode: FixedMode::Uniform { hits, score },
        }
    }

    /// One hit per character of the query, score 0.5.
    pub fn per_label() -> Self {
        Self {
            mode: FixedMode::PerLabel,
        }
    }

    /// Every query fails with a transient index error.
    pub fn failing(message: &str) -> Self {
        Self {
            mode: FixedMode::Failing(message.to_string()),
        }
    }
}

#[async_trait]
impl RetrievalIndex for FixedIndex {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn index(&self, _documents: &[Document]) -> Result<()> {
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        strictness: f64,
    ) -> Result<Vec<RetrievalResult>> {
        let (hits, score) = match &self.mode {
            FixedMode::Uniform { hits, score } => (*hits, *score),
            FixedMode::PerLabel => (text.chars().count(), 0.5),
            FixedMode::Failing(msg) => return Err(CensusError::index_transient(msg.clone())),
        };
        Ok((0..hits)
            .map(|i| RetrievalResult {
                document_id: format!("d{i}"),
                score,
                snippet: None,
            })
            .filter(|r| r.score >= strictness)
            .take(top_k)
            .collect())
    }

    async fn document_count(&self) -> Result<usize> {
        match &self.mode {
            FixedMode::Uniform { hits, .. } => Ok(*hits),
            _ => Ok(0),
        }
    }
}

fn words(text: &str) -> BTreeSet<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Returns every word of the input as a phrase.
#[derive(Default)]
pub struct EchoExtractor {
    limit: Option<usize>,
    calls: AtomicUsize,
}

impl EchoExtractor {
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PhraseExtractor for EchoExtractor {
    fn name(&self) -> &str {
        "echo"
    }

    async fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.limit {
            assert!(text.len() <= limit, "segment of {} bytes over limit", text.len());
        }
        Ok(words(text))
    }

    fn max_input_chars(&self) -> Option<usize> {
        self.limit
    }
}

/// Always fails with a permanent extraction error.
pub struct FailingExtractor {
    message: String,
}

impl FailingExtractor {
    pub fn new(message: &str) -> Self {
        Self {
            message: message.to_string(),
        }
    }
}

#[async_trait]
impl PhraseExtractor for FailingExtractor {
    fn name(&self) -> &str {
        "failing"
    }

    async fn extract(&self, _text: &str) -> Result<BTreeSet<String>> {
        Err(CensusError::extraction(self.message.clone()))
    }
}

/// Local extraction, except documents containing a trigger word fail.
pub struct FlakyExtractor {
    trigger: String,
    inner: crate::keyphrase::LocalPhraseExtractor,
}

impl FlakyExtractor {
    pub fn failing_on(trigger: &str) -> Self {
        Self {
            trigger: trigger.to_lowercase(),
            inner: Default::default(),
        }
    }
}

#[async_trait]
impl PhraseExtractor for FlakyExtractor {
    fn name(&self) -> &str {
        "flaky"
    }

    async fn extract(&self, text: &str) -> Result<BTreeSet<String>> {
        if text.to_lowercase().contains(&self.trigger) {
            return Err(CensusError::extraction("document rejected"));
        }
        self.inner.extract(text).await
    }
}

/// Counts the documents in each batch whose text contains a keyword and
/// records batch sizes.
pub struct PerDocCounter {
    keyword: String,
    batches: Mutex<Vec<usize>>,
}

impl PerDocCounter {
    pub fn new(keyword: &str) -> Self {
        Self {
            keyword: keyword.to_string(),
            batches: Mutex::new(Vec::new()),
        }
    }

    pub fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeCounter for PerDocCounter {
    fn name(&self) -> &str {
        "per-doc"
    }

    async fn count(
        &self,
        _incident_type: &str,
        candidates: &[Document],
        _format: PromptFormat,
    ) -> Result<CountAnswer> {
        self.batches.lock().unwrap().push(candidates.len());
        let count = candidates
            .iter()
            .filter(|d| d.text.contains(&self.keyword))
            .count() as u64;
        Ok(CountAnswer {
            count,
            rationale: None,
        })
    }
}

/// Plays back a fixed script of answers and records the prompt formats
/// it was asked with.
pub struct ScriptedCounter {
    script: Mutex<Vec<Result<u64>>>,
    formats: Mutex<Vec<PromptFormat>>,
}

impl ScriptedCounter {
    pub fn new(mut script: Vec<Result<u64>>) -> Self {
        script.reverse();
        Self {
            script: Mutex::new(script),
            formats: Mutex::new(Vec::new()),
        }
    }

    pub fn formats(&self) -> Vec<PromptFormat> {
        self.formats.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeCounter for ScriptedCounter {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn count(
        &self,
        _incident_type: &str,
        _candidates: &[Document],
        format: PromptFormat,
    ) -> Result<CountAnswer> {
        self.formats.lock().unwrap().push(format);
        let next = self
            .script
            .lock()
            .unwrap()
            .pop()
            .unwrap_or_else(|| Err(CensusError::generation("script exhausted")));
        next.map(|count| CountAnswer {
            count,
            rationale: Some(format!("counted {count}")),
        })
    }
}

/// Never answers within any reasonable deadline.
pub struct StalledCounter {
    pub delay: Duration,
    calls: Mutex<u32>,
}

impl StalledCounter {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            calls: Mutex::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        *self.calls.lock().unwrap()
    }
}

#[async_trait]
impl GenerativeCounter for StalledCounter {
    fn name(&self) -> &str {
        "stalled"
    }

    async fn count(
        &self,
        _incident_type: &str,
        _candidates: &[Document],
        _format: PromptFormat,
    ) -> Result<CountAnswer> {
        *self.calls.lock().unwrap() += 1;
        tokio::time::sleep(self.delay).await;
        Ok(CountAnswer {
            count: 0,
            rationale: None,
        })
    }
}
