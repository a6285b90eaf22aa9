//! Counting strategies.
//!
//! Each [`StrategyKind`] estimates how many documents describe one
//! incident type:
//!
//! | Strategy | Estimate |
//! |----------|----------|
//! | `Keyword` | Retrieval hits with `score >= strictness` |
//! | `Phrase` | Retrieved documents whose extracted phrases fuzzy-match the label |
//! | `Generative` | Sum of per-batch counts from a generative model |
//!
//! All run state (document store, index, optional providers, parameters)
//! is carried by a [`RunContext`] passed in by the caller.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::error::{CensusError, Result};
use crate::index::SharedIndex;
use crate::models::{Document, RetrievalResult, StrategyKind};
use crate::phrase::{fuzzy_matches, DEFAULT_FUZZY_THRESHOLD};
use crate::providers::{CountAnswer, GenerativeCounter, PhraseExtractor, PromptFormat};
use crate::retry::{with_backoff, RetryPolicy};
use crate::segment::extract_chunked;
use crate::store::DocumentStore;

pub const DEFAULT_MAX_BATCH_DOCS: usize = 20;
pub const DEFAULT_CONCURRENCY: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct StrategyParams {
    /// Candidates to retrieve per query. `None` means the whole corpus.
    pub top_k: Option<usize>,
    pub strictness: f64,
    pub fuzzy_threshold: f64,
    pub max_batch_docs: usize,
}

impl Default for StrategyParams {
    fn default() -> Self {
        Self {
            top_k: None,
            strictness: 0.0,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            max_batch_docs: DEFAULT_MAX_BATCH_DOCS,
        }
    }
}

/// Everything a strategy needs for one run.
#[derive(Clone)]
pub struct RunContext {
    pub store: Arc<DocumentStore>,
    pub index: SharedIndex,
    pub extractor: Option<Arc<dyn PhraseExtractor>>,
    pub counter: Option<Arc<dyn GenerativeCounter>>,
    pub params: StrategyParams,
    pub retry: RetryPolicy,
    /// Upper bound on in-flight types or documents. At least 1.
    pub concurrency: usize,
}

impl RunContext {
    pub fn new(store: Arc<DocumentStore>, index: SharedIndex) -> Self {
        Self {
            store,
            index,
            extractor: None,
            counter: None,
            params: StrategyParams::default(),
            retry: RetryPolicy::default(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }

    pub fn with_extractor(mut self, extractor: Arc<dyn PhraseExtractor>) -> Self {
        self.extractor = Some(extractor);
        self
    }

    pub fn with_counter(mut self, counter: Arc<dyn GenerativeCounter>) -> Self {
        self.counter = Some(counter);
        self
    }

    pub fn with_params(mut self, params: StrategyParams) -> Self {
        self.params = params;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Effective `top_k`: configured value, else the corpus size, never 0.
    pub fn top_k(&self) -> usize {
        self.params.top_k.unwrap_or(self.store.len()).max(1)
    }
}

/// What a strategy produced for one incident type.
#[derive(Debug, Clone, PartialEq)]
pub struct StrategyOutcome {
    pub count: u64,
    pub rationale: Option<String>,
}

impl StrategyOutcome {
    fn counted(count: u64) -> Self {
        Self {
            count,
            rationale: None,
        }
    }
}

impl StrategyKind {
    /// Estimate the number of documents describing `label`.
    pub async fn run(&self, ctx: &RunContext, label: &str) -> Result<StrategyOutcome> {
        match self {
            Self::Keyword => keyword_count(ctx, label).await.map(StrategyOutcome::counted),
            Self::Phrase => phrase_count(ctx, label).await.map(StrategyOutcome::counted),
            Self::Generative => generative_count(ctx, label).await,
        }
    }
}

async fn retrieve(ctx: &RunContext, label: &str) -> Result<Vec<RetrievalResult>> {
    let top_k = ctx.top_k();
    let strictness = ctx.params.strictness;
    let results = with_backoff(&ctx.retry, "index query", || {
        ctx.index.query(label, top_k, strictness)
    })
    .await?;
    tracing::debug!(label, top_k, strictness, hits = results.len(), "retrieved candidates");
    Ok(results)
}

/// Retrieved candidates resolved through the document store. Ids the
/// store does not know are logged and dropped.
fn resolve<'a>(ctx: &'a RunContext, results: &[RetrievalResult]) -> Vec<&'a Document> {
    results
        .iter()
        .filter_map(|r| {
            let doc = ctx.store.get(&r.document_id);
            if doc.is_none() {
                tracing::warn!(id = %r.document_id, "index returned unknown document id");
            }
            doc
        })
        .collect()
}

/// Retrieval hits at or above the strictness threshold. Hits for
/// documents outside this run's corpus are not counted.
pub async fn keyword_count(ctx: &RunContext, label: &str) -> Result<u64> {
    let strictness = ctx.params.strictness;
    let mut results = retrieve(ctx, label).await?;
    results.retain(|r| r.score >= strictness);
    Ok(resolve(ctx, &results).len() as u64)
}

/// Counts a candidate when any of its phrases fuzzy-matches `label`.
/// Documents whose extraction fails are skipped with a warning.
pub async fn phrase_count(ctx: &RunContext, label: &str) -> Result<u64> {
    let extractor = ctx
        .extractor
        .as_deref()
        .ok_or(CensusError::Unavailable("phrase extraction"))?;
    let results = retrieve(ctx, label).await?;
    let candidates = resolve(ctx, &results);
    let threshold = ctx.params.fuzzy_threshold;

    let matched: Vec<bool> = stream::iter(candidates)
        .map(|doc| async move {
            let extracted = with_backoff(&ctx.retry, "phrase extraction", || {
                extract_chunked(extractor, &doc.text)
            })
            .await;
            match extracted {
                Ok(phrases) => phrases.iter().any(|p| fuzzy_matches(p, label, threshold)),
                Err(e) => {
                    tracing::warn!(id = %doc.id, error = %e, "skipping document: extraction failed");
                    false
                }
            }
        })
        .buffered(ctx.concurrency.max(1))
        .collect()
        .await;

    Ok(matched.into_iter().filter(|m| *m).count() as u64)
}

/// Asks the generative counter about the candidates in batches of at most
/// `max_batch_docs` and sums the answers.
pub async fn generative_count(ctx: &RunContext, label: &str) -> Result<StrategyOutcome> {
    let counter = ctx
        .counter
        .as_deref()
        .ok_or(CensusError::Unavailable("generative"))?;
    let results = retrieve(ctx, label).await?;
    let candidates: Vec<Document> = resolve(ctx, &results).into_iter().cloned().collect();
    if candidates.is_empty() {
        return Ok(StrategyOutcome::counted(0));
    }

    let batch_size = ctx.params.max_batch_docs.max(1);
    let mut total = 0u64;
    let mut rationales = Vec::new();
    for (i, batch) in candidates.chunks(batch_size).enumerate() {
        let answer = count_batch(ctx, counter, label, batch).await?;
        tracing::debug!(label, batch = i, size = batch.len(), count = answer.count, "batch counted");
        total += answer.count;
        if let Some(r) = answer.rationale.filter(|r| !r.trim().is_empty()) {
            rationales.push(r);
        }
    }

    Ok(StrategyOutcome {
        count: total,
        rationale: (!rationales.is_empty()).then(|| rationales.join("\n")),
    })
}

/// One batch: backoff on transient failures, one strict-format retry on
/// unparsable output, count clamped to the batch size.
async fn count_batch(
    ctx: &RunContext,
    counter: &dyn GenerativeCounter,
    label: &str,
    batch: &[Document],
) -> Result<CountAnswer> {
    let ask = |format: PromptFormat| {
        with_backoff(&ctx.retry, "generative count", move || {
            counter.count(label, batch, format)
        })
    };

    let answer = match ask(PromptFormat::Standard).await {
        Err(e) if e.is_malformed_output() => {
            tracing::warn!(label, error = %e, "unparsable model answer, retrying with strict format");
            ask(PromptFormat::Strict).await
        }
        other => other,
    };

    let mut answer = answer.map_err(|e| match e {
        CensusError::Timeout { .. } => CensusError::generation_transient(e.to_string()),
        other => other,
    })?;

    let limit = batch.len() as u64;
    if answer.count > limit {
        tracing::warn!(
            label,
            reported = answer.count,
            batch = limit,
            "model count exceeds batch size, clamping"
        );
        answer.count = limit;
    }
    Ok(answer)
}
