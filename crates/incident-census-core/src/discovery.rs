//! Propose new incident-type labels from phrase frequency.
//!
//! Every document is run through the [`PhraseExtractor`]; a phrase's
//! frequency is the number of documents it was extracted from. Phrases
//! naming an already-configured type are dropped, the rest are ranked by
//! frequency (descending, ties broken alphabetically) and cut to the top
//! `top_n`.

use std::collections::HashMap;

use futures::stream::{self, StreamExt};

use crate::models::{DiscoveryReport, IncidentTypeSet, PhraseCount};
use crate::phrase::normalize_phrase;
use crate::providers::PhraseExtractor;
use crate::retry::{with_backoff, RetryPolicy};
use crate::segment::extract_chunked;
use crate::store::DocumentStore;

pub const DEFAULT_TOP_N: usize = 20;

#[derive(Debug, Clone)]
pub struct DiscoveryParams {
    pub top_n: usize,
    pub concurrency: usize,
    pub retry: RetryPolicy,
}

impl Default for DiscoveryParams {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
            concurrency: crate::strategy::DEFAULT_CONCURRENCY,
            retry: RetryPolicy::default(),
        }
    }
}

pub async fn discover(
    store: &DocumentStore,
    extractor: &dyn PhraseExtractor,
    known: &IncidentTypeSet,
    params: &DiscoveryParams,
) -> DiscoveryReport {
    tracing::info!(
        documents = store.len(),
        extractor = extractor.name(),
        top_n = params.top_n,
        "discovering candidate incident types"
    );

    let extracted: Vec<_> = stream::iter(store.iter())
        .map(|doc| async move {
            let phrases = with_backoff(&params.retry, "phrase extraction", || {
                extract_chunked(extractor, &doc.text)
            })
            .await;
            (doc, phrases)
        })
        .buffered(params.concurrency.max(1))
        .collect()
        .await;

    let mut frequencies: HashMap<String, u64> = HashMap::new();
    let mut processed = 0;
    let mut skipped = 0;
    for (doc, phrases) in extracted {
        match phrases {
            Ok(phrases) => {
                processed += 1;
                let mut seen = std::collections::HashSet::new();
                for phrase in phrases {
                    let key = normalize_phrase(&phrase);
                    if !key.is_empty() && seen.insert(key.clone()) {
                        *frequencies.entry(key).or_default() += 1;
                    }
                }
            }
            Err(e) => {
                skipped += 1;
                tracing::warn!(id = %doc.id, error = %e, "skipping document: extraction failed");
            }
        }
    }

    let terms = rank(frequencies, known, params.top_n);
    tracing::info!(
        processed,
        skipped,
        terms = terms.len(),
        "discovery finished"
    );

    DiscoveryReport {
        terms,
        documents_processed: processed,
        documents_skipped: skipped,
    }
}

/// Drop known types, sort by frequency desc then phrase asc, keep `top_n`.
pub fn rank(
    frequencies: HashMap<String, u64>,
    known: &IncidentTypeSet,
    top_n: usize,
) -> Vec<PhraseCount> {
    let mut terms: Vec<PhraseCount> = frequencies
        .into_iter()
        .filter(|(phrase, _)| !known.contains(phrase))
        .map(|(phrase, frequency)| PhraseCount { phrase, frequency })
        .collect();
    terms.sort_by(|a, b| {
        b.frequency
            .cmp(&a.frequency)
            .then_with(|| a.phrase.cmp(&b.phrase))
    });
    terms.truncate(top_n);
    terms
}
