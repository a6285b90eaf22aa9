//! In-memory [`RetrievalIndex`] for tests and small corpora.
//!
//! Text is tokenized into lower-cased alphanumeric words. A query matches
//! a document when its words appear there as a contiguous run (a phrase
//! match), and the raw score is the number of such runs. Raw scores are
//! normalized with `s / (1 + s)`, so one occurrence scores 0.5, two score
//! 0.67, and so on.

use std::collections::BTreeMap;
use std::sync::RwLock;

use async_trait::async_trait;

use crate::error::{CensusError, Result};
use crate::models::{sort_results, Document, RetrievalResult};
use crate::providers::RetrievalIndex;

const SNIPPET_CHARS: usize = 240;

struct Entry {
    tokens: Vec<String>,
    snippet: String,
}

#[derive(Default)]
pub struct InMemoryIndex {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl InMemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

pub(crate) fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_lowercase)
        .collect()
}

/// Map a non-negative raw engine score into `[0, 1)`.
pub fn normalize_score(raw: f64) -> f64 {
    if raw <= 0.0 || !raw.is_finite() {
        return 0.0;
    }
    raw / (1.0 + raw)
}

fn occurrences(haystack: &[String], needle: &[String]) -> usize {
    if needle.is_empty() || needle.len() > haystack.len() {
        return 0;
    }
    haystack.windows(needle.len()).filter(|w| *w == needle).count()
}

fn poisoned() -> CensusError {
    CensusError::index("in-memory index lock poisoned")
}

#[async_trait]
impl RetrievalIndex for InMemoryIndex {
    fn name(&self) -> &str {
        "memory"
    }

    async fn index(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Err(CensusError::index("refusing to index an empty batch"));
        }
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        for doc in documents {
            entries.insert(
                doc.id.clone(),
                Entry {
                    tokens: tokenize(&doc.text),
                    snippet: doc.text.chars().take(SNIPPET_CHARS).collect(),
                },
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
        let terms = tokenize(text);
        if terms.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let entries = self.entries.read().map_err(|_| poisoned())?;
        let mut results: Vec<RetrievalResult> = entries
            .iter()
            .filter_map(|(id, entry)| {
                let hits = occurrences(&entry.tokens, &terms);
                if hits == 0 {
                    return None;
                }
                let score = normalize_score(hits as f64);
                (score >= strictness).then(|| RetrievalResult {
                    document_id: id.clone(),
                    score,
                    snippet: Some(entry.snippet.clone()),
                })
            })
            .collect();
        sort_results(&mut results);
        results.truncate(top_k);
        Ok(results)
    }

    async fn document_count(&self) -> Result<usize> {
        Ok(self.entries.read().map_err(|_| poisoned())?.len())
    }
}
