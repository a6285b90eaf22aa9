//! Core data types that flow through the counting and discovery pipeline.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};

use crate::error::{CensusError, Result};
use crate::phrase::normalize_phrase;

/// A single incident report. Immutable for the duration of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

impl Document {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// A labeled incident category, optionally carrying the weight (expected
/// share or ground-truth count) it was configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentType {
    pub label: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub weight: Option<f64>,
}

impl IncidentType {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            weight: None,
        }
    }

    pub fn weighted(label: impl Into<String>, weight: f64) -> Self {
        Self {
            label: label.into(),
            weight: Some(weight),
        }
    }
}

/// Configured incident types. Labels are unique after case and
/// whitespace normalization; insertion order is preserved.
#[derive(Debug, Clone, Default)]
pub struct IncidentTypeSet {
    types: Vec<IncidentType>,
    normalized: HashSet<String>,
}

impl IncidentTypeSet {
    pub fn new(types: Vec<IncidentType>) -> Result<Self> {
        let mut set = Self::default();
        for t in types {
            set.push(t)?;
        }
        Ok(set)
    }

    pub fn push(&mut self, incident_type: IncidentType) -> Result<()> {
        let key = normalize_phrase(&incident_type.label);
        if key.is_empty() {
            return Err(CensusError::Configuration(
                "incident type label must not be empty".to_string(),
            ));
        }
        if !self.normalized.insert(key) {
            return Err(CensusError::Configuration(format!(
                "duplicate incident type label (case-insensitive): '{}'",
                incident_type.label
            )));
        }
        self.types.push(incident_type);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IncidentType> {
        self.types.iter()
    }

    pub fn as_slice(&self) -> &[IncidentType] {
        &self.types
    }

    pub fn labels(&self) -> Vec<String> {
        self.types.iter().map(|t| t.label.clone()).collect()
    }

    /// Whether `phrase` names one of the configured types.
    pub fn contains(&self, phrase: &str) -> bool {
        self.normalized.contains(&normalize_phrase(phrase))
    }

    pub fn find(&self, label: &str) -> Option<&IncidentType> {
        let key = normalize_phrase(label);
        self.types.iter().find(|t| normalize_phrase(&t.label) == key)
    }
}

/// One ranked hit from a [`RetrievalIndex`](crate::providers::RetrievalIndex).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RetrievalResult {
    pub document_id: String,
    /// Relevance in `[0.0, 1.0]`, higher is better.
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// Sort results by score descending, then id ascending for stable output.
pub fn sort_results(results: &mut [RetrievalResult]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.document_id.cmp(&b.document_id))
    });
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhraseCount {
    pub phrase: String,
    pub frequency: u64,
}

/// Counting algorithm selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyKind {
    Keyword,
    Phrase,
    Generative,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Keyword => "keyword",
            Self::Phrase => "phrase",
            Self::Generative => "generative",
        }
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyKind {
    type Err = CensusError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keyword" => Ok(Self::Keyword),
            "phrase" => Ok(Self::Phrase),
            "generative" => Ok(Self::Generative),
            other => Err(CensusError::Configuration(format!(
                "unknown counting strategy '{}'. Use keyword, phrase, or generative.",
                other
            ))),
        }
    }
}

/// Result of counting one incident type.
#[derive(Debug, Clone, PartialEq)]
pub enum CountOutcome {
    Counted(u64),
    /// The strategy failed; the message is recorded instead of a count so
    /// a failure is never confused with "zero documents found".
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct CountEntry {
    pub label: String,
    pub outcome: CountOutcome,
    pub strategy_used: StrategyKind,
    pub requested_strategy: StrategyKind,
    pub timestamp: DateTime<Utc>,
    pub expected: Option<f64>,
    pub rationale: Option<String>,
}

impl CountEntry {
    pub fn count(&self) -> Option<u64> {
        match self.outcome {
            CountOutcome::Counted(n) => Some(n),
            CountOutcome::Failed(_) => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.outcome {
            CountOutcome::Counted(_) => None,
            CountOutcome::Failed(e) => Some(e),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.outcome, CountOutcome::Failed(_))
    }

    pub fn fell_back(&self) -> bool {
        self.strategy_used != self.requested_strategy
    }

    pub fn status(&self) -> &'static str {
        if self.is_failed() {
            "failed"
        } else {
            "ok"
        }
    }
}

#[derive(Serialize)]
struct CountEntryView<'a> {
    count: Option<u64>,
    strategy: StrategyKind,
    requested_strategy: StrategyKind,
    timestamp: String,
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    expected: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    rationale: Option<&'a str>,
}

impl<'a> From<&'a CountEntry> for CountEntryView<'a> {
    fn from(e: &'a CountEntry) -> Self {
        Self {
            count: e.count(),
            strategy: e.strategy_used,
            requested_strategy: e.requested_strategy,
            timestamp: e.timestamp.to_rfc3339(),
            status: e.status(),
            expected: e.expected,
            error: e.error(),
            rationale: e.rationale.as_deref(),
        }
    }
}

/// Per-type count results for one run, in request order.
///
/// Serializes as a JSON object keyed by label.
#[derive(Debug, Clone)]
pub struct CountReport {
    pub generated_at: DateTime<Utc>,
    pub entries: Vec<CountEntry>,
}

impl CountReport {
    pub fn get(&self, label: &str) -> Option<&CountEntry> {
        self.entries.iter().find(|e| e.label == label)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CountEntry> {
        self.entries.iter().filter(|e| e.is_failed())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Serialize for CountReport {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.entries.len()))?;
        for entry in &self.entries {
            map.serialize_entry(&entry.label, &CountEntryView::from(entry))?;
        }
        map.end()
    }
}

/// Top-N discovered phrases, most frequent first.
#[derive(Debug, Clone, Serialize)]
pub struct DiscoveryReport {
    pub terms: Vec<PhraseCount>,
    pub documents_processed: usize,
    pub documents_skipped: usize,
}
