//! # Incident Census Core
//!
//! Decision logic for counting incident types in a batch of incident
//! reports and for discovering new candidate incident types.
//!
//! This crate performs no filesystem or network I/O. Search indices,
//! key-phrase extractors and generative counters are reached through the
//! capability traits in [`providers`]; concrete adapters live in the
//! `incident-census` app crate.
//!
//! ## Pipeline
//!
//! ```text
//! DocumentStore ──index──▶ RetrievalIndex
//!       │                        │
//!       │                        ▼
//!       │          StrategyKind::{Keyword, Phrase, Generative}
//!       │                        │
//!       │                        ▼
//!       │              aggregate::count_incident_types ──▶ CountReport
//!       │
//!       └──▶ PhraseExtractor ──▶ discovery::discover ──▶ DiscoveryReport
//! ```
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`models`] | Documents, incident types, retrieval results, reports |
//! | [`error`] | [`CensusError`](error::CensusError) taxonomy |
//! | [`store`] | [`DocumentStore`](store::DocumentStore) for one run |
//! | [`providers`] | `RetrievalIndex`, `PhraseExtractor`, `GenerativeCounter` traits |
//! | [`index`] | Single-writer index handle and the in-memory index |
//! | [`phrase`] | Phrase normalization and fuzzy label matching |
//! | [`segment`] | Splitting oversized text for size-limited extractors |
//! | [`keyphrase`] | Offline stopword-delimited key-phrase extractor |
//! | [`retry`] | Timeout plus bounded exponential backoff |
//! | [`strategy`] | Counting strategies and the [`RunContext`](strategy::RunContext) |
//! | [`aggregate`] | Per-type counting with fallback and error markers |
//! | [`discovery`] | Corpus-wide phrase frequency ranking |

pub mod aggregate;
pub mod discovery;
pub mod error;
pub mod index;
pub mod keyphrase;
pub mod models;
pub mod phrase;
pub mod providers;
pub mod retry;
pub mod segment;
pub mod store;
pub mod strategy;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{CensusError, Result};
