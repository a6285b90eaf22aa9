//! # Incident Census
//!
//! Count how often known incident types occur in a corpus of incident
//! reports, and propose new incident types from frequent key phrases.
//!
//! The counting and discovery algorithms live in
//! [`incident_census_core`]; this crate loads configuration and the
//! corpus, wires up providers, and writes reports.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌────────────────┐   ┌───────────────────┐
//! │  Corpus  │──▶│ RetrievalIndex │──▶│ Keyword / Phrase / │──▶ reports/
//! │ *.txt    │   │ SQLite / Azure │   │ Generative count   │
//! └──────────┘   └────────────────┘   └───────────────────┘
//!       │
//!       └──────▶ PhraseExtractor ──▶ discovery ──▶ reports/
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! census index                          # load the corpus into the index
//! census count "near miss"              # one incident type
//! census count-all --strategy keyword   # every configured type
//! census discover --top 10              # candidate new types
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`corpus`] | Load documents from the corpus directory |
//! | [`db`] | SQLite connection |
//! | [`migrate`] | Index schema |
//! | [`sqlite_index`] | Local FTS5 retrieval index |
//! | [`azure_search`] | Azure AI Search retrieval index |
//! | [`text_analytics`] | Azure AI Language key-phrase extraction |
//! | [`openai`] | Chat-completion incident counter |
//! | [`http`] | Shared HTTP error mapping |
//! | [`backends`] | Build providers from configuration |
//! | [`report`] | JSON and CSV report files |

pub mod azure_search;
pub mod backends;
pub mod config;
pub mod corpus;
pub mod count;
pub mod db;
pub mod discover;
pub mod http;
pub mod index_cmd;
pub mod migrate;
pub mod openai;
pub mod report;
pub mod sqlite_index;
pub mod text_analytics;
pub mod types;
