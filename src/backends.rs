//! Build providers from configuration.
//!
//! Turns the `[index]`, `[phrases]` and `[generative]` sections into
//! trait objects the core understands. Credentials are read here, so a
//! missing key surfaces as a configuration error before any request is
//! made.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use incident_census_core::index::{InMemoryIndex, SharedIndex};
use incident_census_core::keyphrase::LocalPhraseExtractor;
use incident_census_core::providers::{GenerativeCounter, PhraseExtractor, RetrievalIndex};
use incident_census_core::retry::{with_backoff, RetryPolicy};
use incident_census_core::store::DocumentStore;
use incident_census_core::strategy::RunContext;
use incident_census_core::CensusError;

use crate::azure_search::AzureSearchIndex;
use crate::config::{self, Config};
use crate::http;
use crate::openai::ChatCounter;
use crate::sqlite_index::SqliteIndex;
use crate::text_analytics::TextAnalyticsExtractor;

/// The configured retrieval index.
pub enum IndexBackend {
    Sqlite(Arc<SqliteIndex>),
    Azure(Arc<AzureSearchIndex>),
    Memory(Arc<InMemoryIndex>),
}

impl IndexBackend {
    pub async fn open(cfg: &Config) -> Result<Self> {
        Ok(match cfg.index.provider.as_str() {
            "sqlite" => Self::Sqlite(Arc::new(SqliteIndex::open(&cfg.index.path).await?)),
            "memory" => Self::Memory(Arc::new(InMemoryIndex::new())),
            "azure" => {
                let endpoint = cfg.index.endpoint.as_deref().unwrap_or_default();
                let key = config::api_key(&cfg.index.api_key_env)?;
                Self::Azure(Arc::new(AzureSearchIndex::new(
                    client(cfg)?,
                    endpoint,
                    &cfg.index.name,
                    key,
                    &cfg.index.api_version,
                )))
            }
            other => {
                return Err(CensusError::Configuration(format!("unknown index provider: '{other}'")).into())
            }
        })
    }

    pub fn shared(&self) -> SharedIndex {
        let inner: Arc<dyn RetrievalIndex> = match self {
            Self::Sqlite(i) => i.clone(),
            Self::Azure(i) => i.clone(),
            Self::Memory(i) => i.clone(),
        };
        SharedIndex::new(inner)
    }

    /// Local indexes are brought up to date with the corpus before every
    /// count or discovery run. A remote index is only written by
    /// `census index`.
    pub fn syncs_automatically(&self) -> bool {
        !matches!(self, Self::Azure(_))
    }

    /// Write every corpus document into the index and, for SQLite, drop
    /// documents that are no longer in the corpus. Transient build
    /// failures are retried under `policy`.
    pub async fn sync(
        &self,
        index: &SharedIndex,
        store: &DocumentStore,
        policy: &RetryPolicy,
    ) -> Result<()> {
        if !store.is_empty() {
            with_backoff(policy, "index build", move || index.rebuild(store.documents())).await?;
        }
        if let Self::Sqlite(sqlite) = self {
            let keep: BTreeSet<String> = store.iter().map(|d| d.id.clone()).collect();
            sqlite.prune(&keep).await?;
        }
        Ok(())
    }

    pub async fn close(&self) {
        if let Self::Sqlite(sqlite) = self {
            sqlite.close().await;
        }
    }
}

fn client(cfg: &Config) -> Result<reqwest::Client> {
    http::client(Duration::from_secs(cfg.retry.timeout_secs))
}

/// `None` when `[phrases] provider = "disabled"`.
pub fn create_extractor(cfg: &Config) -> Result<Option<Arc<dyn PhraseExtractor>>> {
    let phrases = &cfg.phrases;
    let extractor: Arc<dyn PhraseExtractor> = match phrases.provider.as_str() {
        "disabled" => return Ok(None),
        "local" => Arc::new(LocalPhraseExtractor::new(phrases.max_words)),
        "azure" => Arc::new(TextAnalyticsExtractor::new(
            client(cfg)?,
            phrases.endpoint.as_deref().unwrap_or_default(),
            config::api_key(&phrases.api_key_env)?,
            &phrases.language,
            phrases.max_input_chars,
        )),
        other => {
            return Err(CensusError::Configuration(format!("unknown phrases provider: '{other}'")).into())
        }
    };
    Ok(Some(extractor))
}

/// `None` when `[generative] provider = "disabled"`.
pub fn create_counter(cfg: &Config) -> Result<Option<Arc<dyn GenerativeCounter>>> {
    let g = &cfg.generative;
    if !g.is_enabled() {
        return Ok(None);
    }
    let key = config::api_key(g.key_env())?;
    let model = g.model.as_deref().unwrap_or_default();
    let counter: Arc<dyn GenerativeCounter> = match g.provider.as_str() {
        "openai" => Arc::new(ChatCounter::openai(
            client(cfg)?,
            g.endpoint.as_deref(),
            model,
            key,
            g.max_tokens,
        )),
        "azure-openai" => Arc::new(ChatCounter::azure(
            client(cfg)?,
            g.endpoint.as_deref().unwrap_or_default(),
            model,
            &g.api_version,
            key,
            g.max_tokens,
        )),
        other => {
            return Err(
                CensusError::Configuration(format!("unknown generative provider: '{other}'")).into(),
            )
        }
    };
    Ok(Some(counter))
}

/// Number of documents in `index`, retried under `policy`.
pub async fn document_count(index: &SharedIndex, policy: &RetryPolicy) -> Result<usize> {
    Ok(with_backoff(policy, "index count", move || index.document_count()).await?)
}

/// Corpus and index, ready to query.
pub struct Session {
    pub store: Arc<DocumentStore>,
    pub backend: IndexBackend,
    pub index: SharedIndex,
}

/// Load the corpus and open the index. Local indexes are synced first;
/// an empty remote index only gets a warning since it may be populated
/// out of band.
pub async fn open_session(cfg: &Config) -> Result<Session> {
    let store = Arc::new(crate::corpus::load_corpus(&cfg.corpus)?);
    let backend = IndexBackend::open(cfg).await?;
    let index = backend.shared();
    let policy = cfg.retry.policy();

    if backend.syncs_automatically() {
        backend.sync(&index, &store, &policy).await?;
    } else if document_count(&index, &policy).await? == 0 {
        tracing::warn!(
            index = index.name(),
            "remote index is empty; run `census index` first"
        );
    }

    Ok(Session {
        store,
        backend,
        index,
    })
}

/// Which optional capabilities a command needs. Providers that are not
/// needed are never built, so their credentials are not required.
#[derive(Debug, Clone, Copy, Default)]
pub struct Needs {
    pub extractor: bool,
    pub counter: bool,
}

/// The optional providers a command asked for. Built before the session
/// is opened so a missing credential fails the run before any index or
/// network access.
#[derive(Default)]
pub struct Providers {
    pub extractor: Option<Arc<dyn PhraseExtractor>>,
    pub counter: Option<Arc<dyn GenerativeCounter>>,
}

impl Providers {
    pub fn build(cfg: &Config, needs: Needs) -> Result<Self> {
        Ok(Self {
            extractor: if needs.extractor { create_extractor(cfg)? } else { None },
            counter: if needs.counter { create_counter(cfg)? } else { None },
        })
    }
}

/// Assemble a [`RunContext`] over the session's corpus and index.
pub fn run_context(cfg: &Config, session: &Session, providers: Providers) -> RunContext {
    let mut ctx = RunContext::new(session.store.clone(), session.index.clone())
        .with_params(cfg.strategy_params())
        .with_retry(cfg.retry.policy())
        .with_concurrency(cfg.run.concurrency);
    if let Some(extractor) = providers.extractor {
        ctx = ctx.with_extractor(extractor);
    }
    if let Some(counter) = providers.counter {
        ctx = ctx.with_counter(counter);
    }
    ctx
}
