//! TOML configuration.
//!
//! Every section except `[corpus]` is optional and falls back to the
//! defaults documented on each field. [`load_config`] parses and
//! validates; any invalid value is reported as a
//! [`CensusError::Configuration`] before a single provider is contacted.
//!
//! ```toml
//! [corpus]
//! root = "./data/small"
//!
//! [incident_types]
//! path = "./config/incident_type_distribution.json"
//!
//! [index]
//! provider = "sqlite"          # sqlite | azure | memory
//! path = "./data/census.sqlite"
//!
//! [phrases]
//! provider = "local"           # local | azure | disabled
//!
//! [generative]
//! provider = "azure-openai"    # disabled | openai | azure-openai
//! endpoint = "https://example.openai.azure.com"
//! model = "gpt-4o"
//!
//! [counting]
//! strategy = "generative"      # keyword | phrase | generative
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use incident_census_core::discovery::DEFAULT_TOP_N;
use incident_census_core::keyphrase::DEFAULT_MAX_WORDS;
use incident_census_core::models::{IncidentType, IncidentTypeSet, StrategyKind};
use incident_census_core::phrase::DEFAULT_FUZZY_THRESHOLD;
use incident_census_core::retry::RetryPolicy;
use incident_census_core::strategy::{StrategyParams, DEFAULT_CONCURRENCY, DEFAULT_MAX_BATCH_DOCS};
use incident_census_core::CensusError;
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub corpus: CorpusConfig,
    #[serde(default)]
    pub incident_types: IncidentTypesConfig,
    #[serde(default)]
    pub index: IndexConfig,
    #[serde(default)]
    pub phrases: PhrasesConfig,
    #[serde(default)]
    pub generative: GenerativeConfig,
    #[serde(default)]
    pub counting: CountingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub run: RunConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CorpusConfig {
    pub root: PathBuf,
    #[serde(default = "default_include_globs")]
    pub include_globs: Vec<String>,
    #[serde(default)]
    pub exclude_globs: Vec<String>,
    #[serde(default)]
    pub follow_symlinks: bool,
}

fn default_include_globs() -> Vec<String> {
    vec!["**/*.txt".to_string()]
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct IncidentTypesConfig {
    /// JSON object mapping label to weight.
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default)]
    pub inline: Vec<InlineIncidentType>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InlineIncidentType {
    pub label: String,
    #[serde(default)]
    pub weight: Option<f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct IndexConfig {
    #[serde(default = "default_index_provider")]
    pub provider: String,
    /// SQLite database file.
    #[serde(default = "default_index_path")]
    pub path: PathBuf,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Azure AI Search index name.
    #[serde(default = "default_index_name")]
    pub name: String,
    #[serde(default = "default_search_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_search_api_version")]
    pub api_version: String,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            provider: default_index_provider(),
            path: default_index_path(),
            endpoint: None,
            name: default_index_name(),
            api_key_env: default_search_key_env(),
            api_version: default_search_api_version(),
        }
    }
}

fn default_index_provider() -> String {
    "sqlite".to_string()
}
fn default_index_path() -> PathBuf {
    PathBuf::from("./data/census.sqlite")
}
fn default_index_name() -> String {
    "incident-small".to_string()
}
fn default_search_key_env() -> String {
    "AZURE_SEARCH_KEY".to_string()
}
fn default_search_api_version() -> String {
    "2023-11-01".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PhrasesConfig {
    #[serde(default = "default_phrases_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default = "default_text_analytics_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_language")]
    pub language: String,
    /// Overrides the provider's own input limit.
    #[serde(default)]
    pub max_input_chars: Option<usize>,
    /// Longest phrase the local extractor emits, in words.
    #[serde(default = "default_max_words")]
    pub max_words: usize,
}

impl Default for PhrasesConfig {
    fn default() -> Self {
        Self {
            provider: default_phrases_provider(),
            endpoint: None,
            api_key_env: default_text_analytics_key_env(),
            language: default_language(),
            max_input_chars: None,
            max_words: DEFAULT_MAX_WORDS,
        }
    }
}

fn default_phrases_provider() -> String {
    "local".to_string()
}
fn default_text_analytics_key_env() -> String {
    "AZURE_TEXT_ANALYTICS_KEY".to_string()
}
fn default_language() -> String {
    "en".to_string()
}
fn default_max_words() -> usize {
    DEFAULT_MAX_WORDS
}

impl PhrasesConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct GenerativeConfig {
    #[serde(default = "default_generative_provider")]
    pub provider: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    /// Model name, or the deployment name for Azure OpenAI.
    #[serde(default)]
    pub model: Option<String>,
    /// Defaults to `OPENAI_API_KEY` or `AZURE_OPENAI_KEY` by provider.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default = "default_openai_api_version")]
    pub api_version: String,
    #[serde(default = "default_max_batch_docs")]
    pub max_batch_docs: usize,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

impl Default for GenerativeConfig {
    fn default() -> Self {
        Self {
            provider: default_generative_provider(),
            endpoint: None,
            model: None,
            api_key_env: None,
            api_version: default_openai_api_version(),
            max_batch_docs: DEFAULT_MAX_BATCH_DOCS,
            max_tokens: default_max_tokens(),
        }
    }
}

fn default_generative_provider() -> String {
    "disabled".to_string()
}
fn default_openai_api_version() -> String {
    "2023-05-15".to_string()
}
fn default_max_batch_docs() -> usize {
    DEFAULT_MAX_BATCH_DOCS
}
fn default_max_tokens() -> u32 {
    256
}

impl GenerativeConfig {
    pub fn is_enabled(&self) -> bool {
        self.provider != "disabled"
    }

    pub fn key_env(&self) -> &str {
        match (&self.api_key_env, self.provider.as_str()) {
            (Some(name), _) => name,
            (None, "azure-openai") => "AZURE_OPENAI_KEY",
            (None, _) => "OPENAI_API_KEY",
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct CountingConfig {
    #[serde(default = "default_strategy")]
    pub strategy: StrategyKind,
    /// Candidates per query. Defaults to the corpus size.
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub strictness: f64,
    #[serde(default = "default_fuzzy_threshold")]
    pub fuzzy_threshold: f64,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            strategy: default_strategy(),
            top_k: None,
            strictness: 0.0,
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
        }
    }
}

fn default_strategy() -> StrategyKind {
    StrategyKind::Generative
}
fn default_fuzzy_threshold() -> f64 {
    DEFAULT_FUZZY_THRESHOLD
}

#[derive(Debug, Deserialize, Clone)]
pub struct DiscoveryConfig {
    #[serde(default = "default_top_n")]
    pub top_n: usize,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            top_n: DEFAULT_TOP_N,
        }
    }
}

fn default_top_n() -> usize {
    DEFAULT_TOP_N
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    /// Per-attempt timeout.
    #[serde(default = "default_attempt_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            timeout_secs: default_attempt_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}
fn default_base_delay_ms() -> u64 {
    500
}
fn default_attempt_timeout_secs() -> u64 {
    30
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_attempts,
            base_delay: Duration::from_millis(self.base_delay_ms),
            timeout: Duration::from_secs(self.timeout_secs),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunConfig {
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    /// Wall-clock limit for a whole command.
    #[serde(default = "default_run_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: default_run_timeout_secs(),
        }
    }
}

fn default_concurrency() -> usize {
    DEFAULT_CONCURRENCY
}
fn default_run_timeout_secs() -> u64 {
    1800
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    #[serde(default = "default_reports_dir")]
    pub dir: PathBuf,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            dir: default_reports_dir(),
        }
    }
}

fn default_reports_dir() -> PathBuf {
    PathBuf::from("reports")
}

impl Config {
    pub fn strategy_params(&self) -> StrategyParams {
        StrategyParams {
            top_k: self.counting.top_k,
            strictness: self.counting.strictness,
            fuzzy_threshold: self.counting.fuzzy_threshold,
            max_batch_docs: self.generative.max_batch_docs,
        }
    }
}

fn invalid(message: impl Into<String>) -> anyhow::Error {
    CensusError::Configuration(message.into()).into()
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content)
        .map_err(|e| invalid(format!("failed to parse config file: {e}")))?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(0.0..=1.0).contains(&config.counting.strictness) {
        return Err(invalid("counting.strictness must be in [0.0, 1.0]"));
    }
    if !(0.0..=1.0).contains(&config.counting.fuzzy_threshold) {
        return Err(invalid("counting.fuzzy_threshold must be in [0.0, 1.0]"));
    }
    if config.counting.top_k == Some(0) {
        return Err(invalid("counting.top_k must be >= 1"));
    }
    if config.discovery.top_n == 0 {
        return Err(invalid("discovery.top_n must be >= 1"));
    }
    if config.retry.max_attempts == 0 {
        return Err(invalid("retry.max_attempts must be >= 1"));
    }
    if config.retry.timeout_secs == 0 || config.run.timeout_secs == 0 {
        return Err(invalid("timeouts must be > 0"));
    }
    if config.run.concurrency == 0 {
        return Err(invalid("run.concurrency must be >= 1"));
    }
    if config.generative.max_batch_docs == 0 {
        return Err(invalid("generative.max_batch_docs must be >= 1"));
    }
    if config.phrases.max_words == 0 {
        return Err(invalid("phrases.max_words must be >= 1"));
    }

    match config.index.provider.as_str() {
        "sqlite" | "memory" => {}
        "azure" => require_endpoint("index", &config.index.endpoint)?,
        other => {
            return Err(invalid(format!(
                "unknown index provider: '{other}'. Must be sqlite, azure, or memory."
            )))
        }
    }

    match config.phrases.provider.as_str() {
        "local" | "disabled" => {}
        "azure" => require_endpoint("phrases", &config.phrases.endpoint)?,
        other => {
            return Err(invalid(format!(
                "unknown phrases provider: '{other}'. Must be local, azure, or disabled."
            )))
        }
    }

    match config.generative.provider.as_str() {
        "disabled" => {}
        "openai" => require_model(config)?,
        "azure-openai" => {
            require_endpoint("generative", &config.generative.endpoint)?;
            require_model(config)?;
        }
        other => {
            return Err(invalid(format!(
                "unknown generative provider: '{other}'. Must be disabled, openai, or azure-openai."
            )))
        }
    }

    if config.counting.strategy == StrategyKind::Phrase && !config.phrases.is_enabled() {
        return Err(invalid(
            "counting.strategy = \"phrase\" requires a phrases provider",
        ));
    }

    Ok(())
}

fn require_endpoint(section: &str, endpoint: &Option<String>) -> Result<()> {
    match endpoint.as_deref().map(str::trim) {
        Some(e) if !e.is_empty() => Ok(()),
        _ => Err(invalid(format!(
            "{section}.endpoint must be set for a remote provider"
        ))),
    }
}

fn require_model(config: &Config) -> Result<()> {
    if config.generative.model.as_deref().map_or(true, str::is_empty) {
        return Err(invalid(format!(
            "generative.model must be specified when provider is '{}'",
            config.generative.provider
        )));
    }
    Ok(())
}

/// Read a credential from the environment variable named `var`.
pub fn api_key(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(invalid(format!("environment variable {var} is not set"))),
    }
}

/// Known incident types: the JSON distribution file first (in file
/// order), then inline entries.
pub fn load_incident_types(config: &Config) -> Result<IncidentTypeSet> {
    let mut types = Vec::new();

    if let Some(path) = &config.incident_types.path {
        let content = std::fs::read_to_string(path)
            .map_err(|e| invalid(format!("failed to read {}: {e}", path.display())))?;
        types.extend(parse_distribution(&content).with_context(|| {
            format!("invalid incident type distribution: {}", path.display())
        })?);
    }

    types.extend(
        config
            .incident_types
            .inline
            .iter()
            .map(|t| IncidentType {
                label: t.label.clone(),
                weight: t.weight,
            }),
    );

    if types.is_empty() {
        return Err(invalid(
            "no incident types configured: set incident_types.path or incident_types.inline",
        ));
    }
    Ok(IncidentTypeSet::new(types)?)
}

/// Like [`load_incident_types`], but an empty set when none are
/// configured.
pub fn known_incident_types(config: &Config) -> Result<IncidentTypeSet> {
    if config.incident_types.path.is_none() && config.incident_types.inline.is_empty() {
        return Ok(IncidentTypeSet::default());
    }
    load_incident_types(config)
}

/// Parse `{"label": weight, ...}`.
pub fn parse_distribution(content: &str) -> Result<Vec<IncidentType>> {
    let map: serde_json::Map<String, serde_json::Value> = serde_json::from_str(content)
        .map_err(|e| invalid(format!("expected a JSON object of label to weight: {e}")))?;
    map.into_iter()
        .map(|(label, value)| match value {
            serde_json::Value::Number(n) => Ok(IncidentType {
                label,
                weight: n.as_f64(),
            }),
            serde_json::Value::Null => Ok(IncidentType::new(label)),
            other => Err(invalid(format!(
                "weight for '{label}' must be a number, got {other}"
            ))),
        })
        .collect()
}
