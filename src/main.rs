//! # Incident Census CLI (`census`)
//!
//! ## Usage
//!
//! ```bash
//! census --config ./config/census.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `census index` | Load the corpus into the configured index |
//! | `census count "<type>"` | Count one incident type |
//! | `census count-all` | Count every configured type and write reports |
//! | `census discover` | Propose new incident types from key phrases |
//! | `census types` | List configured incident types |
//!
//! Logs go to stderr (`RUST_LOG`, default `info`); results go to stdout.

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use incident_census::config;
use incident_census::{count, discover, index_cmd, types};
use incident_census_core::models::StrategyKind;
use incident_census_core::CensusError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Incident Census: count and discover incident types in incident reports.
///
/// All commands read a TOML configuration file given by `--config`.
#[derive(Parser)]
#[command(name = "census", version)]
struct Cli {
    /// Path to configuration file (TOML).
    #[arg(long, global = true, default_value = "./config/census.toml")]
    config: PathBuf,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// (Re)build the index from the corpus.
    ///
    /// Unchanged documents are skipped; documents removed from the corpus
    /// are dropped from a SQLite index.
    Index,

    /// Count the documents describing one incident type.
    Count {
        /// Incident type label, e.g. "near miss".
        incident_type: String,

        /// `keyword`, `phrase`, or `generative`. Defaults to
        /// `[counting] strategy`.
        #[arg(long)]
        strategy: Option<StrategyKind>,
    },

    /// Count every configured incident type and write JSON and CSV reports.
    CountAll {
        #[arg(long)]
        strategy: Option<StrategyKind>,

        /// Report directory. Defaults to `[reports] dir`.
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Rank frequent key phrases that are not yet incident types.
    Discover {
        /// How many candidates to keep. Defaults to `[discovery] top_n`.
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        top: Option<u64>,

        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// List configured incident types and their expected weights.
    Types,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn run(cli: Cli, cfg: config::Config) -> anyhow::Result<()> {
    match cli.command {
        Commands::Index => index_cmd::run_index(&cfg).await?,
        Commands::Count {
            incident_type,
            strategy,
        } => count::run_count(&cfg, &incident_type, strategy).await?,
        Commands::CountAll { strategy, output } => {
            count::run_count_all(&cfg, strategy, output.as_deref()).await?;
        }
        Commands::Discover { top, output } => {
            let top = top.map(|n| usize::try_from(n).unwrap_or(usize::MAX));
            discover::run_discover(&cfg, top, output.as_deref()).await?;
        }
        Commands::Types => types::run_types(&cfg)?,
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    let cfg = config::load_config(&cli.config)?;
    let limit = Duration::from_secs(cfg.run.timeout_secs);

    match tokio::time::timeout(limit, run(cli, cfg)).await {
        Ok(result) => result,
        Err(_) => Err(CensusError::Timeout {
            operation: "census run".to_string(),
            elapsed: limit,
        }
        .into()),
    }
}
