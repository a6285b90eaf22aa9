//! `census count` and `census count-all`.

use std::path::Path;

use anyhow::{bail, Result};
use incident_census_core::aggregate::{count_incident_types, count_one};
use incident_census_core::models::{CountReport, IncidentType, StrategyKind};

use crate::backends::{self, Needs, Providers};
use crate::config::{self, Config};
use crate::report;

fn needs_for(strategy: StrategyKind) -> Needs {
    Needs {
        extractor: strategy == StrategyKind::Phrase,
        counter: strategy == StrategyKind::Generative,
    }
}

/// Count a single incident type and print the total.
///
/// The label does not have to be configured; when it is, its expected
/// weight is carried into the log line.
pub async fn run_count(config: &Config, label: &str, strategy: Option<StrategyKind>) -> Result<()> {
    let label = label.trim();
    if label.is_empty() {
        bail!("incident type must not be empty");
    }
    let strategy = strategy.unwrap_or(config.counting.strategy);

    let incident_type = config::known_incident_types(config)?
        .find(label)
        .map(|t| IncidentType {
            label: label.to_string(),
            weight: t.weight,
        })
        .unwrap_or_else(|| IncidentType::new(label));

    let providers = Providers::build(config, needs_for(strategy))?;
    let session = backends::open_session(config).await?;
    let ctx = backends::run_context(config, &session, providers);
    let entry = count_one(&ctx, &incident_type, strategy).await;
    session.backend.close().await;

    match entry.count() {
        Some(n) => {
            tracing::info!(
                label,
                count = n,
                strategy = %entry.strategy_used,
                expected = ?entry.expected,
                "count finished"
            );
            if let Some(rationale) = &entry.rationale {
                tracing::debug!(label, rationale = %rationale, "model rationale");
            }
            println!("Total count for '{}' incidents: {}", label, n);
            Ok(())
        }
        None => bail!(
            "counting '{}' failed: {}",
            label,
            entry.error().unwrap_or("unknown error")
        ),
    }
}

/// Count every configured incident type and write the JSON and CSV
/// reports. Per-type failures are recorded in the reports, not raised.
pub async fn run_count_all(
    config: &Config,
    strategy: Option<StrategyKind>,
    output: Option<&Path>,
) -> Result<CountReport> {
    let strategy = strategy.unwrap_or(config.counting.strategy);
    let types = config::load_incident_types(config)?;

    let providers = Providers::build(config, needs_for(strategy))?;
    let session = backends::open_session(config).await?;
    let ctx = backends::run_context(config, &session, providers);
    let report = count_incident_types(&ctx, types.as_slice(), strategy).await;
    session.backend.close().await;

    let dir = output.unwrap_or(config.reports.dir.as_path());
    let files = report::write_count_reports(&report, dir)?;

    let width = report.entries.iter().map(|e| e.label.len()).max().unwrap_or(0);
    for entry in &report.entries {
        match entry.count() {
            Some(n) if entry.fell_back() => println!(
                "  {:<width$}  {:>6}  ({}, fell back from {})",
                entry.label, n, entry.strategy_used, entry.requested_strategy
            ),
            Some(n) => println!("  {:<width$}  {:>6}  ({})", entry.label, n, entry.strategy_used),
            None => println!(
                "  {:<width$}  {:>6}  error: {}",
                entry.label,
                "-",
                entry.error().unwrap_or_default()
            ),
        }
    }
    println!();
    println!("Wrote {}", files.json.display());
    println!("Wrote {}", files.csv.display());

    let failed = report.failed().count();
    if failed > 0 {
        tracing::warn!(failed, total = report.len(), "some incident types could not be counted");
    }
    Ok(report)
}
