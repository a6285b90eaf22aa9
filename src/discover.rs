//! `census discover`: propose new incident types.

use std::path::Path;

use anyhow::{bail, Result};
use incident_census_core::discovery::{discover, DiscoveryParams};
use incident_census_core::models::DiscoveryReport;

use crate::backends;
use crate::config::{self, Config};
use crate::corpus;
use crate::report;

pub async fn run_discover(
    config: &Config,
    top: Option<usize>,
    output: Option<&Path>,
) -> Result<DiscoveryReport> {
    let top_n = top.unwrap_or(config.discovery.top_n);
    if top_n == 0 {
        bail!("--top must be at least 1");
    }

    let Some(extractor) = backends::create_extractor(config)? else {
        bail!("discovery needs a phrases provider; [phrases] provider is \"disabled\"");
    };

    // Without configured types nothing is filtered out.
    let known = config::known_incident_types(config)?;

    let store = corpus::load_corpus(&config.corpus)?;
    let params = DiscoveryParams {
        top_n,
        concurrency: config.run.concurrency,
        retry: config.retry.policy(),
    };
    let started = chrono::Local::now();
    let report = discover(&store, extractor.as_ref(), &known, &params).await;

    let dir = output.unwrap_or(config.reports.dir.as_path());
    let path = report::write_discovery_report(&report, dir, &started)?;

    if report.terms.is_empty() {
        println!("No candidate incident types found.");
    }
    for term in &report.terms {
        println!("  {:>5}  {}", term.frequency, term.phrase);
    }
    if report.documents_skipped > 0 {
        println!(
            "({} of {} documents skipped, see log)",
            report.documents_skipped,
            report.documents_skipped + report.documents_processed
        );
    }
    println!();
    println!("Wrote {}", path.display());
    Ok(report)
}
