//! Write count and discovery reports.
//!
//! File names carry a local `YYYYmmdd_HHMMSS` stamp:
//!
//! | File | Content |
//! |------|---------|
//! | `incident_counts_<ts>.json` | label → {count, strategy, status, ...} |
//! | `incident_counts_<ts>.csv` | one row per label |
//! | `terms_discovered_<ts>.json` | `[{"phrase": ..., "frequency": ...}]` |

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Local, TimeZone};
use incident_census_core::models::{CountReport, DiscoveryReport};

pub const CSV_HEADER: &str = "label,count,strategy,timestamp,expected,status,error";

pub fn file_stamp<Tz: TimeZone>(at: &DateTime<Tz>) -> String
where
    Tz::Offset: std::fmt::Display,
{
    at.format("%Y%m%d_%H%M%S").to_string()
}

fn write_file(path: &Path, content: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
    }
    std::fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
fn escape_csv(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

pub fn counts_csv(report: &CountReport) -> String {
    let mut out = String::from(CSV_HEADER);
    out.push('\n');
    for entry in &report.entries {
        let row = [
            escape_csv(&entry.label),
            entry.count().map(|c| c.to_string()).unwrap_or_default(),
            entry.strategy_used.to_string(),
            entry.timestamp.to_rfc3339(),
            entry.expected.map(|w| w.to_string()).unwrap_or_default(),
            entry.status().to_string(),
            escape_csv(entry.error().unwrap_or_default()),
        ];
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Paths written for one `count-all` run.
#[derive(Debug, Clone)]
pub struct CountReportFiles {
    pub json: PathBuf,
    pub csv: PathBuf,
}

pub fn write_count_reports(report: &CountReport, dir: &Path) -> Result<CountReportFiles> {
    let stamp = file_stamp(&report.generated_at.with_timezone(&Local));
    let files = CountReportFiles {
        json: dir.join(format!("incident_counts_{stamp}.json")),
        csv: dir.join(format!("incident_counts_{stamp}.csv")),
    };
    write_file(&files.json, &serde_json::to_string_pretty(report)?)?;
    write_file(&files.csv, &counts_csv(report))?;
    tracing::info!(json = %files.json.display(), csv = %files.csv.display(), "count reports written");
    Ok(files)
}

pub fn write_discovery_report(
    report: &DiscoveryReport,
    dir: &Path,
    at: &DateTime<Local>,
) -> Result<PathBuf> {
    let path = dir.join(format!("terms_discovered_{}.json", file_stamp(at)));
    write_file(&path, &serde_json::to_string_pretty(&report.terms)?)?;
    tracing::info!(path = %path.display(), terms = report.terms.len(), "discovery report written");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use incident_census_core::models::{CountEntry, CountOutcome, PhraseCount, StrategyKind};
    use tempfile::TempDir;

    fn entry(label: &str, outcome: CountOutcome, expected: Option<f64>) -> CountEntry {
        CountEntry {
            label: label.to_string(),
            outcome,
            strategy_used: StrategyKind::Keyword,
            requested_strategy: StrategyKind::Generative,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap(),
            expected,
            rationale: None,
        }
    }

    fn report() -> CountReport {
        CountReport {
            generated_at: Utc::now(),
            entries: vec![
                entry("near miss", CountOutcome::Counted(4), Some(0.4)),
                entry("slip, trip", CountOutcome::Failed("HTTP 503: \"busy\"".into()), None),
            ],
        }
    }

    #[test]
    fn csv_rows_follow_the_header() {
        let csv = counts_csv(&report());
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines[0], CSV_HEADER);
        assert_eq!(
            lines[1],
            "near miss,4,keyword,2024-03-01T12:00:00+00:00,0.4,ok,"
        );
        assert_eq!(
            lines[2],
            "\"slip, trip\",,keyword,2024-03-01T12:00:00+00:00,,failed,\"HTTP 503: \"\"busy\"\"\""
        );
    }

    #[test]
    fn count_reports_land_in_a_created_directory() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().join("nested/reports");
        let files = write_count_reports(&report(), &dir).unwrap();

        let name = files.json.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("incident_counts_") && name.ends_with(".json"));
        assert_eq!(files.csv.with_extension("json"), files.json);

        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&files.json).unwrap()).unwrap();
        assert_eq!(json["near miss"]["count"], 4);
        assert_eq!(json["near miss"]["strategy"], "keyword");
        assert_eq!(json["near miss"]["requested_strategy"], "generative");
        assert_eq!(json["slip, trip"]["status"], "failed");
        assert!(json["slip, trip"]["count"].is_null());
    }

    #[test]
    fn discovery_report_is_a_term_array() {
        let tmp = TempDir::new().unwrap();
        let at = Local.with_ymd_and_hms(2024, 3, 1, 8, 30, 5).unwrap();
        let report = DiscoveryReport {
            terms: vec![PhraseCount {
                phrase: "near miss".into(),
                frequency: 4,
            }],
            documents_processed: 10,
            documents_skipped: 0,
        };
        let path = write_discovery_report(&report, tmp.path(), &at).unwrap();
        assert_eq!(
            path.file_name().unwrap().to_string_lossy(),
            "terms_discovered_20240301_083005.json"
        );
        let json: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(json, serde_json::json!([{ "phrase": "near miss", "frequency": 4 }]));
    }
}
