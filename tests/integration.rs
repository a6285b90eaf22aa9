use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn census_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("census");
    path
}

const REPORTS: &[(&str, &str)] = &[
    ("incident_001.txt", "There was a near miss at the loading dock."),
    ("incident_002.txt", "Worker reported a near miss with a forklift."),
    ("incident_003.txt", "Scaffolding collapse on level two."),
    ("incident_004.txt", "Near miss: falling tools from scaffolding."),
    ("incident_005.txt", "Slip on wet floor near the entrance."),
    ("incident_006.txt", "Scaffolding inspection overdue."),
];

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let corpus_dir = root.join("corpus");
    fs::create_dir_all(&corpus_dir).unwrap();
    for (name, text) in REPORTS {
        fs::write(corpus_dir.join(name), text).unwrap();
    }
    // Not matched by the default include glob.
    fs::write(corpus_dir.join("notes.md"), "near miss near miss near miss").unwrap();

    fs::write(
        config_dir.join("incident_type_distribution.json"),
        r#"{"near miss": 0.5, "scaffolding": 0.3}"#,
    )
    .unwrap();

    let config_content = format!(
        r#"[corpus]
root = "{root}/corpus"

[incident_types]
path = "{root}/config/incident_type_distribution.json"

[[incident_types.inline]]
label = "wet floor"

[index]
provider = "sqlite"
path = "{root}/data/census.sqlite"

[phrases]
provider = "local"

[generative]
provider = "disabled"

[retry]
base_delay_ms = 1

[reports]
dir = "{root}/reports"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("census.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_census(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = census_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run census binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn files_with_prefix(dir: &Path, prefix: &str) -> Vec<PathBuf> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .filter(|p| {
            p.file_name()
                .map(|n| n.to_string_lossy().starts_with(prefix))
                .unwrap_or(false)
        })
        .collect();
    files.sort();
    files
}

#[test]
fn test_index_loads_corpus() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_census(&config_path, &["index"]);
    assert!(success, "index failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Indexed 6 documents"), "stdout: {}", stdout);
    assert!(tmp.path().join("data/census.sqlite").exists());
}

#[test]
fn test_index_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, first) = run_census(&config_path, &["index"]);
    assert!(first, "First index failed");

    let (stdout, _, second) = run_census(&config_path, &["index"]);
    assert!(second, "Second index failed");
    assert!(stdout.contains("(6 in index)"), "stdout: {}", stdout);
}

#[test]
fn test_count_keyword() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_census(&config_path, &["count", "near miss", "--strategy", "keyword"]);
    assert!(success, "count failed: stdout={}, stderr={}", stdout, stderr);
    assert!(
        stdout.contains("Total count for 'near miss' incidents: 3"),
        "stdout: {}",
        stdout
    );
}

#[test]
fn test_count_generative_falls_back_without_provider() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_census(&config_path, &["count", "scaffolding"]);
    assert!(success, "count failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Total count for 'scaffolding' incidents: 3"));
    assert!(stderr.contains("falling back to keyword"), "stderr: {}", stderr);
}

#[test]
fn test_count_phrase_strategy() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_census(&config_path, &["count", "near miss", "--strategy", "phrase"]);
    assert!(success, "count failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Total count for 'near miss' incidents: 3"));
}

#[test]
fn test_count_unknown_strategy_fails() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) =
        run_census(&config_path, &["count", "near miss", "--strategy", "semantic"]);
    assert!(!success, "unknown strategy should fail");
    assert!(stderr.contains("semantic"), "stderr: {}", stderr);
}

#[test]
fn test_count_all_writes_reports() {
    let (tmp, config_path) = setup_test_env();
    let out = tmp.path().join("out");

    let (stdout, stderr, success) = run_census(
        &config_path,
        &["count-all", "--strategy", "keyword", "--output", out.to_str().unwrap()],
    );
    assert!(success, "count-all failed: stdout={}, stderr={}", stdout, stderr);

    let json_files = files_with_prefix(&out, "incident_counts_");
    let json_path = json_files
        .iter()
        .find(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .expect("JSON report written");
    let csv_path = json_path.with_extension("csv");
    assert!(csv_path.exists(), "CSV report next to JSON report");

    let report: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(json_path).unwrap()).unwrap();
    assert_eq!(report["near miss"]["count"], 3);
    assert_eq!(report["scaffolding"]["count"], 3);
    assert_eq!(report["wet floor"]["count"], 1);
    assert_eq!(report["near miss"]["strategy"], "keyword");
    assert_eq!(report["near miss"]["status"], "ok");
    assert_eq!(report["near miss"]["expected"], 0.5);

    let csv = fs::read_to_string(&csv_path).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines[0], "label,count,strategy,timestamp,expected,status,error");
    assert_eq!(lines.len(), 4);
    assert!(lines[1].starts_with("near miss,3,keyword,"));
    assert!(lines[3].starts_with("wet floor,1,keyword,"));
}

#[test]
fn test_discover_excludes_known_types() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_census(&config_path, &["discover", "--top", "3"]);
    assert!(success, "discover failed: stdout={}, stderr={}", stdout, stderr);
    assert!(!stdout.contains("near miss"), "stdout: {}", stdout);

    let files = files_with_prefix(&tmp.path().join("reports"), "terms_discovered_");
    assert_eq!(files.len(), 1);
    let terms: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&files[0]).unwrap()).unwrap();
    let terms = terms.as_array().unwrap();
    assert_eq!(terms.len(), 3);
    assert_eq!(terms[0]["phrase"], "entrance");
    assert_eq!(terms[0]["frequency"], 1);
    assert!(terms
        .iter()
        .all(|t| t["phrase"] != "near miss" && t["phrase"] != "scaffolding"));
}

#[test]
fn test_types_lists_configured_types() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_census(&config_path, &["types"]);
    assert!(success, "types failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("near miss"));
    assert!(stdout.contains("0.5"));
    assert!(stdout.contains("wet floor"));
    assert!(stdout.contains("3 incident types"));
}

#[test]
fn test_invalid_config_fails() {
    let (_tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap();
    fs::write(&config_path, format!("{content}\n[counting]\nstrictness = 2.0\n")).unwrap();

    let (_, stderr, success) = run_census(&config_path, &["types"]);
    assert!(!success, "invalid config should fail");
    assert!(stderr.contains("strictness"), "stderr: {}", stderr);
}

#[test]
fn test_missing_credential_fails_before_indexing() {
    let (tmp, config_path) = setup_test_env();
    let content = fs::read_to_string(&config_path).unwrap().replace(
        "[generative]\nprovider = \"disabled\"",
        "[generative]\nprovider = \"openai\"\nmodel = \"gpt-4o-mini\"\napi_key_env = \"CENSUS_IT_UNSET_KEY\"",
    );
    fs::write(&config_path, content).unwrap();

    let (_, stderr, success) =
        run_census(&config_path, &["count", "near miss", "--strategy", "generative"]);
    assert!(!success, "missing credential should fail");
    assert!(stderr.contains("CENSUS_IT_UNSET_KEY"), "stderr: {}", stderr);
    assert!(!stderr.contains("index updated"), "stderr: {}", stderr);
    assert!(!tmp.path().join("data/census.sqlite").exists());
}

#[test]
fn test_missing_corpus_fails() {
    let (tmp, config_path) = setup_test_env();
    fs::remove_dir_all(tmp.path().join("corpus")).unwrap();

    let (_, stderr, success) = run_census(&config_path, &["count", "near miss"]);
    assert!(!success, "missing corpus should fail");
    assert!(stderr.contains("corpus"), "stderr: {}", stderr);
}
