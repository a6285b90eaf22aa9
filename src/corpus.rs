//! Load the incident-report corpus from a directory.
//!
//! Walks `[corpus].root`, keeps files matching the include globs and not
//! matching the exclude globs, and turns each into a [`Document`] whose
//! id is the URL-safe base64 encoding of its relative path without the
//! extension. Search services only accept URL-safe keys, and the same
//! file always gets the same id.

use std::path::Path;

use anyhow::{Context, Result};
use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use globset::{Glob, GlobSet, GlobSetBuilder};
use incident_census_core::models::Document;
use incident_census_core::store::DocumentStore;
use incident_census_core::CensusError;
use walkdir::WalkDir;

use crate::config::CorpusConfig;

/// Document id for a corpus-relative path: `reports/0001.txt` → base64 of
/// `reports/0001`.
pub fn document_id(relative_path: &str) -> String {
    let stem = match relative_path.rfind('.') {
        Some(dot) if !relative_path[dot..].contains('/') && dot > 0 => &relative_path[..dot],
        _ => relative_path,
    };
    URL_SAFE.encode(stem.as_bytes())
}

pub fn load_corpus(config: &CorpusConfig) -> Result<DocumentStore> {
    let root = &config.root;
    if !root.is_dir() {
        return Err(CensusError::Corpus(format!(
            "corpus root does not exist or is not a directory: {}",
            root.display()
        ))
        .into());
    }

    let include_set = build_globset(&config.include_globs)?;
    let mut excludes = vec!["**/.git/**".to_string()];
    excludes.extend(config.exclude_globs.iter().cloned());
    let exclude_set = build_globset(&excludes)?;

    let mut documents = Vec::new();
    for entry in WalkDir::new(root).follow_links(config.follow_symlinks) {
        let entry = entry.map_err(|e| CensusError::Corpus(format!("failed to walk corpus: {e}")))?;
        if !entry.file_type().is_file() {
            continue;
        }

        let path = entry.path();
        let relative = path.strip_prefix(root).unwrap_or(path);
        let rel_str = relative.to_string_lossy().replace('\\', "/");
        if exclude_set.is_match(&rel_str) || !include_set.is_match(&rel_str) {
            continue;
        }

        match read_document(path, &rel_str) {
            Ok(doc) => documents.push(doc),
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "skipping unreadable file"),
        }
    }

    documents.sort_by(|a, b| a.id.cmp(&b.id));
    tracing::info!(root = %root.display(), documents = documents.len(), "corpus loaded");
    Ok(DocumentStore::from_documents(documents)?)
}

fn read_document(path: &Path, relative_path: &str) -> Result<Document> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Document::new(document_id(relative_path), text.trim()).with_metadata(
        serde_json::json!({ "path": relative_path }),
    ))
}

fn build_globset(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|e| {
            CensusError::Configuration(format!("invalid glob pattern '{pattern}': {e}"))
        })?;
        builder.add(glob);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn corpus_config(root: &Path) -> CorpusConfig {
        CorpusConfig {
            root: root.to_path_buf(),
            include_globs: vec!["**/*.txt".to_string()],
            exclude_globs: vec![],
            follow_symlinks: false,
        }
    }

    #[test]
    fn ids_are_url_safe_base64_of_the_stem() {
        assert_eq!(document_id("incident_001.txt"), "aW5jaWRlbnRfMDAx");
        assert_eq!(document_id("a/b.txt"), URL_SAFE.encode("a/b"));
        assert_eq!(document_id("noext"), URL_SAFE.encode("noext"));
        assert!(!document_id("??>>.txt").contains('+'));
    }

    #[test]
    fn loads_matching_files_and_trims_text() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("one.txt"), "  Near miss at dock.\n").unwrap();
        fs::write(tmp.path().join("two.txt"), "Scaffolding fell.").unwrap();
        fs::write(tmp.path().join("notes.md"), "ignored").unwrap();

        let store = load_corpus(&corpus_config(tmp.path())).unwrap();
        assert_eq!(store.len(), 2);
        let one = store.get(&document_id("one.txt")).unwrap();
        assert_eq!(one.text, "Near miss at dock.");
        assert_eq!(one.metadata.as_ref().unwrap()["path"], "one.txt");
    }

    #[test]
    fn exclude_globs_apply() {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("drafts")).unwrap();
        fs::write(tmp.path().join("keep.txt"), "keep").unwrap();
        fs::write(tmp.path().join("drafts/skip.txt"), "skip").unwrap();

        let mut cfg = corpus_config(tmp.path());
        cfg.exclude_globs = vec!["drafts/**".to_string()];
        let store = load_corpus(&cfg).unwrap();
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn missing_root_is_a_corpus_error() {
        let tmp = TempDir::new().unwrap();
        let err = load_corpus(&corpus_config(&tmp.path().join("nope"))).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CensusError>(),
            Some(CensusError::Corpus(_))
        ));
    }

    #[test]
    fn same_stem_with_different_extensions_collide() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("a.txt"), "one").unwrap();
        fs::write(tmp.path().join("a.log"), "two").unwrap();
        let mut cfg = corpus_config(tmp.path());
        cfg.include_globs = vec!["**/*".to_string()];
        let err = load_corpus(&cfg).unwrap_err();
        assert!(err.to_string().contains("duplicate document id"));
    }
}
