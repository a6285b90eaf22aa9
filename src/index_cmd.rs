//! `census index`: write the corpus into the configured index.

use anyhow::Result;

use crate::backends::{self, IndexBackend};
use crate::config::Config;
use crate::corpus;

pub async fn run_index(config: &Config) -> Result<()> {
    let store = corpus::load_corpus(&config.corpus)?;
    if store.is_empty() {
        println!(
            "No documents matched in {}; nothing to index.",
            config.corpus.root.display()
        );
        return Ok(());
    }

    let backend = IndexBackend::open(config).await?;
    let index = backend.shared();
    let policy = config.retry.policy();
    backend.sync(&index, &store, &policy).await?;
    let total = backends::document_count(&index, &policy).await?;
    backend.close().await;

    println!(
        "Indexed {} documents into '{}' ({} in index).",
        store.len(),
        index.name(),
        total
    );
    Ok(())
}
