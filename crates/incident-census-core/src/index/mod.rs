//! Index handles.
//!
//! [`SharedIndex`] puts any [`RetrievalIndex`] behind a single-writer
//! gate: any number of queries may run together, but a rebuild waits for
//! in-flight queries and blocks new ones until it finishes, so no query
//! ever sees a half-written index.

mod memory;

pub use memory::{normalize_score, InMemoryIndex};

use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::Result;
use crate::models::{Document, RetrievalResult};
use crate::providers::RetrievalIndex;

#[derive(Clone)]
pub struct SharedIndex {
    inner: Arc<dyn RetrievalIndex>,
    gate: Arc<RwLock<()>>,
}

impl SharedIndex {
    pub fn new(inner: Arc<dyn RetrievalIndex>) -> Self {
        Self {
            inner,
            gate: Arc::new(RwLock::new(())),
        }
    }

    pub fn name(&self) -> &str {
        self.inner.name()
    }

    /// Index `documents` under the write guard.
    pub async fn rebuild(&self, documents: &[Document]) -> Result<()> {
        let _guard = self.gate.write().await;
        tracing::info!(
            index = self.inner.name(),
            documents = documents.len(),
            "indexing documents"
        );
        self.inner.index(documents).await
    }

    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        strictness: f64,
    ) -> Result<Vec<RetrievalResult>> {
        let _guard = self.gate.read().await;
        self.inner.query(text, top_k, strictness).await
    }

    pub async fn document_count(&self) -> Result<usize> {
        let _guard = self.gate.read().await;
        self.inner.document_count().await
    }
}

impl std::fmt::Debug for SharedIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedIndex")
            .field("index", &self.inner.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use async_trait::async_trait;

    /// Index whose `index` call is slow, to widen the race window.
    struct SlowIndex {
        memory: InMemoryIndex,
    }

    #[async_trait]
    impl RetrievalIndex for SlowIndex {
        fn name(&self) -> &str {
            "slow"
        }

        async fn index(&self, documents: &[Document]) -> Result<()> {
            for doc in documents {
                self.memory.index(std::slice::from_ref(doc)).await?;
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            Ok(())
        }

        async fn query(
            &self,
            text: &str,
            top_k: usize,
            strictness: f64,
        ) -> Result<Vec<RetrievalResult>> {
            self.memory.query(text, top_k, strictness).await
        }

        async fn document_count(&self) -> Result<usize> {
            self.memory.document_count().await
        }
    }

    #[tokio::test]
    async fn queries_never_observe_a_partial_rebuild() {
        let shared = SharedIndex::new(Arc::new(SlowIndex {
            memory: InMemoryIndex::new(),
        }));
        let docs: Vec<Document> = (0..5)
            .map(|i| Document::new(format!("d{i}"), "near miss on the stairs"))
            .collect();

        let writer = {
            let shared = shared.clone();
            let docs = docs.clone();
            tokio::spawn(async move { shared.rebuild(&docs).await })
        };
        tokio::time::sleep(Duration::from_millis(1)).await;

        let hits = shared.query("near miss", 10, 0.0).await.unwrap();
        assert!(hits.is_empty() || hits.len() == 5, "saw {} hits", hits.len());

        writer.await.unwrap().unwrap();
        assert_eq!(shared.document_count().await.unwrap(), 5);
    }
}
