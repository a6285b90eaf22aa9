//! The batch of documents for one run.

use std::collections::HashMap;

use crate::error::{CensusError, Result};
use crate::models::Document;

/// Owns every [`Document`] of a run. Indices and strategies refer to
/// documents by id and resolve them here.
#[derive(Debug, Clone, Default)]
pub struct DocumentStore {
    documents: Vec<Document>,
    by_id: HashMap<String, usize>,
}

impl DocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store, rejecting duplicate ids.
    pub fn from_documents(documents: Vec<Document>) -> Result<Self> {
        let mut store = Self::new();
        for doc in documents {
            store.insert(doc)?;
        }
        Ok(store)
    }

    pub fn insert(&mut self, doc: Document) -> Result<()> {
        if self.by_id.contains_key(&doc.id) {
            return Err(CensusError::Corpus(format!(
                "duplicate document id: {}",
                doc.id
            )));
        }
        self.by_id.insert(doc.id.clone(), self.documents.len());
        self.documents.push(doc);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Document> {
        self.by_id.get(id).map(|&i| &self.documents[i])
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn iter(&self) -> impl Iterator<Item = &Document> {
        self.documents.iter()
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
