//! Local [`RetrievalIndex`] on SQLite FTS5.
//!
//! Documents live in a `documents` table keyed by id with a SHA-256 of
//! their content; the searchable text lives in the `documents_fts`
//! virtual table. Re-indexing an unchanged document is a no-op and a
//! changed one replaces its FTS row, so `census index` can be re-run
//! freely.
//!
//! Queries are issued as FTS5 phrase queries, so a multi-word label like
//! `near miss` only matches those words adjacent and in order. FTS5's
//! `bm25` rank is negative (lower is better); `-rank` is mapped into
//! `[0, 1)` by [`normalize_score`].

use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Result as AnyResult;
use async_trait::async_trait;
use incident_census_core::index::normalize_score;
use incident_census_core::models::{sort_results, Document, RetrievalResult};
use incident_census_core::providers::RetrievalIndex;
use incident_census_core::{CensusError, Result};
use sha2::{Digest, Sha256};
use sqlx::{Row, SqlitePool};

use crate::{db, migrate};

pub struct SqliteIndex {
    pool: SqlitePool,
}

impl SqliteIndex {
    /// Open the database at `path` and make sure the schema exists.
    pub async fn open(path: &Path) -> AnyResult<Self> {
        let pool = db::connect(path).await?;
        migrate::run_migrations(&pool).await?;
        Ok(Self { pool })
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }

    /// Ids currently in the index.
    pub async fn ids(&self) -> Result<BTreeSet<String>> {
        let rows = sqlx::query("SELECT id FROM documents")
            .fetch_all(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(rows.iter().map(|r| r.get::<String, _>("id")).collect())
    }

    /// Delete documents whose id is not in `keep`. Returns how many went.
    pub async fn prune(&self, keep: &BTreeSet<String>) -> Result<usize> {
        let stale: Vec<String> = self.ids().await?.difference(keep).cloned().collect();
        if stale.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        for id in &stale {
            sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            sqlx::query("DELETE FROM documents WHERE id = ?")
                .bind(id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
        }
        tx.commit().await.map_err(db_error)?;
        tracing::info!(removed = stale.len(), "pruned documents no longer in the corpus");
        Ok(stale.len())
    }
}

fn content_hash(text: &str) -> String {
    format!("{:x}", Sha256::digest(text.as_bytes()))
}

fn db_error(e: sqlx::Error) -> CensusError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => CensusError::index_transient(e.to_string()),
        sqlx::Error::Database(ref db) if db.message().contains("locked") => {
            CensusError::index_transient(e.to_string())
        }
        other => CensusError::index(other.to_string()),
    }
}

/// Quote `text` as a single FTS5 phrase. `None` when it has no
/// searchable characters.
pub fn phrase_query(text: &str) -> Option<String> {
    if !text.chars().any(char::is_alphanumeric) {
        return None;
    }
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    Some(format!("\"{}\"", collapsed.replace('"', "\"\"")))
}

#[async_trait]
impl RetrievalIndex for SqliteIndex {
    fn name(&self) -> &str {
        "sqlite"
    }

    async fn index(&self, documents: &[Document]) -> Result<()> {
        if documents.is_empty() {
            return Err(CensusError::index("refusing to index an empty batch"));
        }

        let now = chrono::Utc::now().timestamp();
        let mut tx = self.pool.begin().await.map_err(db_error)?;
        let mut written = 0usize;

        for doc in documents {
            let hash = content_hash(&doc.text);
            let existing: Option<String> =
                sqlx::query_scalar("SELECT content_hash FROM documents WHERE id = ?")
                    .bind(&doc.id)
                    .fetch_optional(&mut *tx)
                    .await
                    .map_err(db_error)?;
            if existing.as_deref() == Some(hash.as_str()) {
                continue;
            }

            let metadata = doc
                .metadata
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| "{}".to_string());
            sqlx::query(
                r#"
                INSERT INTO documents (id, content, content_hash, metadata_json, indexed_at)
                VALUES (?, ?, ?, ?, ?)
                ON CONFLICT(id) DO UPDATE SET
                    content = excluded.content,
                    content_hash = excluded.content_hash,
                    metadata_json = excluded.metadata_json,
                    indexed_at = excluded.indexed_at
                "#,
            )
            .bind(&doc.id)
            .bind(&doc.text)
            .bind(&hash)
            .bind(&metadata)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(db_error)?;

            sqlx::query("DELETE FROM documents_fts WHERE document_id = ?")
                .bind(&doc.id)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            sqlx::query("INSERT INTO documents_fts (document_id, content) VALUES (?, ?)")
                .bind(&doc.id)
                .bind(&doc.text)
                .execute(&mut *tx)
                .await
                .map_err(db_error)?;
            written += 1;
        }

        tx.commit().await.map_err(db_error)?;
        tracing::info!(
            written,
            unchanged = documents.len() - written,
            "sqlite index updated"
        );
        Ok(())
    }

    async fn query(
        &self,
        text: &str,
        top_k: usize,
        strictness: f64,
    ) -> Result<Vec<RetrievalResult>> {
        let Some(fts_query) = phrase_query(text) else {
            return Ok(Vec::new());
        };
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let rows = sqlx::query(
            r#"
            SELECT document_id, rank,
                   snippet(documents_fts, 1, '>>>', '<<<', '...', 24) AS snippet
            FROM documents_fts
            WHERE documents_fts MATCH ?
            ORDER BY rank
            LIMIT ?
            "#,
        )
        .bind(&fts_query)
        .bind(i64::try_from(top_k).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await
        .map_err(db_error)?;

        let mut results: Vec<RetrievalResult> = rows
            .iter()
            .map(|row| {
                let rank: f64 = row.get("rank");
                RetrievalResult {
                    document_id: row.get("document_id"),
                    score: normalize_score(-rank),
                    snippet: row.get("snippet"),
                }
            })
            .filter(|r| r.score >= strictness)
            .collect();
        sort_results(&mut results);
        tracing::debug!(query = %fts_query, hits = results.len(), "sqlite query");
        Ok(results)
    }

    async fn document_count(&self) -> Result<usize> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM documents")
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;
        Ok(n as usize)
    }
}
