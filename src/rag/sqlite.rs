//! SQLite-backed vector index.
//!
//! Chunk text and metadata live in ordinary columns, embeddings as
//! little-endian `f32` blobs. Search is brute-force cosine distance over the
//! rows that pass the source filter.

use std::collections::BTreeSet;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use super::chunker::Chunk;
use super::store::{cosine_distance, IndexedVector, SourceFilter, VectorIndex, VectorMatch};
use crate::core::config::AppPaths;
use crate::core::errors::{Collaborator, CollaboratorError};

fn index_error(err: sqlx::Error) -> CollaboratorError {
    CollaboratorError::other(Collaborator::VectorIndex, err)
}

pub struct SqliteVectorIndex {
    pool: SqlitePool,
    db_path: PathBuf,
}

impl SqliteVectorIndex {
    pub async fn new(paths: &AppPaths) -> Result<Self, CollaboratorError> {
        Self::with_path(paths.index_db_path.clone()).await
    }

    pub async fn with_path(db_path: PathBuf) -> Result<Self, CollaboratorError> {
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal);

        let pool = SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(4)
            .connect_with(options)
            .await
            .map_err(index_error)?;

        let index = Self { pool, db_path };
        index.init_schema().await?;
        Ok(index)
    }

    pub fn db_path(&self) -> &PathBuf {
        &self.db_path
    }

    async fn init_schema(&self) -> Result<(), CollaboratorError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS chunk_vectors (
                vector_id TEXT PRIMARY KEY,
                content TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                created_at TEXT NOT NULL,
                embedding BLOB NOT NULL
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(index_error)?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chunk_vectors_source ON chunk_vectors(source)")
            .execute(&self.pool)
            .await
            .map_err(index_error)?;

        Ok(())
    }

    fn serialize_embedding(embedding: &[f32]) -> Vec<u8> {
        embedding.iter().flat_map(|f| f.to_le_bytes()).collect()
    }

    fn deserialize_embedding(bytes: &[u8]) -> Vec<f32> {
        bytes
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    fn row_to_chunk(row: &SqliteRow) -> Chunk {
        let created_at: String = row.get("created_at");
        let created_at = DateTime::parse_from_rfc3339(&created_at)
            .map(|ts| ts.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now());
        let index: i64 = row.get("chunk_index");

        Chunk {
            content: row.get("content"),
            source: row.get("source"),
            index: index.max(0) as usize,
            created_at,
        }
    }

    fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &SourceFilter) {
        match filter {
            SourceFilter::Exact(source) => {
                builder.push(" WHERE source = ").push_bind(source.clone());
            }
            SourceFilter::AnyOf(sources) => {
                builder.push(" WHERE source IN (");
                let mut separated = builder.separated(", ");
                for source in sources {
                    separated.push_bind(source.clone());
                }
                separated.push_unseparated(")");
            }
        }
    }
}

#[async_trait]
impl VectorIndex for SqliteVectorIndex {
    async fn upsert(&self, items: Vec<IndexedVector>) -> Result<(), CollaboratorError> {
        if items.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await.map_err(index_error)?;

        for item in &items {
            let blob = Self::serialize_embedding(&item.embedding);
            sqlx::query(
                "INSERT OR REPLACE INTO chunk_vectors
                    (vector_id, content, source, chunk_index, created_at, embedding)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )
            .bind(&item.id)
            .bind(&item.chunk.content)
            .bind(&item.chunk.source)
            .bind(item.chunk.index as i64)
            .bind(item.chunk.created_at.to_rfc3339())
            .bind(&blob)
            .execute(&mut *tx)
            .await
            .map_err(index_error)?;
        }

        tx.commit().await.map_err(index_error)?;
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<VectorMatch>, CollaboratorError> {
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut builder = QueryBuilder::<Sqlite>::new(
            "SELECT vector_id, content, source, chunk_index, created_at, embedding FROM chunk_vectors",
        );
        if let Some(filter) = filter {
            Self::push_filter(&mut builder, filter);
        }
        let rows = builder
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(index_error)?;

        let mut scored: Vec<VectorMatch> = rows
            .iter()
            .filter_map(|row| {
                let bytes: Vec<u8> = row.get("embedding");
                if bytes.is_empty() {
                    return None;
                }
                let stored = Self::deserialize_embedding(&bytes);
                Some(VectorMatch {
                    id: row.get("vector_id"),
                    chunk: Self::row_to_chunk(row),
                    distance: cosine_distance(embedding, &stored),
                })
            })
            .collect();

        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        scored.truncate(k);

        Ok(scored)
    }

    async fn delete_where(&self, filter: &SourceFilter) -> Result<Vec<String>, CollaboratorError> {
        let mut tx = self.pool.begin().await.map_err(index_error)?;

        let mut select = QueryBuilder::<Sqlite>::new("SELECT vector_id FROM chunk_vectors");
        Self::push_filter(&mut select, filter);
        let ids: Vec<String> = select
            .build()
            .fetch_all(&mut *tx)
            .await
            .map_err(index_error)?
            .iter()
            .map(|row| row.get("vector_id"))
            .collect();

        let mut delete = QueryBuilder::<Sqlite>::new("DELETE FROM chunk_vectors");
        Self::push_filter(&mut delete, filter);
        delete
            .build()
            .execute(&mut *tx)
            .await
            .map_err(index_error)?;

        tx.commit().await.map_err(index_error)?;
        Ok(ids)
    }

    async fn count(&self) -> Result<usize, CollaboratorError> {
        let row = sqlx::query("SELECT COUNT(*) AS cnt FROM chunk_vectors")
            .fetch_one(&self.pool)
            .await
            .map_err(index_error)?;
        let count: i64 = row.get("cnt");
        Ok(count.max(0) as usize)
    }

    async fn sources(&self) -> Result<BTreeSet<String>, CollaboratorError> {
        let rows = sqlx::query("SELECT DISTINCT source FROM chunk_vectors")
            .fetch_all(&self.pool)
            .await
            .map_err(index_error)?;
        Ok(rows.iter().map(|row| row.get("source")).collect())
    }

    async fn clear(&self) -> Result<usize, CollaboratorError> {
        let result = sqlx::query("DELETE FROM chunk_vectors")
            .execute(&self.pool)
            .await
            .map_err(index_error)?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn open_index() -> (tempfile::TempDir, SqliteVectorIndex) {
        let dir = tempfile::tempdir().expect("tempdir");
        let index = SqliteVectorIndex::with_path(dir.path().join("index.db"))
            .await
            .expect("open index");
        (dir, index)
    }

    fn vector(source: &str, index: usize, embedding: Vec<f32>) -> IndexedVector {
        IndexedVector::new(Chunk::new(format!("{source} #{index}"), source, index), embedding)
    }

    #[tokio::test]
    async fn query_orders_by_distance_and_respects_filter() {
        let (_dir, index) = open_index().await;
        index
            .upsert(vec![
                vector("a.txt", 0, vec![1.0, 0.0]),
                vector("a.txt", 1, vec![0.0, 1.0]),
                vector("b.txt", 0, vec![0.9, 0.1]),
            ])
            .await
            .expect("upsert");

        let hits = index.query(&[1.0, 0.0], 3, None).await.expect("query");
        let ids: Vec<&str> = hits.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["a.txt_0", "b.txt_0", "a.txt_1"]);
        assert!(hits[0].distance < 1e-5);

        let filter = SourceFilter::Exact("b.txt".to_string());
        let hits = index
            .query(&[1.0, 0.0], 3, Some(&filter))
            .await
            .expect("filtered query");
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].chunk.source, "b.txt");
    }

    #[tokio::test]
    async fn upsert_replaces_by_id_and_delete_reports_ids() {
        let (_dir, index) = open_index().await;
        index
            .upsert(vec![vector("a.txt", 0, vec![1.0, 0.0])])
            .await
            .expect("first upsert");
        index
            .upsert(vec![vector("a.txt", 0, vec![0.0, 1.0]), vector("c.txt", 0, vec![1.0, 1.0])])
            .await
            .expect("second upsert");
        assert_eq!(index.count().await.expect("count"), 2);

        let filter = SourceFilter::AnyOf(vec!["a.txt".to_string(), "missing".to_string()]);
        let deleted = index.delete_where(&filter).await.expect("delete");
        assert_eq!(deleted, vec!["a.txt_0".to_string()]);

        let sources = index.sources().await.expect("sources");
        assert_eq!(sources.into_iter().collect::<Vec<_>>(), vec!["c.txt".to_string()]);
        assert_eq!(index.clear().await.expect("clear"), 1);
        assert_eq!(index.count().await.expect("count"), 0);
    }
}
