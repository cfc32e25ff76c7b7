//! Semantic retrieval over embedded chunks.
//!
//! `RetrievalIndex` pairs an [`Embedder`] with a [`VectorIndex`] backend.
//! Reads run concurrently; every mutation takes the writer gate so a search
//! never observes a half-replaced document.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::RwLock;

use super::chunker::Chunk;
use super::store::{IndexedVector, SourceFilter, VectorIndex};
use crate::core::errors::{with_deadline, Collaborator, CollaboratorError, FailureKind, RagError};
use crate::llm::Embedder;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub content: String,
    pub source: String,
    pub chunk_index: usize,
    /// Cosine similarity, `1 - distance`.
    pub score: f32,
}

/// Decides whether a named source still exists outside the index.
pub trait SourceLiveness: Send + Sync {
    fn is_live(&self, source: &str) -> bool;
}

impl<F> SourceLiveness for F
where
    F: Fn(&str) -> bool + Send + Sync,
{
    fn is_live(&self, source: &str) -> bool {
        self(source)
    }
}

/// A source is live while its uploaded file is still on disk.
#[derive(Debug, Clone)]
pub struct UploadDirLiveness {
    dir: PathBuf,
}

impl UploadDirLiveness {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl SourceLiveness for UploadDirLiveness {
    fn is_live(&self, source: &str) -> bool {
        // Only the final component counts; "../x" must not escape the dir.
        match Path::new(source).file_name() {
            Some(name) => self.dir.join(name).is_file(),
            None => false,
        }
    }
}

pub struct RetrievalIndex {
    embedder: Arc<dyn Embedder>,
    store: Arc<dyn VectorIndex>,
    writer: RwLock<()>,
    timeout: Duration,
}

impl RetrievalIndex {
    pub fn new(embedder: Arc<dyn Embedder>, store: Arc<dyn VectorIndex>, timeout: Duration) -> Self {
        Self {
            embedder,
            store,
            writer: RwLock::new(()),
            timeout,
        }
    }

    /// Embeds all chunks in one call and upserts them. Returns the number of
    /// vectors written.
    pub async fn add(&self, chunks: Vec<Chunk>) -> Result<usize, RagError> {
        if chunks.is_empty() {
            return Ok(0);
        }
        let items = self.embed_chunks(chunks).await?;
        let count = items.len();

        let _gate = self.writer.write().await;
        self.call_store(self.store.upsert(items)).await?;
        tracing::debug!("Indexed {} chunks", count);
        Ok(count)
    }

    /// Swaps the whole chunk set of `source` for `chunks`.
    pub async fn replace(&self, source: &str, chunks: Vec<Chunk>) -> Result<usize, RagError> {
        let items = self.embed_chunks(chunks).await?;
        let count = items.len();
        let filter = SourceFilter::Exact(source.to_string());

        let _gate = self.writer.write().await;
        let removed = self.call_store(self.store.delete_where(&filter)).await?;
        if !items.is_empty() {
            self.call_store(self.store.upsert(items)).await?;
        }
        tracing::debug!(
            "Replaced {} chunks of '{}' with {}",
            removed.len(),
            source,
            count
        );
        Ok(count)
    }

    pub async fn search(
        &self,
        query: &str,
        limit: usize,
        source_filter: Option<&[String]>,
        liveness: Option<&dyn SourceLiveness>,
    ) -> Result<Vec<SearchResult>, RagError> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let filter = match source_filter {
            Some(names) if !names.is_empty() => {
                let live: Vec<String> = names
                    .iter()
                    .filter(|name| liveness.map_or(true, |check| check.is_live(name)))
                    .cloned()
                    .collect();
                if live.is_empty() {
                    // Every requested source is gone; searching everything
                    // instead would leak unrelated documents.
                    tracing::info!("All {} requested sources are gone", names.len());
                    return Ok(Vec::new());
                }
                SourceFilter::from_sources(&live)
            }
            _ => None,
        };

        let embedding = self.embed_query(query).await?;
        let fetch = if liveness.is_some() {
            limit.saturating_mul(2)
        } else {
            limit
        };

        let matches = {
            let _gate = self.writer.read().await;
            self.call_store(self.store.query(&embedding, fetch, filter.as_ref()))
                .await?
        };

        let results: Vec<SearchResult> = matches
            .into_iter()
            .filter(|m| liveness.map_or(true, |check| check.is_live(&m.chunk.source)))
            .take(limit)
            .map(|m| SearchResult {
                content: m.chunk.content,
                source: m.chunk.source,
                chunk_index: m.chunk.index,
                score: 1.0 - m.distance,
            })
            .collect();

        tracing::debug!("Search returned {} results (limit {})", results.len(), limit);
        Ok(results)
    }

    /// Deletes every vector of `source`; returns how many were removed.
    pub async fn remove(&self, source: &str) -> Result<usize, RagError> {
        let filter = SourceFilter::Exact(source.to_string());
        let _gate = self.writer.write().await;
        let removed = self.call_store(self.store.delete_where(&filter)).await?;
        Ok(removed.len())
    }

    pub async fn list(&self) -> Result<BTreeSet<String>, RagError> {
        Ok(self.call_store(self.store.sources()).await?)
    }

    pub async fn clear(&self) -> Result<usize, RagError> {
        let _gate = self.writer.write().await;
        Ok(self.call_store(self.store.clear()).await?)
    }

    pub async fn count(&self) -> Result<usize, RagError> {
        Ok(self.call_store(self.store.count()).await?)
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<IndexedVector>, RagError> {
        if chunks.is_empty() {
            return Ok(Vec::new());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.content.clone()).collect();
        let embeddings = self.embed(&texts).await?;

        Ok(chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedVector::new(chunk, embedding))
            .collect())
    }

    async fn embed_query(&self, query: &str) -> Result<Vec<f32>, RagError> {
        let mut vectors = self.embed(&[query.to_string()]).await?;
        Ok(vectors.pop().unwrap_or_default())
    }

    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let vectors = with_deadline(
            Collaborator::Embedder,
            self.timeout,
            self.embedder.encode(texts),
        )
        .await?;

        if vectors.len() != texts.len() {
            return Err(CollaboratorError::new(
                Collaborator::Embedder,
                FailureKind::BadResponse,
                format!("expected {} vectors, got {}", texts.len(), vectors.len()),
            )
            .into());
        }
        Ok(vectors)
    }

    async fn call_store<T, F>(&self, call: F) -> Result<T, CollaboratorError>
    where
        F: std::future::Future<Output = Result<T, CollaboratorError>>,
    {
        with_deadline(Collaborator::VectorIndex, self.timeout, call).await
    }
}
