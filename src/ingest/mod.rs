//! Document ingestion: load, chunk, and index uploaded documents.
//!
//! Mutations of one source are serialized through a per-source async lock so
//! a placeholder and the full chunk set it is later swapped for never
//! interleave with another upload of the same name.

mod loader;

pub use loader::{validate_batch, validate_file, DocumentLoader, FileLoader, SUPPORTED_EXTENSIONS};

use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::core::errors::{LoadError, RagError};
use crate::rag::{Chunk, Chunker, RetrievalIndex, SourceLiveness, UploadDirLiveness};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemovedDocument {
    pub source: String,
    pub chunks_deleted: usize,
    pub file_deleted: bool,
}

#[derive(Clone)]
pub struct DocumentIngestor {
    chunker: Chunker,
    index: Arc<RetrievalIndex>,
    loader: Arc<dyn DocumentLoader>,
    upload_dir: PathBuf,
    locks: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl DocumentIngestor {
    pub fn new(
        chunker: Chunker,
        index: Arc<RetrievalIndex>,
        loader: Arc<dyn DocumentLoader>,
        upload_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            chunker,
            index,
            loader,
            upload_dir: upload_dir.into(),
            locks: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn upload_dir(&self) -> &Path {
        &self.upload_dir
    }

    pub fn liveness(&self) -> UploadDirLiveness {
        UploadDirLiveness::new(self.upload_dir.clone())
    }

    /// Chunks `text` and makes it the complete content of `source`.
    pub async fn ingest_text(&self, source: &str, text: &str) -> Result<usize, RagError> {
        let chunks = self.chunker.chunk(text, source);
        if chunks.is_empty() {
            return Err(LoadError::NoText(source.to_string()).into());
        }

        let lock = self.source_lock(source).await;
        let replaced = {
            let _guard = lock.lock().await;
            self.index.replace(source, chunks).await
        };
        self.release_lock(source, lock).await;
        let count = replaced?;
        tracing::info!("Indexed '{}' ({} chunks)", source, count);
        Ok(count)
    }

    /// Loads a file through the document loader and indexes it under its file
    /// name.
    pub async fn ingest_file(&self, path: &Path) -> Result<usize, RagError> {
        let source = source_name(path)?;
        let text = self.load(path).await?;
        self.ingest_text(&source, &text).await
    }

    /// Makes `source` visible immediately with a single placeholder chunk,
    /// then loads and indexes the file in the background. The final chunk
    /// set replaces the placeholder in one step; on failure the placeholder
    /// is removed.
    pub async fn ingest_with_placeholder(
        &self,
        source: &str,
        path: &Path,
    ) -> Result<JoinHandle<Result<usize, RagError>>, RagError> {
        let placeholder = Chunk::new(
            format!("Document '{}' is still being processed.", source),
            source,
            0,
        );
        let lock = self.source_lock(source).await;
        let indexed = {
            let _guard = lock.lock().await;
            self.index.replace(source, vec![placeholder]).await
        };
        self.release_lock(source, lock).await;
        indexed?;
        tracing::debug!("Placeholder indexed for '{}'", source);

        let this = self.clone();
        let source = source.to_string();
        let path = path.to_path_buf();
        Ok(tokio::spawn(async move {
            let loaded = this.load(&path).await;
            let result = match loaded {
                Ok(text) => this.ingest_text(&source, &text).await,
                Err(err) => Err(err),
            };

            if let Err(err) = &result {
                tracing::warn!("Background processing of '{}' failed: {}", source, err);
                let lock = this.source_lock(&source).await;
                {
                    let _guard = lock.lock().await;
                    if let Err(cleanup) = this.index.remove(&source).await {
                        tracing::warn!("Failed to drop placeholder for '{}': {}", source, cleanup);
                    }
                }
                this.release_lock(&source, lock).await;
            }
            result
        }))
    }

    /// Deletes the chunks of `source` and its uploaded file, if any.
    pub async fn remove(&self, source: &str) -> Result<RemovedDocument, RagError> {
        let lock = self.source_lock(source).await;
        let removed = {
            let _guard = lock.lock().await;
            self.remove_locked(source).await
        };
        self.release_lock(source, lock).await;
        let (chunks_deleted, file_deleted) = removed?;

        tracing::info!(
            "Removed '{}' ({} chunks, file deleted: {})",
            source,
            chunks_deleted,
            file_deleted
        );
        Ok(RemovedDocument {
            source: source.to_string(),
            chunks_deleted,
            file_deleted,
        })
    }

    /// Indexed sources whose upload still exists. Orphans are purged from the
    /// index as a side effect.
    pub async fn list_live_documents(&self) -> Result<BTreeSet<String>, RagError> {
        let liveness = self.liveness();
        let (live, orphans): (BTreeSet<String>, BTreeSet<String>) = self
            .index
            .list()
            .await?
            .into_iter()
            .partition(|source| liveness.is_live(source));

        for orphan in &orphans {
            tracing::info!("Cleaning up orphaned document: {}", orphan);
            let lock = self.source_lock(orphan).await;
            let removed = {
                let _guard = lock.lock().await;
                self.index.remove(orphan).await
            };
            self.release_lock(orphan, lock).await;
            removed?;
        }
        Ok(live)
    }

    async fn remove_locked(&self, source: &str) -> Result<(usize, bool), RagError> {
        let chunks_deleted = self.index.remove(source).await?;
        let file_deleted = match self.upload_path(source) {
            Some(path) if path.is_file() => match tokio::fs::remove_file(&path).await {
                Ok(()) => true,
                Err(err) => {
                    tracing::warn!("Failed to delete {}: {}", path.display(), err);
                    false
                }
            },
            _ => false,
        };
        Ok((chunks_deleted, file_deleted))
    }

    fn upload_path(&self, source: &str) -> Option<PathBuf> {
        Path::new(source)
            .file_name()
            .map(|name| self.upload_dir.join(name))
    }

    async fn load(&self, path: &Path) -> Result<String, RagError> {
        let loader = self.loader.clone();
        let path = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || loader.load(&path))
            .await
            .map_err(|err| LoadError::Io(std::io::Error::other(err.to_string())))??;
        Ok(text)
    }

    async fn source_lock(&self, source: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        locks
            .entry(source.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Drops the map entry for `source` once no other task holds or waits
    /// on its lock. Callers pass their own clone back in.
    async fn release_lock(&self, source: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().await;
        if Arc::strong_count(&lock) == 2 {
            locks.remove(source);
        }
    }
}

fn source_name(path: &Path) -> Result<String, RagError> {
    path.file_name()
        .and_then(|name| name.to_str())
        .map(str::to_string)
        .ok_or_else(|| RagError::validation(format!("Invalid document path: {}", path.display())))
}
