//! In-process vector index for tests and ephemeral sessions.

use std::collections::{BTreeSet, HashMap};

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::store::{cosine_distance, IndexedVector, SourceFilter, VectorIndex, VectorMatch};
use crate::core::errors::CollaboratorError;

#[derive(Default)]
pub struct MemoryVectorIndex {
    items: RwLock<HashMap<String, IndexedVector>>,
}

impl MemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl VectorIndex for MemoryVectorIndex {
    async fn upsert(&self, items: Vec<IndexedVector>) -> Result<(), CollaboratorError> {
        let mut guard = self.items.write().await;
        for item in items {
            guard.insert(item.id.clone(), item);
        }
        Ok(())
    }

    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<VectorMatch>, CollaboratorError> {
        let guard = self.items.read().await;
        let mut scored: Vec<VectorMatch> = guard
            .values()
            .filter(|item| filter.map_or(true, |f| f.matches(&item.chunk.source)))
            .map(|item| VectorMatch {
                id: item.id.clone(),
                chunk: item.chunk.clone(),
                distance: cosine_distance(embedding, &item.embedding),
            })
            .collect();

        // Ties fall back to id order so results are deterministic.
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn delete_where(&self, filter: &SourceFilter) -> Result<Vec<String>, CollaboratorError> {
        let mut guard = self.items.write().await;
        let mut ids: Vec<String> = guard
            .values()
            .filter(|item| filter.matches(&item.chunk.source))
            .map(|item| item.id.clone())
            .collect();
        ids.sort();
        for id in &ids {
            guard.remove(id);
        }
        Ok(ids)
    }

    async fn count(&self) -> Result<usize, CollaboratorError> {
        Ok(self.items.read().await.len())
    }

    async fn sources(&self) -> Result<BTreeSet<String>, CollaboratorError> {
        Ok(self
            .items
            .read()
            .await
            .values()
            .map(|item| item.chunk.source.clone())
            .collect())
    }

    async fn clear(&self) -> Result<usize, CollaboratorError> {
        let mut guard = self.items.write().await;
        let removed = guard.len();
        guard.clear();
        Ok(removed)
    }
}
