//! VectorIndex trait: abstract interface for vector storage backends.
//!
//! Implementations: `SqliteVectorIndex` (persistent) and `MemoryVectorIndex`
//! (ephemeral). Distances are cosine distances, so `1 - distance` is the
//! cosine similarity.

use std::collections::BTreeSet;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::chunker::Chunk;
use crate::core::errors::CollaboratorError;

/// One stored vector together with the chunk it was computed from.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexedVector {
    /// `source + "_" + index`.
    pub id: String,
    pub embedding: Vec<f32>,
    pub chunk: Chunk,
}

impl IndexedVector {
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: chunk.vector_id(),
            embedding,
            chunk,
        }
    }
}

/// A k-NN hit. Lower distance means more similar.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub chunk: Chunk,
    pub distance: f32,
}

/// Metadata filter on the `source` field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFilter {
    Exact(String),
    AnyOf(Vec<String>),
}

impl SourceFilter {
    /// Exact match for a single name, set membership for several, `None`
    /// for an empty list.
    pub fn from_sources(sources: &[String]) -> Option<Self> {
        match sources {
            [] => None,
            [single] => Some(SourceFilter::Exact(single.clone())),
            many => Some(SourceFilter::AnyOf(many.to_vec())),
        }
    }

    pub fn matches(&self, source: &str) -> bool {
        match self {
            SourceFilter::Exact(name) => name == source,
            SourceFilter::AnyOf(names) => names.iter().any(|name| name == source),
        }
    }
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Inserts or replaces vectors by id.
    async fn upsert(&self, items: Vec<IndexedVector>) -> Result<(), CollaboratorError>;

    /// Returns up to `k` nearest vectors, ascending by distance.
    async fn query(
        &self,
        embedding: &[f32],
        k: usize,
        filter: Option<&SourceFilter>,
    ) -> Result<Vec<VectorMatch>, CollaboratorError>;

    /// Deletes every vector matching `filter`, returning the deleted ids.
    async fn delete_where(&self, filter: &SourceFilter) -> Result<Vec<String>, CollaboratorError>;

    async fn count(&self) -> Result<usize, CollaboratorError>;

    /// Distinct source names currently stored.
    async fn sources(&self) -> Result<BTreeSet<String>, CollaboratorError>;

    /// Removes everything, returning the number of deleted vectors.
    async fn clear(&self) -> Result<usize, CollaboratorError>;
}

/// Cosine distance in `[0, 2]`; degenerate vectors are treated as orthogonal.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    let denom = norm_a * norm_b;

    if denom <= f32::EPSILON {
        1.0
    } else {
        1.0 - (dot / denom).clamp(-1.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(left: f32, right: f32) -> bool {
        (left - right).abs() < 1e-5
    }

    #[test]
    fn distance_is_zero_for_identical_vectors() {
        let vec = vec![1.0, 2.0, 3.0, 4.0];
        assert!(approx_eq(cosine_distance(&vec, &vec), 0.0));
    }

    #[test]
    fn distance_is_one_for_orthogonal_or_degenerate_vectors() {
        assert!(approx_eq(cosine_distance(&[1.0, 0.0], &[0.0, 1.0]), 1.0));
        assert!(approx_eq(cosine_distance(&[0.0, 0.0], &[0.0, 1.0]), 1.0));
        assert!(approx_eq(cosine_distance(&[1.0], &[1.0, 0.0]), 1.0));
    }

    #[test]
    fn filter_shape_follows_source_count() {
        assert_eq!(SourceFilter::from_sources(&[]), None);
        assert_eq!(
            SourceFilter::from_sources(&["a.pdf".to_string()]),
            Some(SourceFilter::Exact("a.pdf".to_string()))
        );
        let many = SourceFilter::from_sources(&["a".to_string(), "b".to_string()])
            .expect("two sources");
        assert!(many.matches("b"));
        assert!(!many.matches("c"));
    }
}
