//! Brute-force in-process index, used for small universes and in tests

use async_trait::async_trait;
use signal_core::{ChunkVector, ObjectType, PipelineError, VectorHit, VectorIndex};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use crate::cosine::cosine_similarity;

/// Key identifying one stored chunk vector
type VectorKey = (ObjectType, i64, i32);

/// Exact cosine search over vectors held in memory
#[derive(Default)]
pub struct InMemoryVectorIndex {
    entries: RwLock<BTreeMap<VectorKey, ChunkVector>>,
}

impl InMemoryVectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build an index from a batch of vectors. Later duplicates of the same
    /// `(object_type, object_id, chunk_index)` key replace earlier ones.
    pub fn from_vectors(vectors: impl IntoIterator<Item = ChunkVector>) -> Self {
        let entries = vectors
            .into_iter()
            .map(|v| ((v.object_type, v.object_id, v.chunk_index), v))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    pub async fn insert(&self, vector: ChunkVector) {
        let key = (vector.object_type, vector.object_id, vector.chunk_index);
        self.entries.write().await.insert(key, vector);
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(
        &self,
        query: &[f32],
        allowed: &[ObjectType],
        k: usize,
    ) -> Result<Vec<VectorHit>, PipelineError> {
        if k == 0 || allowed.is_empty() {
            return Ok(Vec::new());
        }

        let entries = self.entries.read().await;
        let mut hits: Vec<VectorHit> = entries
            .values()
            .filter(|v| allowed.contains(&v.object_type))
            .filter_map(|v| {
                cosine_similarity(query, &v.vector).map(|similarity| VectorHit {
                    object_type: v.object_type,
                    object_id: v.object_id,
                    chunk_id: v.chunk_index,
                    similarity,
                    metadata: v.metadata.clone(),
                })
            })
            .collect();

        // Stable sort keeps key order among equal similarities
        hits.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits.truncate(k);

        Ok(hits)
    }

    async fn vectors_for(
        &self,
        object_type: ObjectType,
        object_id: i64,
    ) -> Result<BTreeMap<i32, Vec<f32>>, PipelineError> {
        let entries = self.entries.read().await;
        Ok(entries
            .range((object_type, object_id, i32::MIN)..=(object_type, object_id, i32::MAX))
            .map(|((_, _, chunk), v)| (*chunk, v.vector.clone()))
            .collect())
    }

    async fn health(&self) -> Result<(), PipelineError> {
        let entries = self.entries.read().await;
        let mut dims = entries.values().map(|v| v.vector.len());
        if let Some(first) = dims.next() {
            if dims.any(|d| d != first) {
                return Err(PipelineError::Configuration(
                    "vector index holds vectors of mixed dimensions".to_string(),
                ));
            }
        }
        Ok(())
    }
}
