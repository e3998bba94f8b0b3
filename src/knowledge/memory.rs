//! 인메모리 벡터 저장소
//!
//! 전수 비교(brute-force) 코사인 검색입니다. 테스트와 소규모 코퍼스용.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::{RagError, Result};

use super::vector::{
    cosine_distance, sort_chunks, sort_hits, Chunk, DistanceHit, VectorEntry, VectorStore,
};

/// 인메모리 VectorStore 구현
pub struct InMemoryVectorStore {
    entries: RwLock<Vec<VectorEntry>>,
    dimension: usize,
}

impl InMemoryVectorStore {
    pub fn new(dimension: usize) -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
            dimension,
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn insert(&self, entries: &[VectorEntry]) -> Result<usize> {
        if let Some(bad) = entries.iter().find(|e| e.embedding.len() != self.dimension) {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: bad.embedding.len(),
            });
        }

        let mut stored = self.entries.write().await;
        stored.extend_from_slice(entries);
        Ok(entries.len())
    }

    async fn similarity_search(
        &self,
        query_embedding: &[f32],
        k: usize,
    ) -> Result<Vec<DistanceHit>> {
        if query_embedding.len() != self.dimension {
            return Err(RagError::DimensionMismatch {
                expected: self.dimension,
                actual: query_embedding.len(),
            });
        }
        if k == 0 {
            return Ok(vec![]);
        }

        let stored = self.entries.read().await;
        let mut hits: Vec<DistanceHit> = stored
            .iter()
            .map(|entry| DistanceHit {
                id: entry.id.clone(),
                chunk: entry.chunk.clone(),
                distance: cosine_distance(query_embedding, &entry.embedding),
            })
            .collect();

        sort_hits(&mut hits);
        hits.truncate(k);
        Ok(hits)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.entries.read().await.len())
    }

    async fn get_all(&self) -> Result<Vec<Chunk>> {
        let mut chunks: Vec<Chunk> = self
            .entries
            .read()
            .await
            .iter()
            .map(|e| e.chunk.clone())
            .collect();
        sort_chunks(&mut chunks);
        Ok(chunks)
    }
}

// ============================================================================
// Tests
// ============================================================================
