//! 벡터 검색기
//!
//! 질의를 임베딩하고 저장소에서 가장 가까운 K개 청크를 찾습니다.
//! 저장소의 코사인 거리는 여기서 한 번만 유사도로 바뀝니다.

use std::sync::Arc;

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

use super::vector::{distance_to_similarity, Chunk, ScoredChunk, VectorStore};

/// 검색기
#[derive(Clone)]
pub struct Retriever {
    store: Arc<dyn VectorStore>,
    embedder: Arc<dyn EmbeddingProvider>,
    /// 이 값 미만의 유사도는 제외 (None = 필터 없음)
    min_score: Option<f32>,
}

impl Retriever {
    pub fn new(store: Arc<dyn VectorStore>, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        Self {
            store,
            embedder,
            min_score: None,
        }
    }

    /// 최소 유사도 설정
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    /// 유사도 점수와 함께 검색
    ///
    /// 결과는 유사도 내림차순이며 길이는 최대 k입니다.
    /// k가 엔트리 수보다 크면 전체를 반환합니다.
    pub async fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::EmptyQuery);
        }
        if k == 0 {
            return Ok(vec![]);
        }

        let embedding = self.embedder.embed(query).await?;
        let hits = self.store.similarity_search(&embedding, k).await?;

        let results: Vec<ScoredChunk> = hits
            .into_iter()
            .map(|hit| ScoredChunk {
                chunk: hit.chunk,
                score: distance_to_similarity(hit.distance),
            })
            .filter(|r| self.min_score.map_or(true, |min| r.score >= min))
            .collect();

        tracing::debug!("Retrieved {} chunks for query ({} chars)", results.len(), query.chars().count());
        Ok(results)
    }

    /// 청크만 반환하는 검색
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        Ok(self
            .search_with_score(query, k)
            .await?
            .into_iter()
            .map(|r| r.chunk)
            .collect())
    }
}

// ============================================================================
// Tests
// ============================================================================
