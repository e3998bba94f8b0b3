//! Vector Store - 벡터 검색 트레이트 및 데이터 타입
//!
//! 점수 규약: 저장소는 코사인 *거리* (0.0 ~ 2.0, 낮을수록 유사)를 반환하고,
//! `Retriever`가 이를 한 번만 유사도 (`1 - 거리`)로 변환합니다.

use std::cmp::Ordering;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================================================
// Types
// ============================================================================

/// 청크 메타데이터
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// 원본 PDF 경로
    pub source: String,
    /// 페이지 번호 (1부터 시작)
    pub page: u32,
    /// 페이지 내 청크 순번 (0부터 시작)
    pub chunk_index: u32,
}

/// 텍스트 청크 (생성 후 불변)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub text: String,
    pub metadata: ChunkMetadata,
}

/// 벡터 엔트리 (저장용)
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// 삽입 시 부여되는 불투명 ID (UUID v4)
    pub id: String,
    pub chunk: Chunk,
    /// 임베딩 벡터
    pub embedding: Vec<f32>,
}

impl VectorEntry {
    /// 새 ID로 엔트리 생성
    pub fn new(chunk: Chunk, embedding: Vec<f32>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            chunk,
            embedding,
        }
    }
}

/// 저장소 검색 결과 (거리 기준)
#[derive(Debug, Clone)]
pub struct DistanceHit {
    pub id: String,
    pub chunk: Chunk,
    /// 코사인 거리 (0.0 = 동일 방향)
    pub distance: f32,
}

/// 검색 결과 (유사도 기준)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    /// 코사인 유사도 (높을수록 유사, 1.0 = 동일 방향)
    pub score: f32,
}

// ============================================================================
// VectorStore Trait
// ============================================================================

/// VectorStore 트레이트 (async)
///
/// 벡터 저장소의 공통 인터페이스입니다. 이 시스템에서는 추가 전용이며
/// 수정/삭제 경로가 없습니다.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// 벡터 배치 삽입
    async fn insert(&self, entries: &[VectorEntry]) -> Result<usize>;

    /// 코사인 거리 오름차순으로 최대 k개 반환 (동점은 ID 순)
    async fn similarity_search(&self, query_embedding: &[f32], k: usize)
        -> Result<Vec<DistanceHit>>;

    /// 벡터 개수 조회
    async fn count(&self) -> Result<usize>;

    /// 저장된 모든 청크 (임베딩 제외)
    async fn get_all(&self) -> Result<Vec<Chunk>>;
}

// ============================================================================
// Utility Functions
// ============================================================================

/// 코사인 유사도 계산
///
/// 결과는 -1.0 ~ 1.0 범위입니다. 길이가 다르거나 영벡터면 0.0.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot_product: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot_product / (norm_a * norm_b)
}

/// 코사인 거리 (LanceDB `DistanceType::Cosine`과 같은 정의)
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    1.0 - cosine_similarity(a, b)
}

/// 거리 → 유사도
pub fn distance_to_similarity(distance: f32) -> f32 {
    1.0 - distance
}

/// 거리 오름차순, 동점은 ID 순으로 정렬
pub(crate) fn sort_hits(hits: &mut [DistanceHit]) {
    hits.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.id.cmp(&b.id))
    });
}

/// 출처 → 페이지 → 청크 순번으로 정렬
pub(crate) fn sort_chunks(chunks: &mut [Chunk]) {
    chunks.sort_by(|a, b| {
        a.metadata
            .source
            .cmp(&b.metadata.source)
            .then(a.metadata.page.cmp(&b.metadata.page))
            .then(a.metadata.chunk_index.cmp(&b.metadata.chunk_index))
    });
}

// ============================================================================
// Tests
// ============================================================================
