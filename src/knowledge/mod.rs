//! Knowledge 모듈 - PDF 벡터 지식베이스
//!
//! - Chunker: 재귀 문자 분할 (페이지 단위)
//! - LanceDB: 코사인 거리 벡터 검색
//! - Manifest: SQLite에 인덱스 빌드 정보와 문서 목록 기록
//! - Ingest: 전부 아니면 전무 방식의 인덱스 구축
//! - Retriever: 질의 임베딩 → 상위 K개 청크

mod chunker;
mod ingest;
mod lance;
mod manifest;
mod memory;
mod retriever;
mod vector;

/// 인덱스 디렉토리 안의 LanceDB 경로
pub const LANCE_DIR_NAME: &str = "vectors.lance";

/// 인덱스 디렉토리 안의 매니페스트 파일
pub const MANIFEST_FILE_NAME: &str = "manifest.db";

// Re-exports
pub use chunker::{recursive_chunker, ChunkConfig, Chunker, RecursiveChunker};
pub use ingest::{IngestReport, Ingestor, SourceDocument};
pub use lance::LanceVectorStore;
pub use manifest::{DocumentRecord, IndexManifest, ManifestStore};
pub use memory::InMemoryVectorStore;
pub use retriever::Retriever;
pub use vector::{
    cosine_distance, cosine_similarity, distance_to_similarity, Chunk, ChunkMetadata,
    DistanceHit, ScoredChunk, VectorEntry, VectorStore,
};
