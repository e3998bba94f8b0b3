//! pdf-rag - 로컬 PDF 질의응답 RAG 시스템
//!
//! PDF를 페이지 단위로 추출·분할해 LanceDB에 임베딩으로 저장하고,
//! 질문과 가장 가까운 청크를 근거로 Ollama 모델이 답변합니다.

pub mod answer;
pub mod cli;
pub mod collector;
pub mod config;
pub mod context;
pub mod embedding;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod knowledge;
pub mod session;

#[cfg(test)]
mod testing;

// Re-exports
pub use answer::{build_prompt, Answer, AnswerSynthesizer};
pub use config::Config;
pub use context::{IndexState, IndexStats, RagContext};
pub use embedding::{create_embedder, EmbeddingProvider, OllamaEmbedding};
pub use error::{RagError, Result};
pub use extractor::{extract_pages, PageText};
pub use generation::{GenerationProvider, OllamaGeneration};
pub use knowledge::{
    Chunk, ChunkConfig, ChunkMetadata, Chunker, InMemoryVectorStore, IngestReport, Ingestor,
    LanceVectorStore, RecursiveChunker, Retriever, ScoredChunk, VectorEntry, VectorStore,
};
pub use session::{ChatSession, Conversation, Message, Role, SessionCommand};
