//! 에러 타입
//!
//! 라이브러리 계층은 `RagError`를 반환하고, CLI 계층은 `anyhow`로 감싸서 출력합니다.
//! 어떤 에러도 재시도하지 않으며, 세션 드라이버는 턴 단위로 에러를 잡습니다.

use std::path::PathBuf;

use thiserror::Error;

/// RAG 파이프라인 에러
#[derive(Debug, Error)]
pub enum RagError {
    /// 문서 디렉토리가 없거나 PDF가 하나도 없음
    #[error("No PDF documents found in {dir:?}")]
    NoDocumentsFound { dir: PathBuf },

    /// PDF는 있지만 추출된 텍스트가 없음 (스캔 문서 등)
    #[error("No text could be extracted from the {documents} PDF(s) in {dir:?}")]
    NoTextExtracted { dir: PathBuf, documents: usize },

    /// 벡터 인덱스가 아직 생성되지 않음
    #[error("Vector index not found at {path:?}")]
    IndexNotFound { path: PathBuf },

    /// 인덱스 디렉토리는 있지만 읽을 수 없음
    #[error("Vector index at {path:?} is corrupt: {reason}")]
    IndexCorrupt { path: PathBuf, reason: String },

    #[error("Embedding service unavailable ({model}): {message}")]
    EmbeddingServiceUnavailable { model: String, message: String },

    /// 인덱스를 만든 임베딩 모델과 현재 설정이 다름
    #[error("Index was built with embedding model '{indexed}', but '{configured}' is configured")]
    EmbeddingModelMismatch { indexed: String, configured: String },

    #[error("Embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Generation failed ({model}): {message}")]
    GenerationFailed { model: String, message: String },

    #[error("Query is empty")]
    EmptyQuery,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to extract text from {path:?}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("Vector store error: {0}")]
    VectorStore(String),

    #[error("Manifest error: {0}")]
    Manifest(#[from] rusqlite::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl RagError {
    /// 사용자에게 보여줄 안내 문구
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            RagError::NoDocumentsFound { .. } => {
                Some("문서 디렉토리에 PDF 파일을 넣은 뒤 다시 실행하세요.")
            }
            RagError::NoTextExtracted { .. } => {
                Some("스캔된 PDF는 텍스트 레이어가 없어 색인할 수 없습니다.")
            }
            RagError::IndexNotFound { .. } => {
                Some("먼저 `pdf-rag ingest` 를 실행해 지식베이스를 구축하세요.")
            }
            RagError::IndexCorrupt { .. } | RagError::EmbeddingModelMismatch { .. } => {
                Some("`pdf-rag ingest` 로 인덱스를 다시 구축하세요.")
            }
            RagError::EmbeddingServiceUnavailable { .. } => {
                Some("Ollama가 실행 중인지, 임베딩 모델이 설치되어 있는지 확인하세요 (ollama pull nomic-embed-text).")
            }
            RagError::GenerationFailed { .. } => {
                Some("Ollama가 실행 중인지, 언어 모델이 설치되어 있는지 확인하세요 (ollama pull llama3.1).")
            }
            RagError::EmptyQuery => Some("유효한 질문을 입력하세요."),
            _ => None,
        }
    }
}

/// RAG 작업용 Result 타입
pub type Result<T> = std::result::Result<T, RagError>;
