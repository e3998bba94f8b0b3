//! 설정 모듈
//!
//! 기본값 → 환경변수 → CLI 플래그 순서로 덮어씁니다.
//!
//! | 환경변수 | 필드 |
//! |---|---|
//! | `PDF_RAG_DOCS_DIR` | `docs_dir` |
//! | `PDF_RAG_INDEX_DIR` | `index_dir` |
//! | `OLLAMA_BASE_URL` / `OLLAMA_HOST` | `ollama_url` |
//! | `PDF_RAG_EMBED_MODEL` | `embedding_model` |
//! | `PDF_RAG_EMBED_DIM` | `embedding_dimension` |
//! | `PDF_RAG_CHAT_MODEL` | `generation_model` |
//! | `PDF_RAG_TEMPERATURE` | `temperature` |
//! | `PDF_RAG_TOP_K` | `top_k` |
//! | `PDF_RAG_CHUNK_SIZE` | `chunk_size` |
//! | `PDF_RAG_CHUNK_OVERLAP` | `chunk_overlap` |

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// 기본 Ollama 엔드포인트
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// 기본 임베딩 모델
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

/// 기본 생성 모델
pub const DEFAULT_GENERATION_MODEL: &str = "llama3.1:latest";

/// 허용되는 temperature 상한
pub const MAX_TEMPERATURE: f32 = 2.0;

/// 전체 설정
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Config {
    /// PDF 문서 디렉토리 (재귀 탐색)
    pub docs_dir: PathBuf,
    /// 벡터 인덱스 디렉토리 (존재 여부로 인덱스 상태 판단)
    pub index_dir: PathBuf,
    /// Ollama 서버 주소
    pub ollama_url: String,
    pub embedding_model: String,
    /// 임베딩 차원 (nomic-embed-text: 768)
    pub embedding_dimension: usize,
    pub generation_model: String,
    /// 생성 temperature (0.0 ~ 2.0)
    pub temperature: f32,
    /// 기본 검색 결과 수
    pub top_k: usize,
    /// 청크 최대 길이 (문자 수)
    pub chunk_size: usize,
    /// 청크 간 오버랩 (문자 수)
    pub chunk_overlap: usize,
    /// 한 번에 임베딩할 청크 수
    pub embed_batch_size: usize,
    /// HTTP 요청 타임아웃 (초)
    pub request_timeout_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            docs_dir: PathBuf::from("./docs"),
            index_dir: PathBuf::from("./vector_db"),
            ollama_url: DEFAULT_OLLAMA_URL.to_string(),
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            embedding_dimension: crate::embedding::DEFAULT_DIMENSION,
            generation_model: DEFAULT_GENERATION_MODEL.to_string(),
            temperature: 0.7,
            top_k: 3,
            chunk_size: 1000,
            chunk_overlap: 100,
            embed_batch_size: 32,
            request_timeout_secs: 120,
        }
    }
}

impl Config {
    /// 기본값 위에 환경변수를 적용
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(dir) = env_var("PDF_RAG_DOCS_DIR") {
            config.docs_dir = PathBuf::from(dir);
        }
        if let Some(dir) = env_var("PDF_RAG_INDEX_DIR") {
            config.index_dir = PathBuf::from(dir);
        }
        if let Some(url) = env_var("OLLAMA_BASE_URL").or_else(|| env_var("OLLAMA_HOST")) {
            config.ollama_url = normalize_base_url(&url);
        }
        if let Some(model) = env_var("PDF_RAG_EMBED_MODEL") {
            config.embedding_model = model;
        }
        if let Some(v) = parse_env("PDF_RAG_EMBED_DIM")? {
            config.embedding_dimension = v;
        }
        if let Some(model) = env_var("PDF_RAG_CHAT_MODEL") {
            config.generation_model = model;
        }
        if let Some(v) = parse_env("PDF_RAG_TEMPERATURE")? {
            config.temperature = v;
        }
        if let Some(v) = parse_env("PDF_RAG_TOP_K")? {
            config.top_k = v;
        }
        if let Some(v) = parse_env("PDF_RAG_CHUNK_SIZE")? {
            config.chunk_size = v;
        }
        if let Some(v) = parse_env("PDF_RAG_CHUNK_OVERLAP")? {
            config.chunk_overlap = v;
        }

        Ok(config)
    }

    /// 설정 값 검증
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(RagError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::InvalidConfig(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if !(0.0..=MAX_TEMPERATURE).contains(&self.temperature) {
            return Err(RagError::InvalidConfig(format!(
                "temperature ({}) must be within 0.0..={}",
                self.temperature, MAX_TEMPERATURE
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(RagError::InvalidConfig(
                "embedding_dimension must be greater than zero".to_string(),
            ));
        }
        if self.embed_batch_size == 0 {
            return Err(RagError::InvalidConfig(
                "embed_batch_size must be greater than zero".to_string(),
            ));
        }
        let url = url::Url::parse(&self.ollama_url).map_err(|e| {
            RagError::InvalidConfig(format!("invalid Ollama URL '{}': {}", self.ollama_url, e))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RagError::InvalidConfig(format!(
                "Ollama URL must use http or https: '{}'",
                self.ollama_url
            )));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// LanceDB 데이터 경로
    pub fn lance_path(&self) -> PathBuf {
        self.index_dir.join(crate::knowledge::LANCE_DIR_NAME)
    }

    /// 매니페스트 DB 경로
    pub fn manifest_path(&self) -> PathBuf {
        self.index_dir.join(crate::knowledge::MANIFEST_FILE_NAME)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn env_var(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_env<T: FromStr>(key: &str) -> Result<Option<T>> {
    match env_var(key) {
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| RagError::InvalidConfig(format!("{key}='{raw}' is not a valid value"))),
        None => Ok(None),
    }
}

/// `OLLAMA_HOST=127.0.0.1:11434` 처럼 스킴이 없는 값을 보정
pub(crate) fn normalize_base_url(raw: &str) -> String {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.starts_with("http://") || trimmed.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("http://{}", trimmed)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 1000);
        assert_eq!(config.chunk_overlap, 100);
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn test_overlap_must_be_smaller_than_size() {
        let config = Config {
            chunk_size: 100,
            chunk_overlap: 100,
            ..Default::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(err, RagError::InvalidConfig(_)));
    }

    #[test]
    fn test_temperature_bounds() {
        let hot = Config {
            temperature: 2.5,
            ..Default::default()
        };
        assert!(hot.validate().is_err());

        let cold = Config {
            temperature: 0.0,
            ..Default::default()
        };
        assert!(cold.validate().is_ok());
    }

    #[test]
    fn test_invalid_url() {
        let config = Config {
            ollama_url: "not a url".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_http_scheme() {
        let config = Config {
            ollama_url: "localhost:11434".to_string(),
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(RagError::InvalidConfig(_))));
    }

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(normalize_base_url("127.0.0.1:11434"), "http://127.0.0.1:11434");
        assert_eq!(
            normalize_base_url("https://ollama.local/"),
            "https://ollama.local"
        );
    }

    #[test]
    fn test_index_paths() {
        let config = Config {
            index_dir: PathBuf::from("/tmp/idx"),
            ..Default::default()
        };
        assert_eq!(config.lance_path(), PathBuf::from("/tmp/idx/vectors.lance"));
        assert_eq!(config.manifest_path(), PathBuf::from("/tmp/idx/manifest.db"));
    }
}
