//! 임베딩 모듈 - Ollama API를 통한 텍스트 벡터화
//!
//! 텍스트를 벡터로 변환하는 Ollama 임베딩 프로바이더입니다.
//! 인덱스 구축과 질의 시점에 반드시 같은 모델을 사용해야 합니다.
//!
//! ## 사용법
//! ```rust,ignore
//! let embedder = OllamaEmbedding::from_config(&config)?;
//! let embedding = embedder.embed("Hello, world!").await?;
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::error::{RagError, Result};

// ============================================================================
// EmbeddingProvider Trait
// ============================================================================

/// 임베딩 프로바이더 트레이트
///
/// 텍스트를 벡터로 변환하는 인터페이스입니다.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// 단일 텍스트 임베딩
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// 배치 임베딩 (기본 구현: 순차 호출)
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// 임베딩 차원 수
    fn dimension(&self) -> usize;

    /// 모델 이름 (인덱스 매니페스트에 기록됨)
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Embedding
// ============================================================================

/// nomic-embed-text 기본 차원
pub const DEFAULT_DIMENSION: usize = 768;

/// Ollama 임베딩 구현체
///
/// source: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-embeddings
#[derive(Debug, Clone)]
pub struct OllamaEmbedding {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    dimension: usize,
}

impl OllamaEmbedding {
    /// 새 Ollama 임베딩 인스턴스 생성
    ///
    /// # Arguments
    /// * `base_url` - Ollama 서버 주소 (예: http://localhost:11434)
    /// * `model` - 임베딩 모델 이름
    /// * `dimension` - 모델이 반환하는 벡터 차원
    pub fn new(base_url: &str, model: &str, dimension: usize, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/embed", base_url.trim_end_matches('/')),
            model: model.to_string(),
            dimension,
        }
    }

    /// 설정에서 생성
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(config)?;
        Ok(Self::new(
            &config.ollama_url,
            &config.embedding_model,
            config.embedding_dimension,
            client,
        ))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn unavailable(&self, message: impl Into<String>) -> RagError {
        RagError::EmbeddingServiceUnavailable {
            model: self.model.clone(),
            message: message.into(),
        }
    }

    /// `/api/embed` 호출 (입력 여러 개를 한 번에)
    async fn request(&self, input: Vec<String>) -> Result<Vec<Vec<f32>>> {
        let expected = input.len();
        let request = EmbedRequest {
            model: &self.model,
            input,
        };

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.unavailable(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.unavailable(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(self.unavailable(format!("HTTP {}: {}", status, message)));
        }

        let parsed: EmbedResponse = serde_json::from_str(&body)
            .map_err(|e| self.unavailable(format!("failed to parse embedding response: {}", e)))?;

        if parsed.embeddings.len() != expected {
            return Err(self.unavailable(format!(
                "expected {} embeddings, got {}",
                expected,
                parsed.embeddings.len()
            )));
        }

        for embedding in &parsed.embeddings {
            if embedding.len() != self.dimension {
                return Err(RagError::DimensionMismatch {
                    expected: self.dimension,
                    actual: embedding.len(),
                });
            }
        }

        Ok(parsed.embeddings)
    }
}

/// Ollama 요청 본문
#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: Vec<String>,
}

/// Ollama 응답
#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Ollama 에러 응답
#[derive(Debug, Deserialize)]
pub(crate) struct OllamaError {
    pub(crate) error: String,
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        // 빈 텍스트 처리
        if text.trim().is_empty() {
            return Ok(vec![0.0; self.dimension]);
        }

        let mut embeddings = self.request(vec![text.to_string()]).await?;
        embeddings
            .pop()
            .ok_or_else(|| self.unavailable("empty embedding response"))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(vec![]);
        }
        tracing::debug!("Embedding batch of {} texts with {}", texts.len(), self.model);
        self.request(texts.to_vec()).await
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// Factory Function
// ============================================================================

/// 타임아웃이 설정된 HTTP 클라이언트 생성
pub(crate) fn build_http_client(config: &Config) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(config.request_timeout())
        .build()
        .map_err(|e| RagError::InvalidConfig(format!("failed to create HTTP client: {}", e)))
}

/// 임베딩 프로바이더 생성 (Ollama)
pub fn create_embedder(config: &Config) -> Result<OllamaEmbedding> {
    let embedder = OllamaEmbedding::from_config(config)?;
    tracing::info!(
        "Using Ollama embedding {} (dimension: {})",
        embedder.name(),
        embedder.dimension()
    );
    Ok(embedder)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_from_config() {
        let config = Config {
            ollama_url: "http://127.0.0.1:11434/".to_string(),
            ..Default::default()
        };
        let embedder = OllamaEmbedding::from_config(&config).unwrap();
        assert_eq!(embedder.endpoint(), "http://127.0.0.1:11434/api/embed");
        assert_eq!(embedder.name(), "nomic-embed-text");
        assert_eq!(embedder.dimension(), DEFAULT_DIMENSION);
    }

    #[tokio::test]
    async fn test_empty_text_returns_zero_vector() {
        let embedder =
            OllamaEmbedding::new("http://127.0.0.1:9", "m", 4, reqwest::Client::new());
        let v = embedder.embed("   ").await.unwrap();
        assert_eq!(v, vec![0.0; 4]);
    }

    #[tokio::test]
    async fn test_unreachable_service_is_unavailable() {
        // 포트 9 (discard) 에는 Ollama가 없음
        let embedder =
            OllamaEmbedding::new("http://127.0.0.1:9", "m", 4, reqwest::Client::new());
        let err = embedder.embed("hello").await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingServiceUnavailable { .. }));
    }

    #[test]
    fn test_request_serialization() {
        let request = EmbedRequest {
            model: "nomic-embed-text",
            input: vec!["a".to_string(), "b".to_string()],
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["model"], "nomic-embed-text");
        assert_eq!(json["input"][1], "b");
    }
}
