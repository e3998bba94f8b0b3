//! 생성 모듈 - Ollama 텍스트 생성
//!
//! 프롬프트를 언어 모델에 전달하고 응답 텍스트를 받습니다.
//! 단일 호출이며 실패 시 재시도하지 않습니다.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::embedding::{build_http_client, OllamaError};
use crate::error::{RagError, Result};

// ============================================================================
// GenerationProvider Trait
// ============================================================================

/// 텍스트 생성 프로바이더 트레이트
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// 프롬프트로 응답 생성
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String>;

    /// 모델 이름
    fn name(&self) -> &str;
}

// ============================================================================
// Ollama Generation
// ============================================================================

/// Ollama `/api/generate` 구현체
///
/// source: https://github.com/ollama/ollama/blob/main/docs/api.md#generate-a-completion
#[derive(Debug, Clone)]
pub struct OllamaGeneration {
    client: reqwest::Client,
    endpoint: String,
    model: String,
}

impl OllamaGeneration {
    pub fn new(base_url: &str, model: &str, client: reqwest::Client) -> Self {
        Self {
            client,
            endpoint: format!("{}/api/generate", base_url.trim_end_matches('/')),
            model: model.to_string(),
        }
    }

    /// 설정에서 생성
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = build_http_client(config)?;
        Ok(Self::new(&config.ollama_url, &config.generation_model, client))
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn failed(&self, message: impl Into<String>) -> RagError {
        RagError::GenerationFailed {
            model: self.model.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl GenerationProvider for OllamaGeneration {
    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions { temperature },
        };

        tracing::debug!(
            "Generating with {} (prompt: {} chars, temperature: {})",
            self.model,
            prompt.chars().count(),
            temperature
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| self.failed(format!("request to {} failed: {}", self.endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.failed(format!("failed to read response body: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<OllamaError>(&body)
                .map(|e| e.error)
                .unwrap_or(body);
            return Err(self.failed(format!("HTTP {}: {}", status, message)));
        }

        let parsed: GenerateResponse = serde_json::from_str(&body)
            .map_err(|e| self.failed(format!("failed to parse response: {}", e)))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            tracing::warn!("Model {} returned an empty response", self.model);
        }

        Ok(text)
    }

    fn name(&self) -> &str {
        &self.model
    }
}

// ============================================================================
// API Types
// ============================================================================

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

// ============================================================================
// Tests
// ============================================================================
