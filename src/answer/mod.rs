//! 답변 생성 모듈
//!
//! 검색된 청크를 컨텍스트로 하나의 프롬프트를 만들고 생성 모델에 전달합니다.
//! 대화 이력은 프롬프트에 넣지 않습니다.

use std::sync::Arc;

use serde::Serialize;

use crate::error::Result;
use crate::generation::GenerationProvider;
use crate::knowledge::ScoredChunk;

/// 컨텍스트가 없을 때 모델이 답해야 하는 문구
pub const NO_CONTEXT_ANSWER: &str = "제공된 문서에서 관련 정보를 찾지 못했습니다.";

/// 문서 기반 QA 프롬프트
const QA_PROMPT: &str = r#"당신은 PDF 문서를 근거로 질문에 답하는 도우미입니다.

아래 컨텍스트 정보를 바탕으로 사용자의 질문에 답하세요.

컨텍스트 정보:
{context}

사용자 질문: {question}

주의 사항:
1. 제공된 컨텍스트 정보만을 근거로 답하세요
2. 컨텍스트에 관련 정보가 없으면 추측하지 말고 솔직하게 관련 정보를 찾지 못했다고 말하세요
3. 정확하고 자세하며 이해하기 쉽게 답하세요
4. 필요하면 컨텍스트의 구체적인 내용을 인용해 설명하세요
5. 질문과 같은 언어로 답하세요

답변:"#;

/// 컨텍스트 자리에 들어가는 안내 (검색 결과 없음)
const EMPTY_CONTEXT: &str = "(검색된 컨텍스트가 없습니다. 다른 설명 없이 다음 문장으로만 답하세요: \"{notice}\")";

// ============================================================================
// Prompt
// ============================================================================

/// 질문과 컨텍스트 청크로 프롬프트 생성
///
/// 각 청크는 `[번호] (출처: 경로, N페이지)` 머리말과 함께 순서대로 들어갑니다.
pub fn build_prompt(question: &str, chunks: &[ScoredChunk]) -> String {
    let context = if chunks.is_empty() {
        EMPTY_CONTEXT.replace("{notice}", NO_CONTEXT_ANSWER)
    } else {
        chunks
            .iter()
            .enumerate()
            .map(|(i, r)| {
                format!(
                    "[{}] (출처: {}, {}페이지)\n{}",
                    i + 1,
                    r.chunk.metadata.source,
                    r.chunk.metadata.page,
                    r.chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    };

    QA_PROMPT
        .replace("{context}", &context)
        .replace("{question}", question.trim())
}

// ============================================================================
// Synthesizer
// ============================================================================

/// 생성된 답변과 근거 청크
#[derive(Debug, Clone, Serialize)]
pub struct Answer {
    pub text: String,
    /// 프롬프트에 들어간 순서 그대로의 근거 청크
    pub sources: Vec<ScoredChunk>,
}

/// 답변 생성기
#[derive(Clone)]
pub struct AnswerSynthesizer {
    generator: Arc<dyn GenerationProvider>,
    temperature: f32,
}

impl AnswerSynthesizer {
    pub fn new(generator: Arc<dyn GenerationProvider>, temperature: f32) -> Self {
        Self {
            generator,
            temperature,
        }
    }

    /// 질문 + 청크 → 답변
    ///
    /// 컨텍스트가 비어 있어도 모델을 호출합니다. 실패는 재시도하지 않습니다.
    pub async fn synthesize(&self, question: &str, sources: Vec<ScoredChunk>) -> Result<Answer> {
        let prompt = build_prompt(question, &sources);
        tracing::debug!(
            "Synthesizing answer from {} chunks with {}",
            sources.len(),
            self.generator.name()
        );

        let text = self.generator.generate(&prompt, self.temperature).await?;
        Ok(Answer { text, sources })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RagError;
    use crate::knowledge::{Chunk, ChunkMetadata};
    use crate::testing::{EchoGeneration, FailingGeneration};

    fn scored(text: &str, page: u32) -> ScoredChunk {
        ScoredChunk {
            chunk: Chunk {
                text: text.to_string(),
                metadata: ChunkMetadata {
                    source: "docs/book.pdf".to_string(),
                    page,
                    chunk_index: 0,
                },
            },
            score: 0.9,
        }
    }

    #[test]
    fn test_prompt_contains_labelled_context_in_order() {
        let prompt = build_prompt(
            "  자산이란?  ",
            &[scored("Assets feed you.", 12), scored("Liabilities eat you.", 3)],
        );

        let first = prompt.find("[1] (출처: docs/book.pdf, 12페이지)").unwrap();
        let second = prompt.find("[2] (출처: docs/book.pdf, 3페이지)").unwrap();
        assert!(first < second);
        assert!(prompt.contains("Liabilities eat you."));
        assert!(prompt.contains("사용자 질문: 자산이란?\n"));
        assert!(prompt.contains("컨텍스트 정보만을 근거로"));
    }

    #[test]
    fn test_empty_context_prompt_says_not_found() {
        let prompt = build_prompt("무엇?", &[]);
        assert!(prompt.contains(NO_CONTEXT_ANSWER));
        assert!(!prompt.contains("{context}"));
        assert!(!prompt.contains("[1]"));
    }

    #[tokio::test]
    async fn test_synthesize_returns_sources() {
        let generator = Arc::new(EchoGeneration::new());
        let synthesizer = AnswerSynthesizer::new(generator.clone(), 0.7);

        let answer = synthesizer
            .synthesize("질문", vec![scored("ctx", 1)])
            .await
            .unwrap();

        assert!(answer.text.starts_with("stub answer"));
        assert_eq!(answer.sources.len(), 1);
        assert_eq!(generator.calls(), 1);
        assert!(generator.last_prompt().unwrap().contains("ctx"));
    }

    #[tokio::test]
    async fn test_empty_context_still_calls_model() {
        let generator = Arc::new(EchoGeneration::new());
        let synthesizer = AnswerSynthesizer::new(generator.clone(), 0.0);

        let answer = synthesizer.synthesize("질문", vec![]).await.unwrap();
        assert!(answer.sources.is_empty());
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn test_generation_failure_propagates() {
        let synthesizer = AnswerSynthesizer::new(Arc::new(FailingGeneration), 0.7);
        let err = synthesizer.synthesize("질문", vec![]).await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailed { .. }));
    }
}
