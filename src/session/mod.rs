//! 대화 세션
//!
//! 대화형 루프의 턴 처리와 입력 해석을 담당합니다.
//! 턴 단위 에러는 대화에 에러 표시 항목으로 남기고 세션은 계속됩니다.

use serde::Serialize;

use crate::context::RagContext;
use crate::error::{RagError, Result};
use crate::knowledge::ScoredChunk;

/// 세션 종료 입력
pub const EXIT_COMMANDS: [&str; 4] = ["quit", "exit", "q", "종료"];

/// 예시 질문
pub const EXAMPLE_QUESTIONS: [&str; 5] = [
    "재무 자유란 무엇인가요?",
    "부자와 가난한 사람의 사고방식은 어떻게 다른가요?",
    "투자는 어떻게 시작해야 하나요?",
    "자산과 부채의 차이는 무엇인가요?",
    "수동적 소득은 어떻게 만들 수 있나요?",
];

// ============================================================================
// Input
// ============================================================================

/// 해석된 사용자 입력
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCommand {
    Exit,
    Empty,
    Clear,
    History,
    Examples,
    Status,
    Question(String),
}

impl SessionCommand {
    /// 한 줄 입력 해석
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return SessionCommand::Empty;
        }
        if is_exit_command(trimmed) {
            return SessionCommand::Exit;
        }

        match trimmed.to_lowercase().as_str() {
            "/clear" => SessionCommand::Clear,
            "/history" => SessionCommand::History,
            "/examples" => SessionCommand::Examples,
            "/status" => SessionCommand::Status,
            _ => SessionCommand::Question(trimmed.to_string()),
        }
    }
}

/// 종료 입력 여부 (대소문자 무시)
pub fn is_exit_command(input: &str) -> bool {
    let input = input.trim();
    EXIT_COMMANDS.iter().any(|c| c.eq_ignore_ascii_case(input))
}

// ============================================================================
// Conversation
// ============================================================================

/// 메시지 역할
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    /// 실패한 턴
    Error,
}

/// 대화 메시지
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub sources: Vec<ScoredChunk>,
}

impl Message {
    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            sources: Vec::new(),
        }
    }
}

/// 세션 동안만 유지되는 대화 기록
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<Message>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// 최근 질문 (오래된 순, 최대 n개)
    pub fn recent_questions(&self, n: usize) -> Vec<&str> {
        let questions: Vec<&str> = self
            .messages
            .iter()
            .filter(|m| m.role == Role::User)
            .map(|m| m.content.as_str())
            .collect();
        let skip = questions.len().saturating_sub(n);
        questions[skip..].to_vec()
    }

    /// 답변까지 완료된 턴 수
    pub fn answered_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == Role::Assistant)
            .count()
    }
}

// ============================================================================
// ChatSession
// ============================================================================

/// 대화형 질의응답 세션
pub struct ChatSession<'a> {
    ctx: &'a RagContext,
    conversation: Conversation,
    top_k: usize,
}

impl<'a> ChatSession<'a> {
    pub fn new(ctx: &'a RagContext, top_k: usize) -> Self {
        Self {
            ctx,
            conversation: Conversation::new(),
            top_k,
        }
    }

    pub fn conversation(&self) -> &Conversation {
        &self.conversation
    }

    pub fn clear(&mut self) {
        self.conversation.clear();
    }

    pub fn context(&self) -> &RagContext {
        self.ctx
    }

    /// 질문 한 턴 처리
    ///
    /// 빈 질문은 기록하지 않고 `EmptyQuery`를 반환합니다. 그 외 실패는
    /// 질문 뒤에 에러 항목을 남긴 뒤 에러를 반환합니다.
    pub async fn ask(&mut self, question: &str) -> Result<&Message> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::EmptyQuery);
        }

        self.conversation.push(Message::new(Role::User, question));

        let answer = match self.ctx.answer(question, self.top_k).await {
            Ok(answer) => answer,
            Err(e) => {
                tracing::debug!("Turn failed: {}", e);
                self.conversation.push(Message::new(Role::Error, e.to_string()));
                return Err(e);
            }
        };

        self.conversation.push(Message {
            role: Role::Assistant,
            content: answer.text,
            sources: answer.sources,
        });

        let last = self.conversation.messages.len() - 1;
        Ok(&self.conversation.messages[last])
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use crate::testing::{sample_documents, test_config, EchoGeneration, FailingGeneration, HashEmbedding};
    use crate::generation::GenerationProvider;
    use tempfile::TempDir;

    async fn context_with(root: &std::path::Path, generator: Arc<dyn GenerationProvider>) -> RagContext {
        let mut ctx = RagContext::with_providers(test_config(root), Arc::new(HashEmbedding::new()), generator)
            .await
            .unwrap();
        ctx.ingest_documents(sample_documents()).await.unwrap();
        ctx
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(SessionCommand::parse("  "), SessionCommand::Empty);
        assert_eq!(SessionCommand::parse("QUIT"), SessionCommand::Exit);
        assert_eq!(SessionCommand::parse(" q "), SessionCommand::Exit);
        assert_eq!(SessionCommand::parse("종료"), SessionCommand::Exit);
        assert_eq!(SessionCommand::parse("/clear"), SessionCommand::Clear);
        assert_eq!(SessionCommand::parse("/History"), SessionCommand::History);
        assert_eq!(SessionCommand::parse("/examples"), SessionCommand::Examples);
        assert_eq!(SessionCommand::parse("/status"), SessionCommand::Status);
        assert_eq!(
            SessionCommand::parse(" 자산이란? "),
            SessionCommand::Question("자산이란?".to_string())
        );
        assert_eq!(
            SessionCommand::parse("quit now"),
            SessionCommand::Question("quit now".to_string())
        );
    }

    #[test]
    fn test_recent_questions() {
        let mut conversation = Conversation::new();
        for q in ["a", "b", "c"] {
            conversation.push(Message::new(Role::User, q));
            conversation.push(Message::new(Role::Assistant, "ok"));
        }
        assert_eq!(conversation.recent_questions(2), vec!["b", "c"]);
        assert_eq!(conversation.recent_questions(10).len(), 3);
        assert_eq!(conversation.answered_turns(), 3);
    }

    #[tokio::test]
    async fn test_turn_records_answer_and_sources() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with(dir.path(), Arc::new(EchoGeneration::new())).await;
        let mut session = ChatSession::new(&ctx, 2);

        let reply = session.ask("财务自由是什么?").await.unwrap();
        assert_eq!(reply.role, Role::Assistant);
        assert_eq!(reply.sources.len(), 2);
        assert_eq!(reply.sources[0].chunk.metadata.page, 2);

        let roles: Vec<Role> = session.conversation().messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn test_generation_failure_keeps_session_usable() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with(dir.path(), Arc::new(FailingGeneration)).await;
        let mut session = ChatSession::new(&ctx, 3);

        let err = session.ask("자산이란?").await.unwrap_err();
        assert!(matches!(err, RagError::GenerationFailed { .. }));

        let messages = session.conversation().messages();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::User);
        assert_eq!(messages[0].content, "자산이란?");
        assert_eq!(messages[1].role, Role::Error);

        // 다음 턴도 처리됨
        assert!(session.ask("부채란?").await.is_err());
        assert_eq!(session.conversation().messages().len(), 4);
        assert_eq!(session.conversation().recent_questions(5), vec!["자산이란?", "부채란?"]);
    }

    #[tokio::test]
    async fn test_missing_index_is_a_failed_turn() {
        let dir = TempDir::new().unwrap();
        let ctx = RagContext::with_providers(
            test_config(dir.path()),
            Arc::new(HashEmbedding::new()),
            Arc::new(EchoGeneration::new()),
        )
        .await
        .unwrap();
        let mut session = ChatSession::new(&ctx, 3);

        let err = session.ask("자산이란?").await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotFound { .. }));
        assert_eq!(session.conversation().messages()[1].role, Role::Error);
        assert_eq!(session.conversation().answered_turns(), 0);
        assert_eq!(session.conversation().messages().len(), 2);
    }

    #[tokio::test]
    async fn test_blank_question_is_not_recorded() {
        let dir = TempDir::new().unwrap();
        let ctx = context_with(dir.path(), Arc::new(EchoGeneration::new())).await;
        let mut session = ChatSession::new(&ctx, 3);

        assert!(matches!(session.ask("   ").await, Err(RagError::EmptyQuery)));
        assert!(session.conversation().is_empty());

        session.ask("assets").await.unwrap();
        session.clear();
        assert!(session.conversation().is_empty());
    }
}
