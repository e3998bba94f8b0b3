//! 프로세스 전역 RAG 컨텍스트
//!
//! 시작 시 한 번 만들어 모든 명령 핸들러에 참조로 전달합니다.
//! 설정, 임베딩/생성 프로바이더, 열린 인덱스, 인덱스 상태를 가집니다.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Arc;

use serde::Serialize;

use crate::answer::{Answer, AnswerSynthesizer};
use crate::collector::file_sha256;
use crate::config::Config;
use crate::embedding::{create_embedder, EmbeddingProvider};
use crate::error::{RagError, Result};
use crate::generation::{GenerationProvider, OllamaGeneration};
use crate::knowledge::{
    Chunk, DocumentRecord, IndexManifest, IngestReport, Ingestor, LanceVectorStore,
    ManifestStore, Retriever, ScoredChunk, SourceDocument, VectorStore,
};

// ============================================================================
// Index State
// ============================================================================

/// 인덱스 상태
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexState {
    /// 인덱스 디렉토리 없음
    Uninitialized,
    /// 검색 가능
    Ready { entries: usize },
    /// 디렉토리는 있지만 읽을 수 없음
    Corrupt { reason: String },
}

impl IndexState {
    pub fn is_ready(&self) -> bool {
        matches!(self, IndexState::Ready { .. })
    }
}

impl std::fmt::Display for IndexState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IndexState::Uninitialized => write!(f, "Uninitialized"),
            IndexState::Ready { entries } => write!(f, "Ready ({} entries)", entries),
            IndexState::Corrupt { reason } => write!(f, "Corrupt ({})", reason),
        }
    }
}

/// 열린 인덱스 핸들
struct OpenIndex {
    store: Arc<dyn VectorStore>,
    manifest: IndexManifest,
    documents: Vec<DocumentRecord>,
}

/// 인덱스 통계 (view / status 용)
#[derive(Debug, Clone, Serialize)]
pub struct IndexStats {
    pub entries: usize,
    pub documents: usize,
}

// ============================================================================
// RagContext
// ============================================================================

/// RAG 컨텍스트
pub struct RagContext {
    config: Config,
    embedder: Arc<dyn EmbeddingProvider>,
    generator: Arc<dyn GenerationProvider>,
    state: IndexState,
    index: Option<OpenIndex>,
    min_score: Option<f32>,
}

impl RagContext {
    /// Ollama 프로바이더로 컨텍스트 생성
    ///
    /// 네트워크 호출은 하지 않으며, 인덱스 상태만 확인합니다.
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;
        let embedder = Arc::new(create_embedder(&config)?);
        let generator = Arc::new(OllamaGeneration::from_config(&config)?);
        Self::with_providers(config, embedder, generator).await
    }

    /// 프로바이더를 지정해 컨텍스트 생성
    pub async fn with_providers(
        config: Config,
        embedder: Arc<dyn EmbeddingProvider>,
        generator: Arc<dyn GenerationProvider>,
    ) -> Result<Self> {
        config.validate()?;

        let mut ctx = Self {
            config,
            embedder,
            generator,
            state: IndexState::Uninitialized,
            index: None,
            min_score: None,
        };
        ctx.refresh().await;
        Ok(ctx)
    }

    /// 최소 유사도 필터 설정
    pub fn with_min_score(mut self, min_score: Option<f32>) -> Self {
        self.min_score = min_score;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn index_state(&self) -> &IndexState {
        &self.state
    }

    pub fn embedder(&self) -> &dyn EmbeddingProvider {
        self.embedder.as_ref()
    }

    pub fn generator(&self) -> &dyn GenerationProvider {
        self.generator.as_ref()
    }

    /// 인덱스 빌드 정보
    pub fn manifest(&self) -> Option<&IndexManifest> {
        self.index.as_ref().map(|i| &i.manifest)
    }

    /// 색인된 문서 목록
    pub fn documents(&self) -> &[DocumentRecord] {
        self.index
            .as_ref()
            .map(|i| i.documents.as_slice())
            .unwrap_or(&[])
    }

    /// 디스크에서 인덱스 상태를 다시 확인
    pub async fn refresh(&mut self) {
        self.index = None;
        let loaded = self.load_index().await;
        self.state = match loaded {
            Ok(None) => IndexState::Uninitialized,
            Ok(Some(index)) => {
                let entries = index.manifest.entry_count;
                self.index = Some(index);
                IndexState::Ready { entries }
            }
            Err(e) => {
                let reason = match e {
                    RagError::IndexCorrupt { reason, .. } => reason,
                    other => other.to_string(),
                };
                tracing::warn!("Index at {:?} is unusable: {}", self.config.index_dir, reason);
                IndexState::Corrupt { reason }
            }
        };
        tracing::debug!("Index state: {}", self.state);
    }

    async fn load_index(&self) -> Result<Option<OpenIndex>> {
        let index_dir = &self.config.index_dir;
        if !index_dir.exists() {
            return Ok(None);
        }

        let corrupt = |reason: String| RagError::IndexCorrupt {
            path: index_dir.clone(),
            reason,
        };

        let manifest_path = self.config.manifest_path();
        if !manifest_path.is_file() {
            return Err(corrupt("manifest.db is missing".to_string()));
        }
        let lance_path = self.config.lance_path();
        if !lance_path.exists() {
            return Err(corrupt("vector table is missing".to_string()));
        }

        let store = ManifestStore::open_existing(&manifest_path)
            .map_err(|e| corrupt(format!("cannot open manifest: {}", e)))?;
        let manifest = store
            .read_info()
            .map_err(|e| corrupt(format!("cannot read manifest: {}", e)))?
            .ok_or_else(|| corrupt("manifest has no build information".to_string()))?;
        let documents = store
            .list_documents()
            .map_err(|e| corrupt(format!("cannot read documents: {}", e)))?;

        let vectors = LanceVectorStore::open(&lance_path, manifest.embedding_dimension)
            .await
            .map_err(|e| corrupt(e.to_string()))?;
        let count = vectors
            .count()
            .await
            .map_err(|e| corrupt(e.to_string()))?;
        if count != manifest.entry_count {
            return Err(corrupt(format!(
                "manifest records {} entries but the vector table has {}",
                manifest.entry_count, count
            )));
        }

        Ok(Some(OpenIndex {
            store: Arc::new(vectors),
            manifest,
            documents,
        }))
    }

    // ========================================================================
    // Ingestion
    // ========================================================================

    /// 디렉토리를 색인하고 인덱스 상태를 다시 확인
    pub async fn ingest(&mut self, docs_dir: &Path) -> Result<IngestReport> {
        let result = Ingestor::new(&self.config, self.embedder.as_ref())?
            .ingest_directory(docs_dir)
            .await;
        self.refresh().await;
        result
    }

    /// 추출이 끝난 문서 색인
    pub async fn ingest_documents(&mut self, documents: Vec<SourceDocument>) -> Result<IngestReport> {
        let result = Ingestor::new(&self.config, self.embedder.as_ref())?
            .ingest_documents(documents)
            .await;
        self.refresh().await;
        result
    }

    // ========================================================================
    // Retrieval
    // ========================================================================

    /// 검색기 생성 (인덱스 상태와 모델 일치 확인)
    ///
    /// 임베딩 호출 전에 실패하므로 인덱스가 없을 때는 외부 호출이 없습니다.
    pub fn retriever(&self) -> Result<Retriever> {
        let index = match (&self.state, &self.index) {
            (IndexState::Ready { .. }, Some(index)) => index,
            (IndexState::Corrupt { reason }, _) => {
                return Err(RagError::IndexCorrupt {
                    path: self.config.index_dir.clone(),
                    reason: reason.clone(),
                })
            }
            _ => {
                return Err(RagError::IndexNotFound {
                    path: self.config.index_dir.clone(),
                })
            }
        };

        if index.manifest.embedding_model != self.embedder.name() {
            return Err(RagError::EmbeddingModelMismatch {
                indexed: index.manifest.embedding_model.clone(),
                configured: self.embedder.name().to_string(),
            });
        }
        if index.manifest.embedding_dimension != self.embedder.dimension() {
            return Err(RagError::DimensionMismatch {
                expected: index.manifest.embedding_dimension,
                actual: self.embedder.dimension(),
            });
        }

        Ok(Retriever::new(index.store.clone(), self.embedder.clone()).with_min_score(self.min_score))
    }

    /// 유사도 점수와 함께 검색
    pub async fn search_with_score(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        self.retriever()?.search_with_score(query, k).await
    }

    /// 청크만 검색
    pub async fn search(&self, query: &str, k: usize) -> Result<Vec<Chunk>> {
        if query.trim().is_empty() {
            return Err(RagError::EmptyQuery);
        }
        self.retriever()?.search(query, k).await
    }

    /// 빠른 검색 (프로그램용)
    pub async fn quick_search(&self, query: &str, top_k: usize) -> Result<Vec<Chunk>> {
        self.search(query, top_k).await
    }

    // ========================================================================
    // Answering
    // ========================================================================

    /// 검색 후 답변 생성
    pub async fn answer(&self, question: &str, k: usize) -> Result<Answer> {
        let sources = self.search_with_score(question, k).await?;
        AnswerSynthesizer::new(self.generator.clone(), self.config.temperature)
            .synthesize(question, sources)
            .await
    }

    // ========================================================================
    // Inspection
    // ========================================================================

    /// 엔트리 수와 문서 수
    pub async fn stats(&self) -> Result<IndexStats> {
        let index = self.open_index()?;
        let entries = index.store.count().await?;
        let documents = if index.documents.is_empty() {
            self.all_chunks()
                .await?
                .iter()
                .map(|c| c.metadata.source.as_str())
                .collect::<BTreeSet<_>>()
                .len()
        } else {
            index.documents.len()
        };
        Ok(IndexStats { entries, documents })
    }

    /// 저장된 모든 청크
    pub async fn all_chunks(&self) -> Result<Vec<Chunk>> {
        self.open_index()?.store.get_all().await
    }

    /// 색인 이후 내용이 바뀌었거나 사라진 문서
    pub fn stale_documents(&self) -> Vec<String> {
        self.documents()
            .iter()
            .filter(|doc| match file_sha256(Path::new(&doc.source)) {
                Ok(sha) => sha != doc.sha256,
                Err(_) => true,
            })
            .map(|doc| doc.source.clone())
            .collect()
    }

    fn open_index(&self) -> Result<&OpenIndex> {
        match (&self.state, &self.index) {
            (IndexState::Ready { .. }, Some(index)) => Ok(index),
            (IndexState::Corrupt { reason }, _) => Err(RagError::IndexCorrupt {
                path: self.config.index_dir.clone(),
                reason: reason.clone(),
            }),
            _ => Err(RagError::IndexNotFound {
                path: self.config.index_dir.clone(),
            }),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{
        sample_documents, test_config, EchoGeneration, FailingEmbedding, HashEmbedding,
    };
    use tempfile::TempDir;

    async fn ready_context(root: &Path) -> (RagContext, Arc<HashEmbedding>, Arc<EchoGeneration>) {
        let embedder = Arc::new(HashEmbedding::new());
        let generator = Arc::new(EchoGeneration::new());
        let mut ctx = RagContext::with_providers(test_config(root), embedder.clone(), generator.clone())
            .await
            .unwrap();
        ctx.ingest_documents(sample_documents()).await.unwrap();
        (ctx, embedder, generator)
    }

    #[tokio::test]
    async fn test_missing_index_fails_before_embedding() {
        let dir = TempDir::new().unwrap();
        let embedder = Arc::new(HashEmbedding::new());
        let ctx = RagContext::with_providers(
            test_config(dir.path()),
            embedder.clone(),
            Arc::new(EchoGeneration::new()),
        )
        .await
        .unwrap();

        assert_eq!(ctx.index_state(), &IndexState::Uninitialized);
        let err = ctx.search_with_score("财务自由", 3).await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotFound { .. }));
        let err = ctx.answer("财务自由", 3).await.unwrap_err();
        assert!(matches!(err, RagError::IndexNotFound { .. }));
        assert_eq!(embedder.calls(), 0);
    }

    #[tokio::test]
    async fn test_ingest_makes_index_ready() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, _) = ready_context(dir.path()).await;

        let IndexState::Ready { entries } = ctx.index_state() else {
            panic!("expected ready, got {}", ctx.index_state());
        };
        let stats = ctx.stats().await.unwrap();
        assert_eq!(stats.entries, *entries);
        assert_eq!(stats.documents, 2);
        assert_eq!(ctx.all_chunks().await.unwrap().len(), *entries);
    }

    #[tokio::test]
    async fn test_financial_freedom_query_cites_page() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, _) = ready_context(dir.path()).await;

        let results = ctx.search_with_score("财务自由", 2).await.unwrap();
        assert_eq!(results.len(), 2);
        let top = &results[0];
        assert!(top.chunk.text.contains("财务自由"));
        assert_eq!(top.chunk.metadata.source, "docs/rich_dad.pdf");
        assert_eq!(top.chunk.metadata.page, 2);
        assert!(top.score > results[1].score);
    }

    #[tokio::test]
    async fn test_verbatim_roundtrip_and_idempotence() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, _) = ready_context(dir.path()).await;

        for chunk in ctx.all_chunks().await.unwrap() {
            let first = ctx.quick_search(&chunk.text, 1).await.unwrap();
            assert_eq!(first[0], chunk);
        }

        let a = ctx.search_with_score("assets", 3).await.unwrap();
        let b = ctx.search_with_score("assets", 3).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn test_k_larger_than_index_returns_all() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, _) = ready_context(dir.path()).await;
        let total = ctx.stats().await.unwrap().entries;

        assert_eq!(ctx.search("investing", total + 10).await.unwrap().len(), total);
    }

    #[tokio::test]
    async fn test_answer_uses_retrieved_sources() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, generator) = ready_context(dir.path()).await;

        let answer = ctx.answer("财务自由是什么?", 2).await.unwrap();
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(generator.calls(), 1);
        assert!(generator.last_prompt().unwrap().contains("docs/rich_dad.pdf, 2페이지"));
    }

    #[tokio::test]
    async fn test_blank_query_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (ctx, embedder, generator) = ready_context(dir.path()).await;
        let before = embedder.calls();

        assert!(matches!(ctx.answer("  ", 3).await, Err(RagError::EmptyQuery)));
        assert_eq!(embedder.calls(), before);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn test_other_embedding_model_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, _) = ready_context(dir.path()).await;
        drop(ctx);

        let other = RagContext::with_providers(
            test_config(dir.path()),
            Arc::new(FailingEmbedding),
            Arc::new(EchoGeneration::new()),
        )
        .await
        .unwrap();
        assert!(other.index_state().is_ready());

        let err = other.search("assets", 3).await.unwrap_err();
        assert!(matches!(err, RagError::EmbeddingModelMismatch { .. }));
    }

    #[tokio::test]
    async fn test_missing_manifest_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let config = test_config(dir.path());
        std::fs::create_dir_all(&config.index_dir).unwrap();

        let ctx = RagContext::with_providers(
            config,
            Arc::new(HashEmbedding::new()),
            Arc::new(EchoGeneration::new()),
        )
        .await
        .unwrap();

        assert!(matches!(ctx.index_state(), IndexState::Corrupt { .. }));
        let err = ctx.search("assets", 3).await.unwrap_err();
        assert!(matches!(err, RagError::IndexCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_stale_documents_detects_missing_files() {
        let dir = TempDir::new().unwrap();
        let (ctx, _, _) = ready_context(dir.path()).await;

        // 샘플 문서의 경로는 디스크에 없음
        let stale = ctx.stale_documents();
        assert_eq!(stale.len(), 2);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut config = test_config(dir.path());
        config.chunk_overlap = config.chunk_size;

        let result = RagContext::with_providers(
            config,
            Arc::new(HashEmbedding::new()),
            Arc::new(EchoGeneration::new()),
        )
        .await;
        assert!(matches!(result, Err(RagError::InvalidConfig(_))));
    }
}
