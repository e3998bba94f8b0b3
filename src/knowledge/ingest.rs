//! 색인 파이프라인 - 수집 → 추출 → 청킹 → 임베딩 → 저장
//!
//! 전부 성공하거나 아무것도 바꾸지 않습니다. 모든 임베딩을 먼저 계산하고,
//! 대상 옆의 스테이징 디렉토리에 새 인덱스를 완성한 뒤에만 교체합니다.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use chrono::Utc;

use crate::collector::{CollectionStats, FileCollector};
use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::{extract_pages, PageText};

use super::chunker::{recursive_chunker, ChunkConfig, Chunker};
use super::lance::LanceVectorStore;
use super::manifest::{DocumentRecord, IndexManifest, ManifestStore};
use super::vector::{Chunk, VectorEntry, VectorStore};
use super::{LANCE_DIR_NAME, MANIFEST_FILE_NAME};

// ============================================================================
// Types
// ============================================================================

/// 색인 대상 문서 (추출 완료)
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub source: String,
    pub sha256: String,
    pub pages: Vec<PageText>,
}

/// 색인 결과 보고
#[derive(Debug, Clone)]
pub struct IngestReport {
    pub documents: usize,
    pub pages: usize,
    pub chunks: usize,
    pub elapsed: Duration,
    pub index_dir: PathBuf,
}

// ============================================================================
// Ingestor
// ============================================================================

/// 색인기
pub struct Ingestor<'a> {
    config: &'a Config,
    embedder: &'a dyn EmbeddingProvider,
    chunker: Box<dyn Chunker>,
}

impl<'a> Ingestor<'a> {
    pub fn new(config: &'a Config, embedder: &'a dyn EmbeddingProvider) -> Result<Self> {
        let chunk_config = ChunkConfig::new(config.chunk_size, config.chunk_overlap)?;
        Ok(Self {
            config,
            embedder,
            chunker: recursive_chunker(chunk_config),
        })
    }

    /// 디렉토리 전체 색인
    pub async fn ingest_directory(&self, docs_dir: &Path) -> Result<IngestReport> {
        let started = Instant::now();
        let documents = self.load_directory(docs_dir).await?;
        self.build(docs_dir, documents, started).await
    }

    /// 이미 추출된 문서 색인
    pub async fn ingest_documents(&self, documents: Vec<SourceDocument>) -> Result<IngestReport> {
        let docs_dir = self.config.docs_dir.clone();
        self.build(&docs_dir, documents, Instant::now()).await
    }

    /// PDF 수집 및 페이지 추출
    ///
    /// 하나라도 추출에 실패하면 전체 실행을 중단합니다.
    pub async fn load_directory(&self, docs_dir: &Path) -> Result<Vec<SourceDocument>> {
        let files = FileCollector::with_defaults().collect_directory(docs_dir)?;
        let stats = CollectionStats::from_files(&files);
        tracing::info!(
            "Loading {} PDF files ({} bytes) from {:?}",
            stats.total_files,
            stats.total_size,
            docs_dir
        );

        let mut documents = Vec::with_capacity(files.len());
        for file in &files {
            let pages = extract_pages(&file.path).await?;
            if pages.iter().all(|p| p.text.trim().is_empty()) {
                tracing::warn!("No extractable text in {:?} (scanned PDF?)", file.path);
            }

            documents.push(SourceDocument {
                source: file.path.display().to_string(),
                sha256: file.fingerprint()?,
                pages,
            });
        }

        Ok(documents)
    }

    async fn build(
        &self,
        docs_dir: &Path,
        documents: Vec<SourceDocument>,
        started: Instant,
    ) -> Result<IngestReport> {
        if documents.is_empty() {
            return Err(RagError::NoDocumentsFound {
                dir: docs_dir.to_path_buf(),
            });
        }

        // 1. 청킹
        tracing::debug!(
            "Chunking with {} (size {}, overlap {})",
            self.chunker.name(),
            self.config.chunk_size,
            self.config.chunk_overlap
        );
        let mut chunks: Vec<Chunk> = Vec::new();
        let mut records = Vec::with_capacity(documents.len());
        let mut total_pages = 0;

        for doc in &documents {
            let doc_chunks = self.chunker.split_pages(&doc.pages);
            tracing::debug!("{}: {} pages → {} chunks", doc.source, doc.pages.len(), doc_chunks.len());

            total_pages += doc.pages.len();
            records.push(DocumentRecord {
                source: doc.source.clone(),
                sha256: doc.sha256.clone(),
                pages: doc.pages.len(),
                chunks: doc_chunks.len(),
            });
            chunks.extend(doc_chunks);
        }

        if chunks.is_empty() {
            return Err(RagError::NoTextExtracted {
                dir: docs_dir.to_path_buf(),
                documents: documents.len(),
            });
        }

        tracing::info!(
            "Split {} documents ({} pages) into {} chunks",
            documents.len(),
            total_pages,
            chunks.len()
        );

        // 2. 임베딩 (쓰기 전에 전부 계산)
        let entries = self.embed_chunks(chunks).await?;

        // 3. 스테이징에 쓰고 교체
        let info = IndexManifest {
            embedding_model: self.embedder.name().to_string(),
            embedding_dimension: self.embedder.dimension(),
            chunk_size: self.config.chunk_size,
            chunk_overlap: self.config.chunk_overlap,
            entry_count: entries.len(),
            built_at: Utc::now(),
        };
        self.write_index(&entries, &info, &records).await?;

        let report = IngestReport {
            documents: documents.len(),
            pages: total_pages,
            chunks: entries.len(),
            elapsed: started.elapsed(),
            index_dir: self.config.index_dir.clone(),
        };
        tracing::info!(
            "Index built at {:?}: {} chunks in {:.1}s",
            report.index_dir,
            report.chunks,
            report.elapsed.as_secs_f64()
        );
        Ok(report)
    }

    /// 배치 단위 임베딩
    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<VectorEntry>> {
        let batch_size = self.config.embed_batch_size.max(1);
        let total_batches = chunks.len().div_ceil(batch_size);
        let mut entries = Vec::with_capacity(chunks.len());

        for (batch_no, batch) in chunks.chunks(batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|c| c.text.clone()).collect();
            let embeddings = self.embedder.embed_batch(&texts).await?;

            if embeddings.len() != batch.len() {
                return Err(RagError::EmbeddingServiceUnavailable {
                    model: self.embedder.name().to_string(),
                    message: format!(
                        "expected {} embeddings, got {}",
                        batch.len(),
                        embeddings.len()
                    ),
                });
            }

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                if embedding.len() != self.embedder.dimension() {
                    return Err(RagError::DimensionMismatch {
                        expected: self.embedder.dimension(),
                        actual: embedding.len(),
                    });
                }
                entries.push(VectorEntry::new(chunk.clone(), embedding));
            }

            tracing::debug!("Embedded batch {}/{}", batch_no + 1, total_batches);
        }

        Ok(entries)
    }

    /// 스테이징 디렉토리에 인덱스 작성 후 교체
    async fn write_index(
        &self,
        entries: &[VectorEntry],
        info: &IndexManifest,
        records: &[DocumentRecord],
    ) -> Result<()> {
        let target = &self.config.index_dir;
        let staging = sibling_path(target, "staging")?;

        let written = write_staging(&staging, entries, info, records).await;
        if let Err(e) = written {
            let _ = tokio::fs::remove_dir_all(&staging).await;
            return Err(e);
        }

        swap_into_place(&staging, target).await
    }
}

/// 스테이징 디렉토리에 LanceDB 테이블과 매니페스트 작성
async fn write_staging(
    staging: &Path,
    entries: &[VectorEntry],
    info: &IndexManifest,
    records: &[DocumentRecord],
) -> Result<()> {
    tokio::fs::create_dir_all(staging).await?;

    let store = LanceVectorStore::open(&staging.join(LANCE_DIR_NAME), info.embedding_dimension).await?;
    let inserted = store.insert(entries).await?;
    if inserted != entries.len() {
        return Err(RagError::VectorStore(format!(
            "inserted {} of {} entries",
            inserted,
            entries.len()
        )));
    }

    let manifest = ManifestStore::create(&staging.join(MANIFEST_FILE_NAME))?;
    for record in records {
        manifest.add_document(record)?;
    }
    manifest.write_info(info)?;

    Ok(())
}

/// 기존 인덱스를 옆으로 옮기고 스테이징을 대상 위치로 이동
async fn swap_into_place(staging: &Path, target: &Path) -> Result<()> {
    let backup = if target.exists() {
        let backup = sibling_path(target, "old")?;
        tokio::fs::rename(target, &backup).await?;
        Some(backup)
    } else {
        None
    };

    if let Err(e) = tokio::fs::rename(staging, target).await {
        if let Some(backup) = &backup {
            // 이전 인덱스 복구
            let _ = tokio::fs::rename(backup, target).await;
        }
        let _ = tokio::fs::remove_dir_all(staging).await;
        return Err(e.into());
    }

    if let Some(backup) = backup {
        if let Err(e) = tokio::fs::remove_dir_all(&backup).await {
            tracing::warn!("Failed to remove previous index {:?}: {}", backup, e);
        }
    }

    Ok(())
}

/// 대상과 같은 부모 디렉토리의 임시 경로 (`.vector_db.staging-<uuid>`)
fn sibling_path(target: &Path, tag: &str) -> Result<PathBuf> {
    let name = target
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| RagError::InvalidConfig(format!("invalid index directory: {:?}", target)))?;

    let sibling = format!(".{}.{}-{}", name, tag, uuid::Uuid::new_v4().simple());
    Ok(match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.join(sibling),
        _ => PathBuf::from(sibling),
    })
}

// ============================================================================
// Tests
// ============================================================================
