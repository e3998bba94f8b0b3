//! Index Manifest - rusqlite 기반 인덱스 메타데이터
//!
//! 벡터 인덱스 옆에 `manifest.db`로 저장되며 다음을 기록합니다.
//! - 인덱스를 만든 임베딩 모델과 차원, 청킹 파라미터
//! - 색인된 PDF 목록 (SHA-256, 페이지 수, 청크 수)
//!
//! 시작 시 모델 불일치 검사와 `status`의 변경 감지에 사용됩니다.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

// ============================================================================
// Types
// ============================================================================

/// 인덱스 빌드 정보
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexManifest {
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    /// 빌드 시점의 엔트리 수
    pub entry_count: usize,
    pub built_at: DateTime<Utc>,
}

/// 색인된 문서 레코드
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub source: String,
    pub sha256: String,
    pub pages: usize,
    pub chunks: usize,
}

// ============================================================================
// ManifestStore
// ============================================================================

/// 매니페스트 저장소
pub struct ManifestStore {
    conn: Arc<Mutex<Connection>>,
    db_path: PathBuf,
}

impl ManifestStore {
    /// 매니페스트 생성 (없으면 생성, 스키마 초기화)
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        };

        store.initialize()?;
        Ok(store)
    }

    /// 기존 매니페스트 열기 (읽기 전용, 없으면 에러)
    pub fn open_existing(path: &Path) -> Result<Self> {
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            db_path: path.to_path_buf(),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RagError::VectorStore(format!("Manifest lock error: {}", e)))
    }

    /// 스키마 초기화
    fn initialize(&self) -> Result<()> {
        let conn = self.lock()?;

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS index_info (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS documents (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                source TEXT NOT NULL UNIQUE,
                sha256 TEXT NOT NULL,
                pages INTEGER NOT NULL,
                chunks INTEGER NOT NULL,
                ingested_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            "#,
        )?;

        tracing::debug!("Manifest initialized at {:?}", self.db_path);
        Ok(())
    }

    /// 빌드 정보 기록 (키가 같으면 덮어씀)
    pub fn write_info(&self, info: &IndexManifest) -> Result<()> {
        let conn = self.lock()?;

        let pairs = [
            ("embedding_model", info.embedding_model.clone()),
            ("embedding_dimension", info.embedding_dimension.to_string()),
            ("chunk_size", info.chunk_size.to_string()),
            ("chunk_overlap", info.chunk_overlap.to_string()),
            ("entry_count", info.entry_count.to_string()),
            ("built_at", info.built_at.to_rfc3339()),
        ];

        for (key, value) in pairs {
            conn.execute(
                "INSERT OR REPLACE INTO index_info (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
        }

        Ok(())
    }

    /// 빌드 정보 읽기 (기록된 적 없으면 None)
    pub fn read_info(&self) -> Result<Option<IndexManifest>> {
        let conn = self.lock()?;

        let get = |key: &str| -> Result<Option<String>> {
            Ok(conn
                .query_row(
                    "SELECT value FROM index_info WHERE key = ?1",
                    params![key],
                    |row| row.get::<_, String>(0),
                )
                .optional()?)
        };

        let Some(embedding_model) = get("embedding_model")? else {
            return Ok(None);
        };

        Ok(Some(IndexManifest {
            embedding_model,
            embedding_dimension: parse_number(get("embedding_dimension")?),
            chunk_size: parse_number(get("chunk_size")?),
            chunk_overlap: parse_number(get("chunk_overlap")?),
            entry_count: parse_number(get("entry_count")?),
            built_at: parse_datetime(get("built_at")?.unwrap_or_default()),
        }))
    }

    /// 문서 레코드 저장 (경로가 같으면 교체)
    pub fn add_document(&self, doc: &DocumentRecord) -> Result<()> {
        let conn = self.lock()?;
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT OR REPLACE INTO documents (source, sha256, pages, chunks, ingested_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![doc.source, doc.sha256, doc.pages as i64, doc.chunks as i64, now],
        )?;

        Ok(())
    }

    /// 문서 목록 (경로 순)
    pub fn list_documents(&self) -> Result<Vec<DocumentRecord>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            "SELECT source, sha256, pages, chunks FROM documents ORDER BY source",
        )?;

        let docs = stmt
            .query_map([], |row| {
                Ok(DocumentRecord {
                    source: row.get(0)?,
                    sha256: row.get(1)?,
                    pages: row.get::<_, i64>(2)? as usize,
                    chunks: row.get::<_, i64>(3)? as usize,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(docs)
    }

    /// 문서 수
    pub fn document_count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM documents", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

fn parse_number(value: Option<String>) -> usize {
    value.and_then(|v| v.parse().ok()).unwrap_or(0)
}

/// 날짜 문자열 파싱
fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

// ============================================================================
// Tests
// ============================================================================
