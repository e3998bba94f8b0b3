//! 파일 수집 모듈
//!
//! 문서 디렉토리를 재귀 탐색하여 PDF 파일을 수집합니다.
//! .gitignore 패턴을 존중하고, 숨김 파일은 건너뜁니다.

use std::io::Read;
use std::path::{Path, PathBuf};

use ignore::WalkBuilder;
use sha2::{Digest, Sha256};

use crate::error::{RagError, Result};

/// PDF 여부 (확장자 대소문자 무시)
pub fn is_pdf(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

// ============================================================================
// Collected File
// ============================================================================

/// 수집된 PDF 파일 정보
#[derive(Debug, Clone)]
pub struct CollectedFile {
    /// 파일 경로
    pub path: PathBuf,
    /// 파일 크기 (바이트)
    pub size: u64,
}

impl CollectedFile {
    /// 경로에서 CollectedFile 생성 (PDF가 아니면 None)
    pub fn from_path(path: PathBuf) -> Result<Option<Self>> {
        if !is_pdf(&path) {
            return Ok(None);
        }

        let metadata = std::fs::metadata(&path)?;
        if !metadata.is_file() {
            return Ok(None);
        }

        Ok(Some(Self {
            path,
            size: metadata.len(),
        }))
    }

    /// 파일 내용의 SHA-256 (매니페스트의 변경 감지용)
    pub fn fingerprint(&self) -> Result<String> {
        file_sha256(&self.path)
    }
}

/// 파일 SHA-256 (hex)
pub fn file_sha256(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buf = [0u8; 64 * 1024];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{:x}", hasher.finalize()))
}

// ============================================================================
// File Collector
// ============================================================================

/// 파일 수집기 설정
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    /// .gitignore 패턴 존중 여부
    pub respect_gitignore: bool,
    /// 숨김 파일 포함 여부
    pub include_hidden: bool,
    /// 최대 파일 크기 (바이트, 0이면 제한 없음)
    pub max_file_size: u64,
}

impl Default for CollectorConfig {
    fn default() -> Self {
        Self {
            respect_gitignore: true,
            include_hidden: false,
            max_file_size: 0,
        }
    }
}

/// PDF 수집기
pub struct FileCollector {
    config: CollectorConfig,
}

impl FileCollector {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }

    /// 기본 설정으로 수집기 생성
    pub fn with_defaults() -> Self {
        Self::new(CollectorConfig::default())
    }

    /// 폴더 재귀 수집
    ///
    /// 디렉토리가 없거나 PDF가 하나도 없으면 `NoDocumentsFound`.
    /// 결과는 경로 순으로 정렬되어 청크 생성 순서가 결정적입니다.
    pub fn collect_directory(&self, path: &Path) -> Result<Vec<CollectedFile>> {
        if !path.is_dir() {
            tracing::warn!("Documents directory not found: {:?}", path);
            return Err(RagError::NoDocumentsFound {
                dir: path.to_path_buf(),
            });
        }

        let mut files = Vec::new();

        let walker = WalkBuilder::new(path)
            .hidden(!self.config.include_hidden)
            .git_ignore(self.config.respect_gitignore)
            .git_global(self.config.respect_gitignore)
            .git_exclude(self.config.respect_gitignore)
            .build();

        for entry in walker {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!("Failed to read entry: {}", e);
                    continue;
                }
            };

            // 파일만 처리
            if !entry.file_type().map(|ft| ft.is_file()).unwrap_or(false) {
                continue;
            }

            match CollectedFile::from_path(entry.path().to_path_buf()) {
                Ok(Some(file)) => {
                    if self.should_include(&file) {
                        files.push(file);
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!("Failed to collect file {:?}: {}", entry.path(), e);
                }
            }
        }

        if files.is_empty() {
            return Err(RagError::NoDocumentsFound {
                dir: path.to_path_buf(),
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        tracing::info!("Collected {} PDF files from {:?}", files.len(), path);
        Ok(files)
    }

    /// 파일이 필터 조건을 만족하는지 확인
    fn should_include(&self, file: &CollectedFile) -> bool {
        if self.config.max_file_size > 0 && file.size > self.config.max_file_size {
            tracing::debug!("Skipping large file: {:?} ({} bytes)", file.path, file.size);
            return false;
        }
        true
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// 수집 통계
#[derive(Debug, Default)]
pub struct CollectionStats {
    pub total_files: usize,
    pub total_size: u64,
}

impl CollectionStats {
    /// 수집된 파일 목록에서 통계 계산
    pub fn from_files(files: &[CollectedFile]) -> Self {
        Self {
            total_files: files.len(),
            total_size: files.iter().map(|f| f.size).sum(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_pdf() {
        assert!(is_pdf(Path::new("a/b/book.pdf")));
        assert!(is_pdf(Path::new("BOOK.PDF")));
        assert!(!is_pdf(Path::new("notes.md")));
        assert!(!is_pdf(Path::new("pdf")));
    }

    #[test]
    fn test_empty_directory_has_no_documents() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("readme.txt"), "not a pdf").unwrap();

        let err = FileCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap_err();
        assert!(matches!(err, RagError::NoDocumentsFound { .. }));
    }

    #[test]
    fn test_missing_directory_has_no_documents() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");

        let err = FileCollector::with_defaults()
            .collect_directory(&missing)
            .unwrap_err();
        assert!(matches!(err, RagError::NoDocumentsFound { .. }));
    }

    #[test]
    fn test_collects_pdfs_recursively_in_order() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("part2");
        std::fs::create_dir_all(&nested).unwrap();
        std::fs::write(dir.path().join("b.pdf"), b"%PDF-1.4").unwrap();
        std::fs::write(nested.join("a.PDF"), b"%PDF-1.4").unwrap();
        std::fs::write(dir.path().join("skip.txt"), b"x").unwrap();

        let files = FileCollector::with_defaults()
            .collect_directory(dir.path())
            .unwrap();
        assert_eq!(files.len(), 2);
        assert!(files[0].path < files[1].path);

        let stats = CollectionStats::from_files(&files);
        assert_eq!(stats.total_files, 2);
        assert_eq!(stats.total_size, 16);
    }

    #[test]
    fn test_fingerprint_is_stable() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.pdf");
        std::fs::write(&path, b"abc").unwrap();

        let file = CollectedFile::from_path(path).unwrap().unwrap();
        assert_eq!(
            file.fingerprint().unwrap(),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
