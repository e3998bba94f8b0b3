//! 콘텐츠 추출 모듈
//!
//! PDF 파일에서 페이지별 텍스트를 추출합니다.

pub mod pdf;

use std::path::Path;

use crate::error::{RagError, Result};

// ============================================================================
// Page Text
// ============================================================================

/// 추출된 페이지 텍스트
#[derive(Debug, Clone, PartialEq)]
pub struct PageText {
    /// 원본 PDF 경로 (표시용 문자열)
    pub source: String,
    /// 페이지 번호 (1부터 시작)
    pub page: u32,
    pub text: String,
}

impl PageText {
    pub fn new(source: impl Into<String>, page: u32, text: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            page,
            text: text.into(),
        }
    }
}

/// PDF 파일에서 페이지 목록 추출
///
/// PDF 추출은 CPU 바운드이므로 spawn_blocking 사용.
/// pdf-extract 내부 panic도 `Extraction` 에러로 변환됩니다.
pub async fn extract_pages(path: &Path) -> Result<Vec<PageText>> {
    let owned = path.to_path_buf();
    let pages = tokio::task::spawn_blocking(move || pdf::extract_text_from_pdf(&owned))
        .await
        .map_err(|e| RagError::Extraction {
            path: path.to_path_buf(),
            message: format!("PDF extraction task failed: {}", e),
        })??;

    let source = path.display().to_string();
    Ok(pages
        .into_iter()
        .map(|(page_num, text)| PageText {
            source: source.clone(),
            page: page_num as u32,
            text,
        })
        .collect())
}

// ============================================================================
// Tests
// ============================================================================
