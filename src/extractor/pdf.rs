//! PDF 텍스트 추출 모듈
//!
//! pdf-extract 크레이트를 사용하여 PDF에서 페이지별 텍스트를 추출합니다.

use std::path::Path;

use crate::error::{RagError, Result};

/// PDF에서 텍스트 추출
///
/// 페이지별로 텍스트를 추출하여 (페이지 번호, 텍스트) 튜플 벡터로 반환합니다.
/// 페이지 번호는 1부터 시작하며, 빈 페이지도 번호를 유지하기 위해 남겨 둡니다.
pub fn extract_text_from_pdf(path: &Path) -> Result<Vec<(usize, String)>> {
    let bytes = std::fs::read(path)?;

    let pages = pdf_extract::extract_text_from_mem_by_pages(&bytes).map_err(|e| {
        RagError::Extraction {
            path: path.to_path_buf(),
            message: e.to_string(),
        }
    })?;

    if pages.iter().all(|p| p.trim().is_empty()) {
        tracing::warn!(
            "No text extracted from PDF: {:?}. It might be a scanned document.",
            path
        );
    }

    Ok(pages
        .iter()
        .enumerate()
        .map(|(i, text)| (i + 1, clean_page_text(text)))
        .collect())
}

/// 페이지 텍스트 정리
///
/// 줄 끝 공백을 지우고 세 줄 이상의 빈 줄은 문단 구분(`\n\n`) 하나로 줄입니다.
fn clean_page_text(text: &str) -> String {
    let trailing_ws = regex::Regex::new(r"[ \t]+\n").expect("Invalid regex");
    let blank_lines = regex::Regex::new(r"\n{3,}").expect("Invalid regex");

    let text = trailing_ws.replace_all(text, "\n");
    blank_lines.replace_all(&text, "\n\n").trim().to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::write_pdf;

    #[test]
    fn test_pages_are_numbered_separately() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("two.pdf");
        write_pdf(&path, &["Alpha page one", "Bravo page two"]);

        let pages = extract_text_from_pdf(&path).unwrap();
        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].0, 1);
        assert_eq!(pages[1].0, 2);
        assert!(pages[0].1.contains("Alpha page one"));
        assert!(!pages[0].1.contains("Bravo"));
        assert!(pages[1].1.contains("Bravo page two"));
    }

    #[test]
    fn test_blank_page_keeps_its_number() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("gap.pdf");
        write_pdf(&path, &["first", "", "third"]);

        let pages = extract_text_from_pdf(&path).unwrap();
        assert_eq!(pages.len(), 3);
        assert!(pages[1].1.is_empty());
        assert_eq!(pages[2].0, 3);
        assert!(pages[2].1.contains("third"));
    }

    #[test]
    fn test_clean_page_text() {
        assert_eq!(clean_page_text("\n\nAlpha  \nbeta\n\n\n\ngamma\n"), "Alpha\nbeta\n\ngamma");
        assert_eq!(clean_page_text("  \n "), "");
    }

    #[test]
    fn test_invalid_pdf_is_extraction_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("broken.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();

        let err = extract_text_from_pdf(&path).unwrap_err();
        assert!(matches!(err, RagError::Extraction { .. }));
    }
}
