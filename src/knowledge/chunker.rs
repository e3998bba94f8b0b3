//! Text Chunking Module
//!
//! 재귀적 문자 분할기입니다. 문단(`\n\n`) → 줄(`\n`) → 단어(` `) → 문자 순으로
//! 구분자를 낮춰 가며, 의미 단위를 최대한 자르지 않고 `chunk_size` 이하로 나눕니다.
//! 길이는 바이트가 아닌 문자(char) 수로 셉니다.

use std::collections::VecDeque;

use crate::error::{RagError, Result};
use crate::extractor::PageText;

use super::vector::{Chunk, ChunkMetadata};

/// 기본 구분자 (우선순위 순, 빈 문자열 = 문자 단위)
const DEFAULT_SEPARATORS: [&str; 4] = ["\n\n", "\n", " ", ""];

// ============================================================================
// Chunk Configuration
// ============================================================================

/// 청킹 설정
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkConfig {
    /// 최대 청크 크기 (문자 수)
    pub chunk_size: usize,
    /// 오버랩 크기 (문자 수, chunk_size 미만)
    pub chunk_overlap: usize,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            chunk_overlap: 100,
        }
    }
}

impl ChunkConfig {
    /// 검증된 설정 생성
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        if chunk_size == 0 || chunk_overlap >= chunk_size {
            return Err(RagError::InvalidConfig(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                chunk_overlap, chunk_size
            )));
        }
        Ok(Self {
            chunk_size,
            chunk_overlap,
        })
    }
}

// ============================================================================
// Chunker Trait
// ============================================================================

/// 텍스트 청킹 전략 트레이트
pub trait Chunker: Send + Sync {
    /// 텍스트를 청크로 분할
    fn split_text(&self, text: &str) -> Vec<String>;

    /// 청커 이름
    fn name(&self) -> &'static str;

    /// 페이지 목록을 메타데이터가 붙은 청크로 분할
    ///
    /// 페이지마다 따로 분할하므로 하나의 청크는 항상 한 페이지에 속합니다.
    fn split_pages(&self, pages: &[PageText]) -> Vec<Chunk> {
        let mut chunks = Vec::new();
        for page in pages {
            for (i, text) in self.split_text(&page.text).into_iter().enumerate() {
                chunks.push(Chunk {
                    text,
                    metadata: ChunkMetadata {
                        source: page.source.clone(),
                        page: page.page,
                        chunk_index: i as u32,
                    },
                });
            }
        }
        chunks
    }
}

// ============================================================================
// RecursiveChunker
// ============================================================================

/// 재귀 문자 분할기
///
/// 구분자는 다음 조각의 앞에 붙여 보존하고, 조각들을 `chunk_size`까지 탐욕적으로
/// 병합합니다. 새 청크는 이전 청크 끝의 조각들을 최대 `chunk_overlap` 문자만큼
/// 이어받습니다.
pub struct RecursiveChunker {
    config: ChunkConfig,
    separators: Vec<&'static str>,
}

impl RecursiveChunker {
    /// 설정으로 생성
    pub fn new(config: ChunkConfig) -> Self {
        Self {
            config,
            separators: DEFAULT_SEPARATORS.to_vec(),
        }
    }

    /// 기본 설정으로 생성 (1000 / 100)
    pub fn with_defaults() -> Self {
        Self::new(ChunkConfig::default())
    }

    pub fn config(&self) -> ChunkConfig {
        self.config
    }

    fn split_recursive(&self, text: &str, separators: &[&'static str]) -> Vec<String> {
        let mut final_chunks = Vec::new();

        // 텍스트에 존재하는 첫 번째 구분자 선택
        let mut separator = separators.last().copied().unwrap_or("");
        let mut remaining: &[&'static str] = &[];
        for (i, sep) in separators.iter().enumerate() {
            if sep.is_empty() {
                separator = sep;
                remaining = &[];
                break;
            }
            if text.contains(sep) {
                separator = sep;
                remaining = &separators[i + 1..];
                break;
            }
        }

        let mut good_splits: Vec<&str> = Vec::new();

        for split in split_keeping_separator(text, separator) {
            if char_len(split) < self.config.chunk_size {
                good_splits.push(split);
                continue;
            }

            if !good_splits.is_empty() {
                final_chunks.extend(self.merge_splits(&good_splits));
                good_splits.clear();
            }

            if remaining.is_empty() {
                final_chunks.push(split.to_string());
            } else {
                final_chunks.extend(self.split_recursive(split, remaining));
            }
        }

        if !good_splits.is_empty() {
            final_chunks.extend(self.merge_splits(&good_splits));
        }

        final_chunks
    }

    /// 작은 조각들을 chunk_size 이하로 병합 (오버랩 유지)
    fn merge_splits(&self, splits: &[&str]) -> Vec<String> {
        let mut docs = Vec::new();
        let mut current: VecDeque<&str> = VecDeque::new();
        let mut total = 0usize;

        for split in splits {
            let len = char_len(split);

            if total + len > self.config.chunk_size && !current.is_empty() {
                push_joined(&mut docs, &current);

                // 오버랩 이하가 될 때까지 앞쪽 조각 제거
                while total > self.config.chunk_overlap
                    || (total + len > self.config.chunk_size && total > 0)
                {
                    match current.pop_front() {
                        Some(front) => total -= char_len(front),
                        None => break,
                    }
                }
            }

            current.push_back(split);
            total += len;
        }

        push_joined(&mut docs, &current);
        docs
    }
}

impl Chunker for RecursiveChunker {
    fn split_text(&self, text: &str) -> Vec<String> {
        if text.trim().is_empty() {
            return vec![];
        }
        self.split_recursive(text, &self.separators)
    }

    fn name(&self) -> &'static str {
        "RecursiveChunker"
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

#[inline]
fn char_len(s: &str) -> usize {
    s.chars().count()
}

/// 조각들을 이어 붙이고 앞뒤 공백을 제거해 추가
fn push_joined(docs: &mut Vec<String>, parts: &VecDeque<&str>) {
    let joined: String = parts.iter().copied().collect();
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        docs.push(trimmed.to_string());
    }
}

/// 구분자를 다음 조각의 앞에 붙여 분할 (빈 구분자 = 문자 단위)
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    if separator.is_empty() {
        return text
            .char_indices()
            .map(|(i, c)| &text[i..i + c.len_utf8()])
            .collect();
    }

    let mut result = Vec::new();
    let mut last = 0;

    for (idx, _) in text.match_indices(separator) {
        result.push(&text[last..idx]);
        last = idx;
    }
    result.push(&text[last..]);

    result.retain(|s| !s.is_empty());
    result
}

// ============================================================================
// Factory Functions
// ============================================================================

/// 설정을 지정한 재귀 청커 생성
pub fn recursive_chunker(config: ChunkConfig) -> Box<dyn Chunker> {
    Box::new(RecursiveChunker::new(config))
}

// ============================================================================
// Tests
// ============================================================================
