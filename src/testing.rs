//! 테스트 전용 프로바이더와 픽스처
//!
//! 네트워크 없이 결정적으로 동작하는 임베딩/생성 구현입니다.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::config::Config;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::extractor::PageText;
use crate::generation::GenerationProvider;
use crate::knowledge::SourceDocument;

pub const HASH_DIMENSION: usize = 256;
pub const HASH_MODEL: &str = "hash-embed";

/// 테스트 디렉토리 기준 설정 (작은 청크)
pub fn test_config(root: &Path) -> Config {
    Config {
        docs_dir: root.join("docs"),
        index_dir: root.join("vector_db"),
        embedding_model: HASH_MODEL.to_string(),
        embedding_dimension: HASH_DIMENSION,
        chunk_size: 200,
        chunk_overlap: 20,
        ..Config::default()
    }
}

/// 두 문서, 네 페이지
pub fn sample_documents() -> Vec<SourceDocument> {
    let rich = "docs/rich_dad.pdf";
    let invest = "docs/investing.pdf";

    vec![
        SourceDocument {
            source: rich.to_string(),
            sha256: "aa".to_string(),
            pages: vec![
                PageText::new(
                    rich,
                    1,
                    "Rich Dad Poor Dad\n\nThe rich buy assets. The poor and middle class \
                     buy liabilities they think are assets.",
                ),
                PageText::new(
                    rich,
                    2,
                    "财务自由是指被动收入足以覆盖生活支出的状态。\n\n实现财务自由需要持续投资资产。",
                ),
            ],
        },
        SourceDocument {
            source: invest.to_string(),
            sha256: "bb".to_string(),
            pages: vec![
                PageText::new(invest, 1, "Start investing early. Compound interest rewards patience."),
                PageText::new(invest, 2, "Diversification reduces risk across asset classes."),
            ],
        },
    ]
}

/// 페이지마다 한 줄의 텍스트를 담은 최소 PDF 작성 (Helvetica, 올바른 xref)
pub fn write_pdf(path: &Path, pages: &[&str]) {
    let font_id = 3;
    let first_page_id = 4;
    let kids: Vec<String> = (0..pages.len())
        .map(|i| format!("{} 0 R", first_page_id + i * 2))
        .collect();

    let mut objects = vec![
        "<< /Type /Catalog /Pages 2 0 R >>".to_string(),
        format!("<< /Type /Pages /Kids [{}] /Count {} >>", kids.join(" "), pages.len()),
        "<< /Type /Font /Subtype /Type1 /BaseFont /Helvetica /Encoding /WinAnsiEncoding >>"
            .to_string(),
    ];
    for (i, text) in pages.iter().enumerate() {
        let content_id = first_page_id + i * 2 + 1;
        objects.push(format!(
            "<< /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
             /Resources << /Font << /F1 {} 0 R >> >> /Contents {} 0 R >>",
            font_id, content_id
        ));

        let stream = if text.is_empty() {
            String::new()
        } else {
            let escaped = text
                .replace('\\', "\\\\")
                .replace('(', "\\(")
                .replace(')', "\\)");
            format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET", escaped)
        };
        objects.push(format!(
            "<< /Length {} >>\nstream\n{}\nendstream",
            stream.len(),
            stream
        ));
    }

    let mut out = String::from("%PDF-1.4\n");
    let mut offsets = Vec::with_capacity(objects.len());
    for (i, body) in objects.iter().enumerate() {
        offsets.push(out.len());
        out.push_str(&format!("{} 0 obj\n{}\nendobj\n", i + 1, body));
    }

    let xref_at = out.len();
    out.push_str(&format!("xref\n0 {}\n0000000000 65535 f \n", objects.len() + 1));
    for offset in offsets {
        out.push_str(&format!("{:010} 00000 n \n", offset));
    }
    out.push_str(&format!(
        "trailer\n<< /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
        objects.len() + 1,
        xref_at
    ));

    std::fs::write(path, out).unwrap();
}

// ============================================================================
// Embedding
// ============================================================================

/// 문자 + 문자 바이그램 해시 임베딩
pub struct HashEmbedding {
    calls: AtomicUsize,
    batch_calls: AtomicUsize,
}

impl HashEmbedding {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            batch_calls: AtomicUsize::new(0),
        }
    }

    /// embed / embed_batch 호출 총 횟수
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn batch_calls(&self) -> usize {
        self.batch_calls.load(Ordering::SeqCst)
    }

    fn vectorize(text: &str) -> Vec<f32> {
        let mut v = vec![0.0; HASH_DIMENSION];
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();

        for c in &chars {
            v[bucket(c)] += 1.0;
        }
        for pair in chars.windows(2) {
            v[bucket(&(pair[0], pair[1]))] += 1.0;
        }
        v
    }
}

fn bucket<T: Hash>(value: &T) -> usize {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    (hasher.finish() % HASH_DIMENSION as u64) as usize
}

#[async_trait]
impl EmbeddingProvider for HashEmbedding {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::vectorize(text))
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.batch_calls.fetch_add(1, Ordering::SeqCst);
        Ok(texts.iter().map(|t| Self::vectorize(t)).collect())
    }

    fn dimension(&self) -> usize {
        HASH_DIMENSION
    }

    fn name(&self) -> &str {
        HASH_MODEL
    }
}

/// 항상 실패하는 임베딩
pub struct FailingEmbedding;

#[async_trait]
impl EmbeddingProvider for FailingEmbedding {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(RagError::EmbeddingServiceUnavailable {
            model: "failing-embed".to_string(),
            message: "connection refused".to_string(),
        })
    }

    fn dimension(&self) -> usize {
        HASH_DIMENSION
    }

    fn name(&self) -> &str {
        "failing-embed"
    }
}

// ============================================================================
// Generation
// ============================================================================

/// 프롬프트 길이를 돌려주는 생성기
pub struct EchoGeneration {
    calls: AtomicUsize,
    last_prompt: Mutex<Option<String>>,
}

impl EchoGeneration {
    pub fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            last_prompt: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_prompt(&self) -> Option<String> {
        self.last_prompt.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerationProvider for EchoGeneration {
    async fn generate(&self, prompt: &str, _temperature: f32) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_prompt.lock().unwrap() = Some(prompt.to_string());
        Ok(format!("stub answer ({} chars of prompt)", prompt.chars().count()))
    }

    fn name(&self) -> &str {
        "echo"
    }
}

/// 항상 실패하는 생성기
pub struct FailingGeneration;

#[async_trait]
impl GenerationProvider for FailingGeneration {
    async fn generate(&self, _prompt: &str, _temperature: f32) -> Result<String> {
        Err(RagError::GenerationFailed {
            model: "failing".to_string(),
            message: "model not loaded".to_string(),
        })
    }

    fn name(&self) -> &str {
        "failing"
    }
}
