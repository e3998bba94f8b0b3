//! CLI 모듈
//!
//! pdf-rag CLI 명령어 정의 및 구현

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustyline::error::ReadlineError;
use rustyline::history::DefaultHistory;
use rustyline::Editor;

use crate::config::{normalize_base_url, Config};
use crate::context::{IndexState, RagContext};
use crate::error::RagError;
use crate::knowledge::{Chunk, ScoredChunk};
use crate::session::{ChatSession, SessionCommand, EXAMPLE_QUESTIONS};

/// 미리보기 길이 (문자)
const PREVIEW_CHARS: usize = 200;

/// view 명령의 검색 미리보기 길이
const PROBE_PREVIEW_CHARS: usize = 300;

/// view 명령의 테스트 검색 결과 수
const PROBE_TOP_K: usize = 2;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Parser)]
#[command(name = "pdf-rag")]
#[command(version, about = "로컬 PDF 질의응답 RAG 시스템", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// 모든 명령에 공통인 설정 덮어쓰기
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// PDF 문서 디렉토리
    #[arg(long, global = true)]
    pub docs_dir: Option<PathBuf>,

    /// 벡터 인덱스 디렉토리
    #[arg(long, global = true)]
    pub index_dir: Option<PathBuf>,

    /// Ollama 서버 주소
    #[arg(long, global = true)]
    pub ollama_url: Option<String>,

    /// 임베딩 모델
    #[arg(long, global = true)]
    pub embed_model: Option<String>,

    /// 임베딩 벡터 차원 (모델에 맞춰 지정)
    #[arg(long, global = true)]
    pub embed_dim: Option<usize>,

    /// 답변 생성 모델
    #[arg(long, global = true)]
    pub chat_model: Option<String>,

    /// 생성 temperature (0.0 ~ 2.0)
    #[arg(long, global = true)]
    pub temperature: Option<f32>,

    /// 이 값 미만의 유사도 결과 제외
    #[arg(long, global = true, env = "PDF_RAG_MIN_SCORE")]
    pub min_score: Option<f32>,

    /// 상세 로그 (-v: info, -vv: debug)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// PDF 문서로 벡터 인덱스 구축 (기존 인덱스 교체)
    Ingest {
        /// 수집할 폴더 경로 (재귀)
        #[arg(short, long)]
        docs: Option<PathBuf>,
    },

    /// 대화형 질의응답
    Chat {
        /// 질문당 검색할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 대화형 검색 (답변 생성 없음)
    Search {
        /// 결과 개수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 빠른 검색 (비대화형)
    Query {
        /// 검색 쿼리
        query: String,

        /// 결과 개수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,

        /// JSON으로 출력
        #[arg(long)]
        json: bool,
    },

    /// 한 번 질문하고 답변 받기
    Ask {
        /// 질문
        question: String,

        /// 검색할 청크 수
        #[arg(short = 'k', long)]
        top_k: Option<usize>,
    },

    /// 인덱스 내용 확인
    View {
        /// 출력할 샘플 청크 수
        #[arg(short, long, default_value = "3")]
        samples: usize,

        /// 테스트 검색어
        #[arg(long, default_value = "财务自由")]
        probe: String,
    },

    /// 상태 확인
    Status,
}

impl Cli {
    /// 명령별 기본 로그 레벨
    ///
    /// 대화형 출력과 로그가 섞이지 않도록 ingest 외에는 warn이 기본입니다.
    pub fn log_level(&self) -> tracing::Level {
        match (self.global.verbose, &self.command) {
            (0, Commands::Ingest { .. }) => tracing::Level::INFO,
            (0, _) => tracing::Level::WARN,
            (1, _) => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        }
    }
}

impl GlobalArgs {
    /// 환경변수 설정 위에 CLI 플래그 적용
    pub fn apply(&self, mut config: Config) -> Config {
        if let Some(dir) = &self.docs_dir {
            config.docs_dir = dir.clone();
        }
        if let Some(dir) = &self.index_dir {
            config.index_dir = dir.clone();
        }
        if let Some(url) = &self.ollama_url {
            config.ollama_url = normalize_base_url(url);
        }
        if let Some(model) = &self.embed_model {
            config.embedding_model = model.clone();
        }
        if let Some(dim) = self.embed_dim {
            config.embedding_dimension = dim;
        }
        if let Some(model) = &self.chat_model {
            config.generation_model = model.clone();
        }
        if let Some(t) = self.temperature {
            config.temperature = t;
        }
        config
    }
}

/// `RUST_LOG`가 있으면 그대로 따르고, 없으면 `default_level`
pub fn env_filter(default_level: tracing::Level) -> tracing_subscriber::EnvFilter {
    env_filter_from(default_level, std::env::var("RUST_LOG").ok().as_deref())
}

fn env_filter_from(
    default_level: tracing::Level,
    directives: Option<&str>,
) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::builder()
        .with_default_directive(default_level.into())
        .parse_lossy(directives.unwrap_or_default())
}

// ============================================================================
// CLI Runner
// ============================================================================

/// CLI 명령어 실행
pub async fn run(cli: Cli) -> Result<()> {
    let config = cli
        .global
        .apply(Config::from_env().context("환경변수 설정 오류")?);
    config.validate().context("설정 검증 실패")?;

    let mut ctx = RagContext::open(config)
        .await
        .context("RAG 컨텍스트 초기화 실패")?
        .with_min_score(cli.global.min_score);

    match cli.command {
        Commands::Ingest { docs } => cmd_ingest(&mut ctx, docs).await,
        Commands::Chat { top_k } => cmd_chat(&ctx, top_k).await,
        Commands::Search { top_k } => cmd_search(&ctx, top_k).await,
        Commands::Query { query, top_k, json } => cmd_query(&ctx, &query, top_k, json).await,
        Commands::Ask { question, top_k } => cmd_ask(&ctx, &question, top_k).await,
        Commands::View { samples, probe } => cmd_view(&ctx, samples, &probe).await,
        Commands::Status => cmd_status(&ctx).await,
    }
}

// ============================================================================
// Command Implementations
// ============================================================================

/// 인덱스 구축 명령어 (ingest)
///
/// 문서 폴더의 PDF를 모두 색인하여 기존 인덱스를 교체합니다.
/// 실패하면 기존 인덱스는 그대로 남습니다.
async fn cmd_ingest(ctx: &mut RagContext, docs: Option<PathBuf>) -> Result<()> {
    let docs_dir = docs.unwrap_or_else(|| ctx.config().docs_dir.clone());

    println!("[*] 문서 폴더: {}", docs_dir.display());
    println!("[*] 인덱스 위치: {}", ctx.config().index_dir.display());
    println!(
        "[*] 청크 크기 {} / 오버랩 {}, 임베딩 모델 {}",
        ctx.config().chunk_size,
        ctx.config().chunk_overlap,
        ctx.config().embedding_model
    );
    println!();

    let report = match ctx.ingest(&docs_dir).await {
        Ok(report) => report,
        Err(e) => {
            print_error(&e);
            if !matches!(ctx.index_state(), IndexState::Uninitialized) {
                println!("    기존 인덱스는 변경되지 않았습니다.");
            }
            return Err(e).context("인덱스 구축 실패");
        }
    };

    println!("[OK] 인덱스 구축 완료");
    println!("     문서: {} 개", report.documents);
    println!("     페이지: {} 쪽", report.pages);
    println!("     청크: {} 개", report.chunks);
    println!("     소요 시간: {:.1}초", report.elapsed.as_secs_f64());

    Ok(())
}

/// 대화형 질의응답 명령어 (chat)
async fn cmd_chat(ctx: &RagContext, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(ctx.config().top_k);

    println!("pdf-rag 문서 질의응답");
    println!("{}", "=".repeat(60));
    print_state_line(ctx);
    println!("종료: quit / exit / q / 종료   명령: /clear /history /examples /status");
    println!("{}", "=".repeat(60));

    let mut session = ChatSession::new(ctx, top_k);
    let mut rl = Editor::<(), DefaultHistory>::new().context("터미널 초기화 실패")?;

    loop {
        let line = match rl.readline("\n질문> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("입력 읽기 실패"),
        };

        match SessionCommand::parse(&line) {
            SessionCommand::Exit => break,
            SessionCommand::Empty => {
                println!("[!] 유효한 질문을 입력하세요.");
                continue;
            }
            SessionCommand::Clear => {
                session.clear();
                println!("[OK] 대화 기록을 지웠습니다.");
            }
            SessionCommand::History => {
                let recent = session.conversation().recent_questions(5);
                if recent.is_empty() {
                    println!("[!] 아직 질문이 없습니다.");
                }
                for (i, q) in recent.iter().enumerate() {
                    println!("  {}. {}", i + 1, q);
                }
            }
            SessionCommand::Examples => {
                println!("예시 질문:");
                for q in EXAMPLE_QUESTIONS {
                    println!("  - {}", q);
                }
            }
            SessionCommand::Status => {
                print_state_line(ctx);
                println!(
                    "[*] 대화: {}회 답변 / 총 {}개 메시지",
                    session.conversation().answered_turns(),
                    session.conversation().messages().len()
                );
            }
            SessionCommand::Question(question) => {
                let _ = rl.add_history_entry(question.as_str());
                println!("[*] 검색 및 답변 생성 중...");

                match session.ask(&question).await {
                    Ok(reply) => {
                        println!("\n[답변]\n{}", reply.content);
                        print_sources(&reply.sources);
                    }
                    Err(e) => print_error(&e),
                }
            }
        }
    }

    println!("\n안녕히 가세요!");
    Ok(())
}

/// 대화형 검색 명령어 (search)
async fn cmd_search(ctx: &RagContext, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(ctx.config().top_k);

    println!("pdf-rag 문서 검색 (답변 생성 없음)");
    println!("{}", "=".repeat(60));
    print_state_line(ctx);
    println!("종료: quit / exit / q / 종료");
    println!("{}", "=".repeat(60));

    let mut rl = Editor::<(), DefaultHistory>::new().context("터미널 초기화 실패")?;

    loop {
        let line = match rl.readline("\n검색어> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("입력 읽기 실패"),
        };

        match SessionCommand::parse(&line) {
            SessionCommand::Exit => break,
            SessionCommand::Empty => println!("[!] 유효한 검색어를 입력하세요."),
            SessionCommand::Examples => {
                for q in EXAMPLE_QUESTIONS {
                    println!("  - {}", q);
                }
            }
            SessionCommand::Status => print_state_line(ctx),
            SessionCommand::Clear | SessionCommand::History => {
                println!("[!] 검색 모드에서는 대화 기록이 없습니다.");
            }
            SessionCommand::Question(query) => {
                let _ = rl.add_history_entry(query.as_str());
                match ctx.search_with_score(&query, top_k).await {
                    Ok(results) if results.is_empty() => println!("[!] 관련 문서를 찾지 못했습니다."),
                    Ok(results) => print_scored(&results, PREVIEW_CHARS),
                    Err(e) => print_error(&e),
                }
            }
        }
    }

    println!("\n검색을 종료합니다.");
    Ok(())
}

/// 빠른 검색 명령어 (query)
async fn cmd_query(ctx: &RagContext, query: &str, top_k: Option<usize>, json: bool) -> Result<()> {
    let top_k = top_k.unwrap_or(ctx.config().top_k);

    let chunks = ctx
        .quick_search(query, top_k)
        .await
        .map_err(report)
        .context("검색 실패")?;

    if json {
        println!("{}", serde_json::to_string_pretty(&chunks)?);
        return Ok(());
    }

    if chunks.is_empty() {
        println!("[!] 검색 결과가 없습니다.");
        return Ok(());
    }

    println!("[OK] 검색 결과 ({} 건):\n", chunks.len());
    print_chunks(&chunks, PREVIEW_CHARS);
    Ok(())
}

/// 단일 질문 명령어 (ask)
async fn cmd_ask(ctx: &RagContext, question: &str, top_k: Option<usize>) -> Result<()> {
    let top_k = top_k.unwrap_or(ctx.config().top_k);

    println!("[*] 검색 및 답변 생성 중...");
    let answer = ctx
        .answer(question, top_k)
        .await
        .map_err(report)
        .context("답변 생성 실패")?;

    println!("\n[답변]\n{}", answer.text);
    print_sources(&answer.sources);
    Ok(())
}

/// 인덱스 확인 명령어 (view)
async fn cmd_view(ctx: &RagContext, samples: usize, probe: &str) -> Result<()> {
    println!("[*] 인덱스 위치: {}", ctx.config().index_dir.display());

    let stats = ctx.stats().await.map_err(report).context("인덱스 조회 실패")?;
    println!("[OK] 저장된 청크: {} 개", stats.entries);
    println!("[OK] 문서 수: {} 개", stats.documents);

    if samples > 0 {
        let chunks = ctx.all_chunks().await.map_err(report).context("청크 조회 실패")?;
        println!("\n샘플 청크 (처음 {} 개):", samples.min(chunks.len()));
        print_chunks(&chunks[..samples.min(chunks.len())], PREVIEW_CHARS);
    }

    println!("[*] 테스트 검색: \"{}\"", probe);
    match ctx.search_with_score(probe, PROBE_TOP_K).await {
        Ok(results) if results.is_empty() => println!("[!] 검색 결과가 없습니다."),
        Ok(results) => print_scored(&results, PROBE_PREVIEW_CHARS),
        Err(e) => print_error(&e),
    }

    Ok(())
}

/// 상태 명령어 (status)
async fn cmd_status(ctx: &RagContext) -> Result<()> {
    let config = ctx.config();

    println!("pdf-rag v{}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("[*] 문서 폴더: {}", config.docs_dir.display());
    println!("[*] 인덱스 위치: {}", config.index_dir.display());
    println!("[*] Ollama: {}", config.ollama_url);
    println!(
        "[*] 임베딩 모델: {} ({}차원)",
        config.embedding_model, config.embedding_dimension
    );
    println!(
        "[*] 생성 모델: {} (temperature {})",
        config.generation_model, config.temperature
    );
    println!();

    print_state_line(ctx);

    if let Some(manifest) = ctx.manifest() {
        println!(
            "     빌드: {} | 임베딩 {} | 청크 {}/{}",
            manifest.built_at.format("%Y-%m-%d %H:%M"),
            manifest.embedding_model,
            manifest.chunk_size,
            manifest.chunk_overlap
        );
        if manifest.embedding_model != config.embedding_model {
            println!(
                "[!] 인덱스 임베딩 모델({})이 현재 설정({})과 다릅니다. 다시 ingest 하세요.",
                manifest.embedding_model, config.embedding_model
            );
        }

        for doc in ctx.documents() {
            println!("     - {} ({}쪽, 청크 {}개)", doc.source, doc.pages, doc.chunks);
        }

        let stale = ctx.stale_documents();
        if !stale.is_empty() {
            println!("[!] 색인 이후 변경되었거나 없어진 문서 {} 개:", stale.len());
            for source in stale {
                println!("     - {}", source);
            }
            println!("    `pdf-rag ingest` 로 인덱스를 갱신하세요.");
        }
    }

    Ok(())
}

// ============================================================================
// Helper Functions
// ============================================================================

/// 인덱스 상태 한 줄 출력
fn print_state_line(ctx: &RagContext) {
    match ctx.index_state() {
        IndexState::Ready { entries } => println!("[OK] 지식베이스: {} 개 청크", entries),
        IndexState::Uninitialized => {
            println!("[!] 지식베이스가 없습니다. 먼저 `pdf-rag ingest` 를 실행하세요.")
        }
        IndexState::Corrupt { reason } => {
            println!("[!] 지식베이스를 읽을 수 없습니다: {}", reason);
            println!("    `pdf-rag ingest` 로 다시 구축하세요.");
        }
    }
}

/// 에러와 안내 문구 출력
fn print_error(err: &RagError) {
    println!("[!] {}", err);
    if let Some(hint) = err.hint() {
        println!("    {}", hint);
    }
}

/// 안내 문구를 출력하고 anyhow 에러로 변환
fn report(err: RagError) -> anyhow::Error {
    if let Some(hint) = err.hint() {
        eprintln!("[!] {}", hint);
    }
    err.into()
}

/// 근거 청크 출력
fn print_sources(sources: &[ScoredChunk]) {
    if sources.is_empty() {
        return;
    }
    println!("\n[참고 문서]");
    for (i, source) in sources.iter().enumerate() {
        println!(
            "  {}. {} ({}페이지, 유사도: {:.3})",
            i + 1,
            source.chunk.metadata.source,
            source.chunk.metadata.page,
            source.score
        );
        println!("     {}", truncate_text(&source.chunk.text, PREVIEW_CHARS));
    }
}

/// 점수와 함께 검색 결과 출력
fn print_scored(results: &[ScoredChunk], preview: usize) {
    for (i, result) in results.iter().enumerate() {
        println!("\n--- 결과 {} (유사도: {:.3}) ---", i + 1, result.score);
        println!("출처: {}", result.chunk.metadata.source);
        println!("페이지: {}", result.chunk.metadata.page);
        println!("내용: {}", truncate_text(&result.chunk.text, preview));
    }
}

/// 청크 목록 출력
fn print_chunks(chunks: &[Chunk], preview: usize) {
    for (i, chunk) in chunks.iter().enumerate() {
        println!("{}. {} ({}페이지)", i + 1, chunk.metadata.source, chunk.metadata.page);
        println!("   내용: {}", truncate_text(&chunk.text, preview));
        println!();
    }
}

/// 텍스트 자르기 (UTF-8 안전)
fn truncate_text(text: &str, max_chars: usize) -> String {
    let cleaned = text.replace('\n', " ").replace('\r', "");
    let cleaned = cleaned.trim();

    if cleaned.chars().count() <= max_chars {
        cleaned.to_string()
    } else {
        let truncated: String = cleaned.chars().take(max_chars).collect();
        format!("{}...", truncated)
    }
}

// ============================================================================
// Tests
// ============================================================================
