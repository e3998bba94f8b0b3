//! pdf-rag CLI 진입점

use anyhow::Result;
use clap::Parser;

fn main() -> Result<()> {
    let cli = pdf_rag::cli::Cli::parse();

    // 로깅 초기화 (stderr, RUST_LOG 없으면 명령별 기본 레벨)
    tracing_subscriber::fmt()
        .with_env_filter(pdf_rag::cli::env_filter(cli.log_level()))
        .with_writer(std::io::stderr)
        .init();

    // CLI 실행
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(pdf_rag::cli::run(cli))
}
