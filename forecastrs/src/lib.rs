use tracing_log::LogTracer;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// tracing 초기화 함수
/// JSON 구조화 로그와 스팬 트레이싱을 제공하며, RUST_LOG로 레벨을 제어한다.
pub fn init_tracing() -> Result<(), String> {
    // 기존 log! 매크로 호환 (의존 crate 로그 수집)
    LogTracer::init().map_err(|e| {
        eprintln!("Failed to set LogTracer: {}", e);
        format!("로그 시스템 초기화 실패: {}", e)
    })?;

    // JSON 구조화 로그 + RUST_LOG 기반 레벨 필터링 + 파일/라인/스레드 정보 포함
    let subscriber = Registry::default()
        .with(EnvFilter::from_default_env())
        .with(
            fmt::layer()
                .json()
                .with_file(true)
                .with_line_number(true)
                .with_target(true)
                .with_thread_ids(true)
                .with_thread_names(true),
        );

    tracing::subscriber::set_global_default(subscriber).map_err(|e| {
        eprintln!("Failed to set tracing subscriber: {}", e);
        format!("로그 시스템 초기화 실패: {}", e)
    })?;

    Ok(())
}

pub mod data_reader;
pub mod export;
pub mod features;
pub mod inference;
pub mod labeling;
pub mod panel;
pub mod pipeline;
pub mod sector_manager;
pub mod sequence;
pub mod split;
pub mod tensor;
pub mod types;
pub mod utility;

#[cfg(test)]
pub(crate) mod test_support;
