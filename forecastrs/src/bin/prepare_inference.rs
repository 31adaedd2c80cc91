use chrono::NaiveDate;
use clap::Parser;
use forecastrs::{
    data_reader::{load_daily_snapshots, load_sectors, load_universe, SnapshotLoadOptions},
    inference::{load_sector_mapping, InferencePipeline},
    init_tracing,
    utility::config::Config,
    utility::errors::{ForecastError, ForecastResult},
};
use std::fs::File;
use std::path::Path;
use tracing::info;

#[derive(Parser)]
#[command(name = "prepare_inference")]
#[command(about = "Build the model input bundle for one ticker as of a date")]
struct Args {
    /// 설정 파일 경로 (기본값: config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// 종목 코드
    #[arg(short, long)]
    ticker: String,

    /// 기준일 (YYYY-MM-DD, 기본값: 종목의 마지막 일봉 날짜)
    #[arg(long)]
    as_of: Option<String>,

    /// 출력 JSON 경로 (없으면 표준 출력)
    #[arg(short, long)]
    output: Option<String>,
}

fn main() -> ForecastResult<()> {
    let args = Args::parse();

    let config = Config::load_from_file(&args.config)?;
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &config.logging.level);
    }
    init_tracing().map_err(|e| ForecastError::general(format!("로그 시스템 초기화 실패: {}", e)))?;

    let as_of = args
        .as_of
        .as_deref()
        .map(|s| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .map_err(|e| ForecastError::parsing("as_of", format!("{}: {}", s, e)))
        })
        .transpose()?;

    info!("🚀 추론 입력 생성: {} (기준일: {:?})", args.ticker, as_of);

    // 보간 모집단이 학습과 같도록 전체 스냅샷을 읽는다
    let daily = load_daily_snapshots(&config.data.daily_data_dir, &SnapshotLoadOptions::default())?;
    let valuations = load_universe(&config.data.universe_path)?;
    let sectors = load_sector_mapping(
        config.data.metadata_path.as_deref().map(Path::new),
        load_sectors(&config.data.sectors_path)?,
    )?;

    let pipeline = InferencePipeline::new(config.pipeline(), valuations, sectors)?;
    let input = pipeline.prepare(&daily, &args.ticker, as_of)?;
    let record = input.to_record();

    match &args.output {
        Some(path) => {
            let file = File::create(path)?;
            serde_json::to_writer_pretty(file, &record)?;
            info!("✅ 추론 입력 저장: {}", path);
        }
        None => println!("{}", serde_json::to_string_pretty(&record)?),
    }
    Ok(())
}
