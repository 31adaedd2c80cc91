use clap::Parser;
use forecastrs::{
    data_reader::{load_daily_snapshots, load_sectors, load_universe, SnapshotLoadOptions},
    export::DatasetExporter,
    init_tracing,
    pipeline::{BuildMode, TrainingPipeline},
    utility::config::Config,
    utility::errors::{ForecastError, ForecastResult},
};
use std::time::Instant;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "forecastrs")]
#[command(about = "Weekly feature and multi-horizon label dataset builder")]
struct Args {
    /// 설정 파일 경로 (기본값: config.toml)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// 생성 모드 (full/finetune)
    #[arg(short, long, default_value = "full")]
    mode: String,

    /// 출력 디렉터리 (기본값: 설정 파일의 data.output_dir)
    #[arg(long)]
    output_dir: Option<String>,

    /// 파인튜닝 다운샘플링 시드 (기본값: 설정 파일의 finetune.seed)
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ForecastResult<()> {
    let args = Args::parse();

    let mut config = Config::load_from_file(&args.config)?;

    // RUST_LOG가 없으면 설정 파일의 로그 레벨 사용
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", &config.logging.level);
    }
    init_tracing().map_err(|e| ForecastError::general(format!("로그 시스템 초기화 실패: {}", e)))?;

    info!("🚀 forecastrs 시작!");
    info!("📁 설정 파일: {}", args.config);

    let mode: BuildMode = args.mode.parse()?;
    if let Some(seed) = args.seed {
        config.finetune.seed = seed;
    }
    let output_dir = args
        .output_dir
        .clone()
        .unwrap_or_else(|| config.data.output_dir.clone());

    let load_options = match mode {
        BuildMode::Full => {
            info!("📊 전체 학습 데이터셋 모드");
            SnapshotLoadOptions::default()
        }
        BuildMode::Finetune => {
            info!(
                "🔧 파인튜닝 데이터셋 모드 (최근 {}년, 시드 {})",
                config.finetune.lookback_years, config.finetune.seed
            );
            SnapshotLoadOptions {
                lookback_days: Some(i64::from(config.finetune.lookback_years) * 365),
                as_of: None,
            }
        }
    };

    let start = Instant::now();
    let daily = load_daily_snapshots(&config.data.daily_data_dir, &load_options)?;
    let valuations = load_universe(&config.data.universe_path)?;
    let sectors = load_sectors(&config.data.sectors_path)?;

    let pipeline = TrainingPipeline::new(config.pipeline(), valuations, sectors)?;
    let build = match pipeline.run(daily, mode) {
        Ok(build) => build,
        Err(e) => {
            error!("데이터셋 생성 실패: {}", e);
            return Err(e);
        }
    };
    let splits = pipeline.materialize(&build)?;

    let metadata = DatasetExporter::new(&output_dir).export(&build, &splits, pipeline.sectors(), pipeline.config())?;

    info!(
        "✨ 완료: train {} / val {} / test {} -> {} ({:.2?})",
        metadata.split_counts.train,
        metadata.split_counts.val,
        metadata.split_counts.test,
        output_dir,
        start.elapsed()
    );
    Ok(())
}
