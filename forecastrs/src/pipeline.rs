//! 학습 데이터셋 생성 파이프라인 (전체 / 파인튜닝)
//!
//! 종목 단위 작업(주봉 집계, 특징 계산, 샘플 생성, 텐서화)은 rayon으로 병렬 처리하고,
//! 전역 단계(밸류에이션 보간, 시간 순 정렬/분할)는 합친 뒤 단일 스레드로 수행한다.

use chrono::NaiveDate;
use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::{Duration, Instant};
use tracing::{info, warn};

use crate::data_reader::DailyPanel;
use crate::features::{LongTermStats, StaticFeatureTable};
use crate::labeling::{FinetuneWindow, GenerationStats, SampleGenerator, TickerSamples};
use crate::panel::TickerPanel;
use crate::sector_manager::{SectorMapper, ValuationTable};
use crate::split::{split_by_time, DatasetSplit};
use crate::tensor::{FeatureContext, TensorBatch};
use crate::types::DailySeries;
pub use crate::types::SkippedTicker;
use crate::utility::config::PipelineConfig;
use crate::utility::errors::{ForecastError, ForecastResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BuildMode {
    Full,
    Finetune,
}

impl FromStr for BuildMode {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "full" => Ok(Self::Full),
            "finetune" => Ok(Self::Finetune),
            other => Err(ForecastError::validation(
                "mode",
                format!("알 수 없는 모드: {} (full | finetune)", other),
            )),
        }
    }
}

impl fmt::Display for BuildMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Finetune => write!(f, "finetune"),
        }
    }
}

/// 종목을 제외해야 하면 그 이유
pub fn screen_reason(series: &DailySeries, min_daily_records: usize) -> Option<String> {
    if series.is_empty() {
        return Some("일봉 없음".to_string());
    }
    if series.len() < min_daily_records {
        return Some(
            ForecastError::InsufficientHistory {
                ticker: series.ticker().to_string(),
                available: series.len(),
                required: min_daily_records,
            }
            .to_string(),
        );
    }
    None
}

/// 최소 이력 필터를 통과하는 종목 (정적 특징/보간 모집단)
pub fn screened_tickers(daily: &DailyPanel, min_daily_records: usize) -> Vec<&str> {
    daily
        .tickers()
        .filter(|ticker| {
            daily
                .get(ticker)
                .map_or(false, |series| screen_reason(series, min_daily_records).is_none())
        })
        .collect()
}

/// 파이프라인 실행 결과 (텐서화 이전)
#[derive(Debug, Clone)]
pub struct DatasetBuild {
    pub mode: BuildMode,
    /// 정적 특징 기준일 = 전체 종목 중 가장 최근 일봉 날짜
    pub static_as_of: NaiveDate,
    pub panels: BTreeMap<String, TickerPanel>,
    pub statics: StaticFeatureTable,
    pub split: DatasetSplit,
    pub stats: GenerationStats,
    pub skipped: Vec<SkippedTicker>,
    pub finetune_window: Option<FinetuneWindow>,
}

/// split별 텐서 배치
#[derive(Debug, Clone)]
pub struct MaterializedSplits {
    pub train: TensorBatch,
    pub val: TensorBatch,
    pub test: TensorBatch,
}

impl MaterializedSplits {
    pub fn parts(&self) -> [(&'static str, &TensorBatch); 3] {
        [("train", &self.train), ("val", &self.val), ("test", &self.test)]
    }

    /// 전체 치환 비율
    pub fn sanitized_rate(&self) -> f64 {
        let mut total = self.train.sanitize;
        total.merge(self.val.sanitize);
        total.merge(self.test.sanitize);
        total.rate()
    }
}

fn progress_bar(len: usize, label: &str) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    let template = format!(
        "{{spinner:.green}} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} ({{eta}}) - {}",
        label
    );
    match ProgressStyle::default_bar().template(&template) {
        Ok(style) => pb.set_style(style.progress_chars("#>-")),
        Err(e) => warn!("진행률 표시 템플릿 오류: {}", e),
    }
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

pub struct TrainingPipeline {
    config: PipelineConfig,
    valuations: ValuationTable,
    sectors: SectorMapper,
}

impl TrainingPipeline {
    pub fn new(config: PipelineConfig, valuations: ValuationTable, sectors: SectorMapper) -> ForecastResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            valuations,
            sectors,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn sectors(&self) -> &SectorMapper {
        &self.sectors
    }

    pub fn valuations(&self) -> &ValuationTable {
        &self.valuations
    }

    /// 일봉 패널 -> 종목별 주봉 특징 패널 (최소 이력 미달 종목 제외)
    fn build_panels(&self, daily: DailyPanel) -> (BTreeMap<String, TickerPanel>, Vec<SkippedTicker>) {
        let series = daily.into_series();
        let pb = progress_bar(series.len(), "주봉 특징 계산 중");
        let min_records = self.config.min_daily_records;

        let results: Vec<Result<TickerPanel, SkippedTicker>> = series
            .into_par_iter()
            .map(|series| {
                let result = match screen_reason(&series, min_records) {
                    Some(reason) => Err(SkippedTicker {
                        ticker: series.ticker().to_string(),
                        reason,
                    }),
                    None => {
                        let panel = TickerPanel::build(series);
                        if panel.rows().is_empty() {
                            Err(SkippedTicker {
                                ticker: panel.ticker().to_string(),
                                reason: "주봉 없음".to_string(),
                            })
                        } else {
                            Ok(panel)
                        }
                    }
                };
                pb.inc(1);
                result
            })
            .collect();
        pb.finish_with_message("주봉 특징 계산 완료!");

        let mut panels = BTreeMap::new();
        let mut skipped = Vec::new();
        for result in results {
            match result {
                Ok(panel) => {
                    panels.insert(panel.ticker().to_string(), panel);
                }
                Err(skip) => skipped.push(skip),
            }
        }
        (panels, skipped)
    }

    fn build_statics(&self, panels: &BTreeMap<String, TickerPanel>, as_of: NaiveDate) -> StaticFeatureTable {
        let stats: Vec<(String, LongTermStats)> = panels
            .par_iter()
            .map(|(ticker, panel)| {
                let rows = panel.rows_as_of(as_of, usize::MAX);
                let stats = LongTermStats::compute(
                    &rows,
                    as_of,
                    self.config.lookback_years,
                    self.config.min_static_weeks,
                );
                (ticker.clone(), stats)
            })
            .collect();

        StaticFeatureTable::build(as_of, stats, &self.valuations)
    }

    fn generate_samples(
        &self,
        panels: &BTreeMap<String, TickerPanel>,
        window: Option<&FinetuneWindow>,
    ) -> TickerSamples {
        let generator = SampleGenerator::new(&self.config);
        let pb = progress_bar(panels.len(), "샘플 생성 중");

        let per_ticker: Vec<TickerSamples> = panels
            .par_iter()
            .map(|(_, panel)| {
                let result = match window {
                    Some(window) => generator.generate_finetune(panel, window),
                    None => generator.generate(panel),
                };
                pb.inc(1);
                result
            })
            .collect();
        pb.finish_with_message("샘플 생성 완료!");

        // 종목 순서대로 이어 붙인다
        let mut merged = TickerSamples::default();
        for ticker_samples in per_ticker {
            merged.samples.extend(ticker_samples.samples);
            merged.stats += ticker_samples.stats;
        }
        merged
    }

    /// 일봉 패널로 샘플을 만들고 시간 순으로 분할한다
    pub fn run(&self, daily: DailyPanel, mode: BuildMode) -> ForecastResult<DatasetBuild> {
        let start = Instant::now();
        let static_as_of = daily
            .latest_date()
            .ok_or_else(|| ForecastError::validation("daily", "일봉 데이터가 비어 있습니다"))?;
        info!(
            "🚀 데이터셋 생성 시작: 모드 {}, {}개 종목, 최신 일봉 {}",
            mode,
            daily.len(),
            static_as_of
        );

        let mut skipped = daily.rejected().to_vec();
        let (panels, screened_out) = self.build_panels(daily);
        skipped.extend(screened_out);
        if !skipped.is_empty() {
            info!("제외된 종목: {}개", skipped.len());
        }
        if panels.is_empty() {
            return Err(ForecastError::validation(
                "daily",
                "최소 이력 조건을 만족하는 종목이 없습니다",
            ));
        }

        let statics = self.build_statics(&panels, static_as_of);

        let finetune_window = match mode {
            BuildMode::Full => None,
            BuildMode::Finetune => {
                let window = FinetuneWindow::new(
                    static_as_of,
                    self.config.n_horizons,
                    self.config.finetune.recent_months,
                )
                .ok_or_else(|| ForecastError::validation("finetune", "기준일 구간 계산 실패"))?;
                info!(
                    "파인튜닝 구간: 기준일 상한 {}, 최근 구간 시작 {}",
                    window.max_base_date, window.recent_cutoff
                );
                Some(window)
            }
        };

        let generated = self.generate_samples(&panels, finetune_window.as_ref());
        let stats = generated.stats;
        info!(
            "샘플 생성 결과: 후보 {} / 생성 {} / 윈도우 부족 {} / horizon 미해결 {} / 가격 오류 {} / 상한 초과 {} / 다운샘플링 제외 {}",
            stats.candidates,
            stats.generated,
            stats.insufficient_window,
            stats.unresolved_horizon,
            stats.invalid_price,
            stats.beyond_cap,
            stats.downsampled_out
        );
        if generated.samples.is_empty() {
            warn!("생성된 샘플이 없습니다");
        }

        let split = split_by_time(generated.samples, &self.config.split);
        info!("✅ 데이터셋 생성 완료: {:.2?}", start.elapsed());

        Ok(DatasetBuild {
            mode,
            static_as_of,
            panels,
            statics,
            split,
            stats,
            skipped,
            finetune_window,
        })
    }

    /// 분할된 샘플을 split별 텐서 배치로 만든다
    pub fn materialize(&self, build: &DatasetBuild) -> ForecastResult<MaterializedSplits> {
        let ctx = FeatureContext {
            panels: &build.panels,
            statics: &build.statics,
            sectors: &self.sectors,
            valuations: &self.valuations,
            config: &self.config,
        };

        let start = Instant::now();
        let [(train_name, train), (val_name, val), (test_name, test)] = build.split.parts();
        let splits = MaterializedSplits {
            train: ctx.materialize(train_name, train)?,
            val: ctx.materialize(val_name, val)?,
            test: ctx.materialize(test_name, test)?,
        };
        info!(
            "텐서 생성 완료: {:.2?} (치환 비율 {:.4})",
            start.elapsed(),
            splits.sanitized_rate()
        );
        Ok(splits)
    }
}
