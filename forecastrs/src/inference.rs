//! 단일 종목 추론 입력 생성과 모델 출력 변환
//!
//! 추론 입력은 학습 번들과 같은 함수(`TickerPanel::window_as_of`,
//! `TensorBundle::assemble`)로 만든다. 일봉은 as_of에서 자른 뒤 패널을 새로 구성하므로
//! as_of 이후 데이터는 어떤 경로로도 들어오지 않는다.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

use crate::data_reader::DailyPanel;
use crate::features::{LongTermStats, StaticFeatureTable, ValuationImputer};
use crate::panel::TickerPanel;
use crate::pipeline::screened_tickers;
use crate::sector_manager::{SectorMapper, ValuationTable};
use crate::sequence::SanitizeStats;
use crate::tensor::TensorBundle;
use crate::utility::config::PipelineConfig;
use crate::utility::constants::UNKNOWN_SECTOR_NAME;
use crate::utility::errors::{ForecastError, ForecastResult};

/// 추론 한 건의 입력
#[derive(Debug, Clone)]
pub struct InferenceInput {
    pub ticker: String,
    pub as_of: NaiveDate,
    /// as_of 주의 CloseWeek (조정 종가)
    pub current_price: f64,
    pub sector: Option<String>,
    pub bundle: TensorBundle,
    pub sanitize: SanitizeStats,
}

/// JSON 저장용 (배치 차원 없이)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceRecord {
    pub ticker: String,
    pub as_of_date: NaiveDate,
    pub current_price: f64,
    pub sector: String,
    pub weekly_seq: Vec<Vec<f32>>,
    pub static_features: Vec<f32>,
    pub position_features: Vec<f32>,
    pub sector_id: i64,
    pub sanitized_values: usize,
}

impl InferenceInput {
    pub fn to_record(&self) -> InferenceRecord {
        InferenceRecord {
            ticker: self.ticker.clone(),
            as_of_date: self.as_of,
            current_price: self.current_price,
            sector: self
                .sector
                .clone()
                .unwrap_or_else(|| UNKNOWN_SECTOR_NAME.to_string()),
            weekly_seq: self
                .bundle
                .weekly_seq
                .outer_iter()
                .map(|row| row.to_vec())
                .collect(),
            static_features: self.bundle.static_features.to_vec(),
            position_features: self.bundle.position_features.to_vec(),
            sector_id: self.bundle.sector_id,
            sanitized_values: self.sanitize.sanitized,
        }
    }
}

pub struct InferencePipeline {
    config: PipelineConfig,
    valuations: ValuationTable,
    sectors: SectorMapper,
}

impl InferencePipeline {
    pub fn new(config: PipelineConfig, valuations: ValuationTable, sectors: SectorMapper) -> ForecastResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            valuations,
            sectors,
        })
    }

    pub fn sectors(&self) -> &SectorMapper {
        &self.sectors
    }

    /// (종목, as_of) 추론 입력 생성. as_of가 없으면 종목의 마지막 일봉 날짜.
    ///
    /// 윈도우가 부족하면 InsufficientWindow를 그대로 반환한다 (0으로 채우지 않는다).
    pub fn prepare(&self, daily: &DailyPanel, ticker: &str, as_of: Option<NaiveDate>) -> ForecastResult<InferenceInput> {
        let series = daily
            .get(ticker)
            .ok_or_else(|| ForecastError::ticker_not_found(ticker))?;
        let as_of = match as_of.or_else(|| series.last_date()) {
            Some(date) => date,
            None => return Err(ForecastError::ticker_not_found(ticker)),
        };

        let panel = TickerPanel::build(series.truncated(as_of));
        let window = panel.window_as_of(as_of, self.config.n_weeks_input)?;

        // 보간 중앙값은 학습과 같은 모집단에서 계산
        let imputer = ValuationImputer::fit(
            screened_tickers(daily, self.config.min_daily_records),
            &self.valuations,
        );
        let stats = LongTermStats::compute(
            &panel.rows_as_of(as_of, usize::MAX),
            as_of,
            self.config.lookback_years,
            self.config.min_static_weeks,
        );
        let statics = StaticFeatureTable::build_with_imputer(
            as_of,
            vec![(ticker.to_string(), stats)],
            &self.valuations,
            &imputer,
        );
        let static_features = statics
            .features(ticker)
            .ok_or_else(|| ForecastError::ticker_not_found(ticker))?;

        let sector = self.valuations.sector_of(ticker).map(str::to_string);
        let sector_id = self.sectors.id_of(sector.as_deref());
        let current_price = window
            .last_close()
            .ok_or_else(|| ForecastError::insufficient_window(ticker, as_of, 0, self.config.n_weeks_input))?;

        let (bundle, sanitize) = TensorBundle::assemble(&window, static_features, as_of, sector_id)?;
        sanitize.ensure_within(self.config.max_sanitized_rate)?;
        if sanitize.sanitized > 0 {
            debug!("{} 비정상 값 {}개 치환", ticker, sanitize.sanitized);
        }

        info!(
            "추론 입력 생성: {} (기준일 {}, 현재가 {:.2}, 섹터 ID {})",
            ticker, as_of, current_price, sector_id
        );
        Ok(InferenceInput {
            ticker: ticker.to_string(),
            as_of,
            current_price,
            sector,
            bundle,
            sanitize,
        })
    }
}

fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// m개월 후 예측
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyPrediction {
    pub month: u32,
    pub log_return: f64,
    pub predicted_price: f64,
    #[serde(rename = "return")]
    pub simple_return: f64,
}

/// 모델 출력(월별 로그 수익률)을 가격/단순 수익률로 변환한 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionSummary {
    pub ticker: String,
    pub as_of_date: NaiveDate,
    pub current_price: f64,
    pub predictions: Vec<MonthlyPrediction>,
    pub predicted_12m_log_return: f64,
    pub predicted_12m_price: f64,
    pub predicted_12m_return: f64,
    pub sector: String,
}

impl PredictionSummary {
    /// 수익률은 소수 6자리, 가격은 2자리로 반올림
    /// 헤드라인(predicted_12m_*)은 마지막 horizon 값
    pub fn from_log_returns(
        input: &InferenceInput,
        log_returns: &[f64],
    ) -> ForecastResult<Self> {
        let last = *log_returns
            .last()
            .ok_or_else(|| ForecastError::validation("log_returns", "모델 출력이 비어 있습니다"))?;
        let current_price = input.current_price;

        let predictions = log_returns
            .iter()
            .enumerate()
            .map(|(i, &log_return)| MonthlyPrediction {
                month: i as u32 + 1,
                log_return: round_to(log_return, 6),
                predicted_price: round_to(current_price * log_return.exp(), 2),
                simple_return: round_to(log_return.exp() - 1.0, 6),
            })
            .collect();

        Ok(Self {
            ticker: input.ticker.clone(),
            as_of_date: input.as_of,
            current_price: round_to(current_price, 2),
            predictions,
            predicted_12m_log_return: round_to(last, 6),
            predicted_12m_price: round_to(current_price * last.exp(), 2),
            predicted_12m_return: round_to(last.exp() - 1.0, 6),
            sector: input
                .sector
                .clone()
                .unwrap_or_else(|| UNKNOWN_SECTOR_NAME.to_string()),
        })
    }
}

/// 학습 시 저장된 metadata.json의 sector_mapping을 복원한다
/// 파일이 없거나 매핑이 비어 있으면 fallback (섹터 테이블) 사용
pub fn load_sector_mapping(metadata_path: Option<&Path>, fallback: SectorMapper) -> ForecastResult<SectorMapper> {
    let path = match metadata_path {
        Some(path) if path.exists() => path,
        Some(path) => {
            warn!("메타데이터 파일 없음, 섹터 테이블 사용: {}", path.display());
            return Ok(fallback);
        }
        None => return Ok(fallback),
    };

    let content = fs::read_to_string(path)
        .map_err(|e| ForecastError::data_load(path.display().to_string(), e.to_string()))?;
    let metadata: serde_json::Value = serde_json::from_str(&content)?;

    let pairs: Vec<(String, i64)> = match metadata.get("sector_mapping").and_then(|v| v.as_object()) {
        Some(map) => map
            .iter()
            .map(|(name, id)| {
                id.as_i64()
                    .map(|id| (name.clone(), id))
                    .ok_or_else(|| ForecastError::parsing("sector_mapping", format!("정수가 아닌 ID: {}", name)))
            })
            .collect::<ForecastResult<_>>()?,
        None => Vec::new(),
    };
    if pairs.is_empty() {
        info!("메타데이터에 sector_mapping이 없어 섹터 테이블을 사용합니다");
        return Ok(fallback);
    }

    let mapper = SectorMapper::from_pairs(pairs)?;
    info!("모델 메타데이터에서 섹터 매핑 복원: {}개 섹터", mapper.mapping().len());
    Ok(mapper)
}
