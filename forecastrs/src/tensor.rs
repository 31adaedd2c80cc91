//! 모델 입력 텐서 번들과 배치 조립
//!
//! 번들 하나 = weekly_seq (n_weeks × 23), static_features (6),
//! position_features (2), sector_id. 학습과 추론 모두 `TensorBundle::assemble`
//! 하나로 만든다.

use chrono::NaiveDate;
use ndarray::{Array1, Array2, Array3, Axis};
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::features::{position_features, StaticFeatureTable};
use crate::panel::TickerPanel;
use crate::sector_manager::{SectorMapper, ValuationTable};
use crate::sequence::{SanitizeStats, SequenceWindow};
use crate::types::Sample;
use crate::utility::config::PipelineConfig;
use crate::utility::constants::{N_POSITION_FEATURES, N_STATIC_FEATURES, N_WEEKLY_FEATURES};
use crate::utility::errors::{ForecastError, ForecastResult};

/// (종목, 날짜) 하나의 모델 입력
#[derive(Debug, Clone, PartialEq)]
pub struct TensorBundle {
    pub weekly_seq: Array2<f32>,
    pub static_features: Array1<f32>,
    pub position_features: Array1<f32>,
    pub sector_id: i64,
}

impl TensorBundle {
    /// 윈도우/정적 특징/날짜/섹터 ID로 번들을 만들고, 비정상 값을 0.0으로 치환한다
    pub fn assemble(
        window: &SequenceWindow,
        static_features: [f64; N_STATIC_FEATURES],
        date: NaiveDate,
        sector_id: i64,
    ) -> ForecastResult<(Self, SanitizeStats)> {
        let (weekly_seq, mut stats) = window.to_sanitized_array()?;

        let static_features: Array1<f32> = static_features
            .iter()
            .map(|&v| stats.sanitize(v))
            .collect();
        let position_features: Array1<f32> = position_features(date)
            .iter()
            .map(|&v| stats.sanitize(v))
            .collect();

        Ok((
            Self {
                weekly_seq,
                static_features,
                position_features,
                sector_id,
            },
            stats,
        ))
    }
}

/// 샘플 배치 (split 하나)
#[derive(Debug, Clone)]
pub struct TensorBatch {
    pub weekly_seq: Array3<f32>,
    pub static_features: Array2<f32>,
    pub position_features: Array2<f32>,
    pub sector_id: Array1<i64>,
    pub targets: Array2<f32>,
    pub sanitize: SanitizeStats,
}

impl TensorBatch {
    pub fn len(&self) -> usize {
        self.sector_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sector_id.is_empty()
    }

    /// 번들과 라벨을 쌓아서 배치로 만든다
    pub fn stack(
        bundles: Vec<TensorBundle>,
        targets: Vec<Vec<f64>>,
        n_weeks: usize,
        n_horizons: usize,
        sanitize: SanitizeStats,
    ) -> ForecastResult<Self> {
        let n = bundles.len();
        if targets.len() != n {
            return Err(ForecastError::validation(
                "targets",
                format!("번들 수({})와 라벨 수({})가 다릅니다", n, targets.len()),
            ));
        }

        let mut weekly = Vec::with_capacity(n * n_weeks * N_WEEKLY_FEATURES);
        let mut statics = Vec::with_capacity(n * N_STATIC_FEATURES);
        let mut positions = Vec::with_capacity(n * N_POSITION_FEATURES);
        let mut sectors = Vec::with_capacity(n);
        for bundle in &bundles {
            weekly.extend(bundle.weekly_seq.iter().copied());
            statics.extend(bundle.static_features.iter().copied());
            positions.extend(bundle.position_features.iter().copied());
            sectors.push(bundle.sector_id);
        }

        let mut flat_targets = Vec::with_capacity(n * n_horizons);
        for row in &targets {
            if row.len() != n_horizons {
                return Err(ForecastError::validation(
                    "targets",
                    format!("horizon 수 불일치: {} != {}", row.len(), n_horizons),
                ));
            }
            flat_targets.extend(row.iter().map(|&v| v as f32));
        }

        Ok(Self {
            weekly_seq: Array3::from_shape_vec((n, n_weeks, N_WEEKLY_FEATURES), weekly)?,
            static_features: Array2::from_shape_vec((n, N_STATIC_FEATURES), statics)?,
            position_features: Array2::from_shape_vec((n, N_POSITION_FEATURES), positions)?,
            sector_id: Array1::from_vec(sectors),
            targets: Array2::from_shape_vec((n, n_horizons), flat_targets)?,
            sanitize,
        })
    }

    /// i번째 샘플의 번들 (검증/디버깅용)
    pub fn bundle(&self, index: usize) -> Option<TensorBundle> {
        if index >= self.len() {
            return None;
        }
        Some(TensorBundle {
            weekly_seq: self.weekly_seq.index_axis(Axis(0), index).to_owned(),
            static_features: self.static_features.index_axis(Axis(0), index).to_owned(),
            position_features: self.position_features.index_axis(Axis(0), index).to_owned(),
            sector_id: self.sector_id[index],
        })
    }
}

/// 번들 조립에 필요한 공유 참조 (읽기 전용, 스레드 간 공유)
pub struct FeatureContext<'a> {
    pub panels: &'a BTreeMap<String, TickerPanel>,
    pub statics: &'a StaticFeatureTable,
    pub sectors: &'a SectorMapper,
    pub valuations: &'a ValuationTable,
    pub config: &'a PipelineConfig,
}

impl<'a> FeatureContext<'a> {
    /// (종목, 날짜) 번들
    pub fn bundle(&self, ticker: &str, date: NaiveDate) -> ForecastResult<(TensorBundle, SanitizeStats)> {
        let panel = self
            .panels
            .get(ticker)
            .ok_or_else(|| ForecastError::ticker_not_found(ticker))?;
        let static_features = self
            .statics
            .features(ticker)
            .ok_or_else(|| ForecastError::ticker_not_found(ticker))?;

        let window = panel.window_as_of(date, self.config.n_weeks_input)?;
        let sector_id = self.sectors.id_for_ticker(ticker, self.valuations);
        TensorBundle::assemble(&window, static_features, date, sector_id)
    }

    /// 샘플 목록을 병렬로 번들화해서 배치로 쌓는다
    /// 치환 비율이 설정 상한을 넘으면 SanitizationRateExceeded
    pub fn materialize(&self, name: &str, samples: &[Sample]) -> ForecastResult<TensorBatch> {
        let bundles: Vec<(TensorBundle, SanitizeStats)> = samples
            .par_iter()
            .map(|sample| self.bundle(&sample.ticker, sample.base_date))
            .collect::<ForecastResult<Vec<_>>>()?;

        let mut sanitize = SanitizeStats::default();
        let bundles: Vec<TensorBundle> = bundles
            .into_iter()
            .map(|(bundle, stats)| {
                sanitize.merge(stats);
                bundle
            })
            .collect();

        debug!(
            "{} 비정상 값 치환: {}/{} ({:.4})",
            name,
            sanitize.sanitized,
            sanitize.total,
            sanitize.rate()
        );
        sanitize.ensure_within(self.config.max_sanitized_rate)?;

        let targets: Vec<Vec<f64>> = samples.iter().map(|s| s.target_returns.clone()).collect();
        let batch = TensorBatch::stack(
            bundles,
            targets,
            self.config.n_weeks_input,
            self.config.n_horizons as usize,
            sanitize,
        )?;

        info!(
            "✅ {} 텐서 생성 완료: weekly_seq {:?}, targets {:?}",
            name,
            batch.weekly_seq.shape(),
            batch.targets.shape()
        );
        Ok(batch)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::LongTermStats;
    use crate::sector_manager::{UniverseEntry, Valuation};
    use crate::test_support::trending_series;

    fn context_fixture() -> (BTreeMap<String, TickerPanel>, StaticFeatureTable, SectorMapper, ValuationTable) {
        let series = trending_series("AAA", 400, 10.0);
        let as_of = series.last_date().expect("non-empty");
        let mut panels = BTreeMap::new();
        panels.insert("AAA".to_string(), TickerPanel::build(series));

        let valuations = ValuationTable::from_entries(vec![UniverseEntry {
            ticker: "AAA".to_string(),
            sector: Some("Technology".to_string()),
            valuation: Valuation {
                per: Some(15.0),
                pbr: Some(1.2),
                dividend_yield: Some(f64::NAN),
            },
        }])
        .expect("valid universe");
        let statics = StaticFeatureTable::build(
            as_of,
            vec![("AAA".to_string(), LongTermStats::default())],
            &valuations,
        );
        let sectors = SectorMapper::from_pairs(vec![("Technology", 4)]).expect("valid sectors");
        (panels, statics, sectors, valuations)
    }

    #[test]
    fn test_materialize_batch_shapes() {
        let (panels, statics, sectors, valuations) = context_fixture();
        let config = PipelineConfig {
            n_weeks_input: 20,
            n_horizons: 2,
            max_sanitized_rate: 0.5,
            ..PipelineConfig::default()
        };
        let ctx = FeatureContext {
            panels: &panels,
            statics: &statics,
            sectors: &sectors,
            valuations: &valuations,
            config: &config,
        };

        let base = panels["AAA"].series().bars()[200].date;
        let samples = vec![
            Sample {
                ticker: "AAA".to_string(),
                base_date: base,
                target_dates: vec![base, base],
                target_returns: vec![0.01, 0.02],
            },
            Sample {
                ticker: "AAA".to_string(),
                base_date: base.succ_opt().expect("date"),
                target_dates: vec![base, base],
                target_returns: vec![0.03, -0.04],
            },
        ];

        let batch = ctx.materialize("train", &samples).expect("batch");
        assert_eq!(batch.weekly_seq.shape(), &[2, 20, N_WEEKLY_FEATURES]);
        assert_eq!(batch.static_features.shape(), &[2, N_STATIC_FEATURES]);
        assert_eq!(batch.position_features.shape(), &[2, N_POSITION_FEATURES]);
        assert_eq!(batch.sector_id.to_vec(), vec![4, 4]);
        assert_eq!(batch.targets.shape(), &[2, 2]);
        assert!((batch.targets[[1, 1]] + 0.04).abs() < 1e-7);
        assert!(batch.weekly_seq.iter().all(|v| v.is_finite()));

        // 배치의 i번째 번들 == 단건 번들
        let (single, _) = ctx.bundle("AAA", base).expect("bundle");
        assert_eq!(batch.bundle(0), Some(single));
        assert!(batch.bundle(2).is_none());

        // PER/PBR은 그대로, NaN 배당수익률은 보간됨 (값이 없으므로 0)
        let statics_row = batch.static_features.row(0).to_vec();
        assert_eq!(statics_row[3], 15.0);
        assert!((statics_row[4] - 1.2).abs() < 1e-6);
        assert_eq!(statics_row[5], 0.0);
    }

    #[test]
    fn test_materialize_rejects_unknown_ticker_and_short_window() {
        let (panels, statics, sectors, valuations) = context_fixture();
        let config = PipelineConfig::default();
        let ctx = FeatureContext {
            panels: &panels,
            statics: &statics,
            sectors: &sectors,
            valuations: &valuations,
            config: &config,
        };
        let base = panels["AAA"].series().bars()[200].date;

        assert!(matches!(
            ctx.bundle("ZZZ", base),
            Err(ForecastError::TickerNotFound { .. })
        ));
        // 80주 이력으로는 156주 윈도우를 만들 수 없다
        assert!(matches!(
            ctx.bundle("AAA", base),
            Err(ForecastError::InsufficientWindow { .. })
        ));
    }

    #[test]
    fn test_sanitization_rate_bound() {
        let (panels, statics, sectors, valuations) = context_fixture();
        let config = PipelineConfig {
            n_weeks_input: 20,
            n_horizons: 1,
            max_sanitized_rate: 0.0,
            ..PipelineConfig::default()
        };
        let ctx = FeatureContext {
            panels: &panels,
            statics: &statics,
            sectors: &sectors,
            valuations: &valuations,
            config: &config,
        };

        // 초기 구간 윈도우는 Ret52W가 NaN이므로 상한 0에서는 실패
        let base = panels["AAA"].series().bars()[120].date;
        let samples = vec![Sample {
            ticker: "AAA".to_string(),
            base_date: base,
            target_dates: vec![base],
            target_returns: vec![0.0],
        }];
        assert!(matches!(
            ctx.materialize("train", &samples),
            Err(ForecastError::SanitizationRateExceeded { .. })
        ));
    }
}
