//! 정적 특징 6개 (장기 통계 3 + 밸류에이션 3)
//!
//! 장기 통계는 종목별로 독립 계산하고, 밸류에이션 결측 보간은 모든 종목이
//! 모인 뒤 한 번에 수행한다: 섹터 중앙값 -> 전체 중앙값 -> 0.0

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{info, warn};

use super::rolling::{max_drawdown, median, nan_mean, sample_std};
use crate::sector_manager::ValuationTable;
use crate::types::{WeeklyColumn, WeeklyFeatureRow};
use crate::utility::constants::N_STATIC_FEATURES;

/// 장기 통계 (기준일 이전 lookback 기간)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LongTermStats {
    pub mean_return: f64,
    pub volatility: f64,
    pub max_drawdown: f64,
}

impl LongTermStats {
    /// rows: 한 종목의 주봉 특징 (오름차순)
    /// [as_of - lookback_years, as_of] 구간이 min_weeks 미만이면 0으로 채운다
    pub fn compute(
        rows: &[WeeklyFeatureRow],
        as_of: NaiveDate,
        lookback_years: u32,
        min_weeks: usize,
    ) -> Self {
        let cutoff = as_of
            .checked_sub_months(Months::new(lookback_years.saturating_mul(12)))
            .unwrap_or(NaiveDate::MIN);

        let start = rows.partition_point(|row| row.week_end() < cutoff);
        let end = rows.partition_point(|row| row.week_end() <= as_of);
        let window = &rows[start..end.max(start)];

        if window.len() < min_weeks {
            return Self::default();
        }

        let returns: Vec<f64> = window
            .iter()
            .map(|row| row.get(WeeklyColumn::RetWeek))
            .filter(|r| !r.is_nan())
            .collect();
        let closes: Vec<f64> = window
            .iter()
            .map(|row| row.get(WeeklyColumn::CloseWeek))
            .collect();

        let mean_return = if returns.is_empty() {
            0.0
        } else {
            nan_mean(&returns)
        };
        let volatility = if returns.len() > 1 {
            sample_std(&returns)
        } else {
            0.0
        };

        Self {
            mean_return,
            volatility,
            max_drawdown: max_drawdown(&closes),
        }
    }
}

/// 보간이 끝난 종목별 정적 특징
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StaticFeatureRecord {
    pub long_term_mean_return: f64,
    pub long_term_vol: f64,
    pub long_term_max_drawdown: f64,
    pub per: f64,
    pub pbr: f64,
    pub dividend_yield: f64,
}

impl StaticFeatureRecord {
    /// 정규 컬럼 순서의 벡터
    pub fn to_array(&self) -> [f64; N_STATIC_FEATURES] {
        [
            self.long_term_mean_return,
            self.long_term_vol,
            self.long_term_max_drawdown,
            self.per,
            self.pbr,
            self.dividend_yield,
        ]
    }
}

/// 보간 단계별로 채워진 값의 개수
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ImputationReport {
    pub direct: usize,
    pub sector_median: usize,
    pub global_median: usize,
    pub zero_filled: usize,
}

/// 모집단에서 학습한 섹터별/전체 중앙값
#[derive(Debug, Clone, Default)]
pub struct ValuationImputer {
    sector_medians: BTreeMap<String, [Option<f64>; 3]>,
    global_medians: [Option<f64>; 3],
}

impl ValuationImputer {
    /// population: 정적 테이블에 들어가는 종목 목록
    pub fn fit<'a>(population: impl IntoIterator<Item = &'a str>, valuations: &ValuationTable) -> Self {
        let population: Vec<&str> = population.into_iter().collect();

        // 1단계용: 섹터별 원본 값
        let mut by_sector: BTreeMap<String, [Vec<f64>; 3]> = BTreeMap::new();
        for ticker in &population {
            if let Some(sector) = valuations.sector_of(ticker) {
                let values = valuations.valuation_of(ticker).as_array();
                let bucket = by_sector.entry(sector.to_string()).or_default();
                for (field, value) in values.iter().enumerate() {
                    if let Some(v) = value.filter(|v| !v.is_nan()) {
                        bucket[field].push(v);
                    }
                }
            }
        }
        let sector_medians: BTreeMap<String, [Option<f64>; 3]> = by_sector
            .into_iter()
            .map(|(sector, bucket)| {
                let medians = [median(&bucket[0]), median(&bucket[1]), median(&bucket[2])];
                (sector, medians)
            })
            .collect();

        // 2단계용: 1단계를 거친 뒤의 컬럼 중앙값
        let mut after_sector: [Vec<f64>; 3] = Default::default();
        for ticker in &population {
            let values = valuations.valuation_of(ticker).as_array();
            let sector_tier = valuations
                .sector_of(ticker)
                .and_then(|sector| sector_medians.get(sector));
            for field in 0..3 {
                let filled = values[field]
                    .filter(|v| !v.is_nan())
                    .or_else(|| sector_tier.and_then(|m| m[field]));
                if let Some(v) = filled {
                    after_sector[field].push(v);
                }
            }
        }
        let global_medians = [
            median(&after_sector[0]),
            median(&after_sector[1]),
            median(&after_sector[2]),
        ];

        Self {
            sector_medians,
            global_medians,
        }
    }

    /// 종목의 [PER, PBR, 배당수익률]을 3단계 보간으로 채운다
    pub fn impute(
        &self,
        ticker: &str,
        valuations: &ValuationTable,
        report: &mut ImputationReport,
    ) -> [f64; 3] {
        let values = valuations.valuation_of(ticker).as_array();
        let sector_tier = valuations
            .sector_of(ticker)
            .and_then(|sector| self.sector_medians.get(sector));

        let mut out = [0.0; 3];
        for field in 0..3 {
            out[field] = if let Some(v) = values[field].filter(|v| !v.is_nan()) {
                report.direct += 1;
                v
            } else if let Some(v) = sector_tier.and_then(|m| m[field]) {
                report.sector_median += 1;
                v
            } else if let Some(v) = self.global_medians[field] {
                report.global_median += 1;
                v
            } else {
                report.zero_filled += 1;
                0.0
            };
        }
        out
    }
}

/// 배치 기준일 하나에 대해 계산된 종목별 정적 특징 테이블
#[derive(Debug, Clone)]
pub struct StaticFeatureTable {
    as_of: NaiveDate,
    records: BTreeMap<String, StaticFeatureRecord>,
    report: ImputationReport,
}

impl StaticFeatureTable {
    /// 종목별 장기 통계를 모두 모은 뒤 (join 이후) 한 번에 보간
    pub fn build(
        as_of: NaiveDate,
        stats: Vec<(String, LongTermStats)>,
        valuations: &ValuationTable,
    ) -> Self {
        let imputer = ValuationImputer::fit(stats.iter().map(|(t, _)| t.as_str()), valuations);
        Self::build_with_imputer(as_of, stats, valuations, &imputer)
    }

    /// 이미 학습된 보간기로 테이블 생성 (추론 경로는 단일 종목 통계만 넘긴다)
    pub fn build_with_imputer(
        as_of: NaiveDate,
        stats: Vec<(String, LongTermStats)>,
        valuations: &ValuationTable,
        imputer: &ValuationImputer,
    ) -> Self {
        let mut report = ImputationReport::default();
        let mut records = BTreeMap::new();

        for (ticker, stat) in stats {
            let [per, pbr, dividend_yield] = imputer.impute(&ticker, valuations, &mut report);
            records.insert(
                ticker,
                StaticFeatureRecord {
                    long_term_mean_return: stat.mean_return,
                    long_term_vol: stat.volatility,
                    long_term_max_drawdown: stat.max_drawdown,
                    per,
                    pbr,
                    dividend_yield,
                },
            );
        }

        if report.zero_filled > 0 {
            warn!(
                "밸류에이션 값이 전혀 없는 필드가 있어 0.0으로 채웠습니다: {}건",
                report.zero_filled
            );
        }
        info!(
            "정적 특징 테이블 생성: {}개 종목 (기준일: {}, 직접 {} / 섹터 중앙값 {} / 전체 중앙값 {} / 0 {})",
            records.len(),
            as_of,
            report.direct,
            report.sector_median,
            report.global_median,
            report.zero_filled
        );

        Self {
            as_of,
            records,
            report,
        }
    }

    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    pub fn report(&self) -> ImputationReport {
        self.report
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<&StaticFeatureRecord> {
        self.records.get(ticker)
    }

    pub fn features(&self, ticker: &str) -> Option<[f64; N_STATIC_FEATURES]> {
        self.records.get(ticker).map(StaticFeatureRecord::to_array)
    }
}
