//! 샘플/라벨 생성기
//!
//! 종목별로 모든 일봉 날짜를 기준일 후보로 보고, 다음 두 조건을 모두 만족할 때만
//! 샘플을 만든다.
//! 1. 기준일 이하로 n_weeks_input개의 주봉 특징 행이 있다
//! 2. m = 1..n_horizons 모두에 대해 (기준일 + m개월) 이후 첫 거래일이 존재한다
//! 하나라도 실패하면 샘플 전체를 버린다 (부분 horizon 샘플은 만들지 않는다).

use chrono::{Months, NaiveDate};
use rand::rngs::StdRng;
use rand::seq::index::sample as sample_indices;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use std::ops::AddAssign;

use crate::panel::TickerPanel;
use crate::types::{DailySeries, Sample};
use crate::utility::config::PipelineConfig;

/// 기준일 후보가 버려진 이유
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiscardReason {
    /// 주봉 윈도우 부족
    InsufficientWindow,
    /// 어떤 horizon의 미래 거래일이 없음
    UnresolvedHorizon,
    /// 기준/타겟 가격이 양의 유한값이 아님
    InvalidPrice,
}

/// 종목 하나(또는 전체 합계)의 샘플 생성 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct GenerationStats {
    pub candidates: usize,
    pub generated: usize,
    pub insufficient_window: usize,
    pub unresolved_horizon: usize,
    pub invalid_price: usize,
    /// 파인튜닝: 기준일 상한 이후라 제외된 후보
    pub beyond_cap: usize,
    /// 파인튜닝: 과거 구간 다운샘플링으로 제외된 샘플
    pub downsampled_out: usize,
}

impl GenerationStats {
    fn record_discard(&mut self, reason: DiscardReason) {
        match reason {
            DiscardReason::InsufficientWindow => self.insufficient_window += 1,
            DiscardReason::UnresolvedHorizon => self.unresolved_horizon += 1,
            DiscardReason::InvalidPrice => self.invalid_price += 1,
        }
    }
}

impl AddAssign for GenerationStats {
    fn add_assign(&mut self, other: Self) {
        self.candidates += other.candidates;
        self.generated += other.generated;
        self.insufficient_window += other.insufficient_window;
        self.unresolved_horizon += other.unresolved_horizon;
        self.invalid_price += other.invalid_price;
        self.beyond_cap += other.beyond_cap;
        self.downsampled_out += other.downsampled_out;
    }
}

/// 종목 하나의 생성 결과
#[derive(Debug, Clone, Default)]
pub struct TickerSamples {
    pub samples: Vec<Sample>,
    pub stats: GenerationStats,
}

/// 파인튜닝 기준일 구간
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinetuneWindow {
    pub latest_date: NaiveDate,
    /// 기준일 상한 (latest - n_horizons개월)
    pub max_base_date: NaiveDate,
    /// 이 날짜 이상이면 최근 구간
    pub recent_cutoff: NaiveDate,
}

impl FinetuneWindow {
    pub fn new(latest_date: NaiveDate, n_horizons: u32, recent_months: u32) -> Option<Self> {
        let max_base_date = latest_date.checked_sub_months(Months::new(n_horizons))?;
        let recent_cutoff = max_base_date.checked_sub_months(Months::new(recent_months))?;
        Some(Self {
            latest_date,
            max_base_date,
            recent_cutoff,
        })
    }
}

/// 기준일 + m개월 (월말 보정) 이후 첫 거래일을 horizon별로 찾는다
/// 하나라도 없으면 None
pub fn resolve_horizons(
    series: &DailySeries,
    base_date: NaiveDate,
    n_horizons: u32,
) -> Option<Vec<(NaiveDate, f64)>> {
    (1..=n_horizons)
        .map(|month| {
            let target = base_date.checked_add_months(Months::new(month))?;
            series
                .first_on_or_after(target)
                .map(|bar| (bar.date, bar.adj_close))
        })
        .collect()
}

fn valid_price(price: f64) -> bool {
    price.is_finite() && price > 0.0
}

/// 기준일 하나에 대한 샘플 생성 시도
pub fn build_sample(
    panel: &TickerPanel,
    base_index: usize,
    config: &PipelineConfig,
) -> Result<Sample, DiscardReason> {
    let series = panel.series();
    let base = series.bars()[base_index];

    if panel.weeks_available_as_of(base.date) < config.n_weeks_input {
        return Err(DiscardReason::InsufficientWindow);
    }

    let targets =
        resolve_horizons(series, base.date, config.n_horizons).ok_or(DiscardReason::UnresolvedHorizon)?;

    if !valid_price(base.adj_close) || targets.iter().any(|(_, price)| !valid_price(*price)) {
        return Err(DiscardReason::InvalidPrice);
    }

    Ok(Sample {
        ticker: panel.ticker().to_string(),
        base_date: base.date,
        target_dates: targets.iter().map(|(date, _)| *date).collect(),
        target_returns: targets
            .iter()
            .map(|(_, price)| (price / base.adj_close).ln())
            .collect(),
    })
}

/// 64-bit FNV-1a (종목별 시드 파생용)
fn fnv1a64(text: &str) -> u64 {
    const OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
    const PRIME: u64 = 0x0000_0100_0000_01b3;
    text.bytes()
        .fold(OFFSET, |hash, byte| (hash ^ byte as u64).wrapping_mul(PRIME))
}

/// 종목별 결정적 RNG: 스레드 스케줄링이나 다른 종목 구성과 무관하다
pub fn ticker_rng(seed: u64, ticker: &str) -> StdRng {
    StdRng::seed_from_u64(seed ^ fnv1a64(ticker))
}

pub struct SampleGenerator<'a> {
    config: &'a PipelineConfig,
}

impl<'a> SampleGenerator<'a> {
    pub fn new(config: &'a PipelineConfig) -> Self {
        Self { config }
    }

    /// 전체 학습용: 모든 일봉 날짜가 기준일 후보
    pub fn generate(&self, panel: &TickerPanel) -> TickerSamples {
        let mut out = TickerSamples::default();
        for index in 0..panel.series().len() {
            out.stats.candidates += 1;
            match build_sample(panel, index, self.config) {
                Ok(sample) => out.samples.push(sample),
                Err(reason) => out.stats.record_discard(reason),
            }
        }
        out.stats.generated = out.samples.len();
        out
    }

    /// 파인튜닝용: 기준일을 max_base_date 이하로 제한하고, 최근 구간은 전부,
    /// 과거 구간은 (최근 샘플 수 * history_ratio)개로 균등 무작위 다운샘플링
    pub fn generate_finetune(&self, panel: &TickerPanel, window: &FinetuneWindow) -> TickerSamples {
        let mut out = TickerSamples::default();
        let mut recent = Vec::new();
        let mut history = Vec::new();

        for (index, bar) in panel.series().bars().iter().enumerate() {
            out.stats.candidates += 1;
            if bar.date > window.max_base_date {
                out.stats.beyond_cap += 1;
                continue;
            }
            match build_sample(panel, index, self.config) {
                Ok(sample) if sample.base_date >= window.recent_cutoff => recent.push(sample),
                Ok(sample) => history.push(sample),
                Err(reason) => out.stats.record_discard(reason),
            }
        }

        let target = (recent.len() as f64 * self.config.finetune.history_ratio).floor() as usize;
        if history.len() > target {
            let mut rng = ticker_rng(self.config.finetune.seed, panel.ticker());
            let mut picked = sample_indices(&mut rng, history.len(), target).into_vec();
            // 시간 순서 유지
            picked.sort_unstable();
            out.stats.downsampled_out = history.len() - target;
            history = picked.into_iter().map(|i| history[i].clone()).collect();
        }

        out.samples = history;
        out.samples.extend(recent);
        out.stats.generated = out.samples.len();
        out
    }
}
