//! 종목 하나의 일봉/주봉/주봉 특징을 묶어 두는 패널
//!
//! 특정 날짜 D 기준 윈도우는 다음과 같이 정의된다:
//! D 이하 일봉을 주봉으로 집계 -> 특징 계산 -> week_end <= D 행 -> 마지막 n주.
//! 벌크 경로는 완료된 주의 행을 한 번만 계산해 두고, D가 속한 주만 D 이하
//! 일봉으로 다시 만든다. 특징이 모두 인과적이고 같은 행 함수로 계산되므로
//! 추론 경로(D에서 자른 일봉으로 만든 패널)와 비트 단위로 같은 윈도우가 나온다.

use chrono::NaiveDate;

use crate::features::{compute_weekly_features, compute_weekly_row, WeeklyAccumulator};
use crate::features::weekly::MAX_LOOKBACK_WEEKS;
use crate::features::weekly_bars::aggregate_weekly;
use crate::sequence::{extract_sequence, SequenceWindow};
use crate::types::{DailySeries, IsoWeekKey, WeeklyBar, WeeklyFeatureRow};
use crate::utility::errors::{ForecastError, ForecastResult};

#[derive(Debug, Clone)]
pub struct TickerPanel {
    series: DailySeries,
    weekly_bars: Vec<WeeklyBar>,
    rows: Vec<WeeklyFeatureRow>,
}

impl TickerPanel {
    /// 전체 이력으로 주봉과 특징을 한 번 계산
    pub fn build(series: DailySeries) -> Self {
        let weekly_bars = aggregate_weekly(series.bars());
        let rows = compute_weekly_features(&weekly_bars);
        Self {
            series,
            weekly_bars,
            rows,
        }
    }

    pub fn ticker(&self) -> &str {
        self.series.ticker()
    }

    pub fn series(&self) -> &DailySeries {
        &self.series
    }

    pub fn weekly_bars(&self) -> &[WeeklyBar] {
        &self.weekly_bars
    }

    pub fn rows(&self) -> &[WeeklyFeatureRow] {
        &self.rows
    }

    /// as_of가 속한 ISO 주 이전에 끝난 주의 개수
    fn completed_weeks_before(&self, as_of: NaiveDate) -> usize {
        let key = IsoWeekKey::from_date(as_of);
        self.weekly_bars.partition_point(|bar| bar.key < key)
    }

    /// as_of가 속한 주를 as_of 이하 일봉으로만 다시 집계
    fn partial_week(&self, as_of: NaiveDate) -> Option<WeeklyBar> {
        let key = IsoWeekKey::from_date(as_of);
        let daily = self.series.up_to(as_of);
        let start = daily.len()
            - daily
                .iter()
                .rev()
                .take_while(|bar| IsoWeekKey::from_date(bar.date) == key)
                .count();

        let mut acc = WeeklyAccumulator::new();
        for bar in &daily[start..] {
            acc.push(bar);
        }
        acc.finish()
    }

    /// as_of 기준으로 사용 가능한 주봉 특징 행 수
    pub fn weeks_available_as_of(&self, as_of: NaiveDate) -> usize {
        let completed = self.completed_weeks_before(as_of);
        completed + usize::from(self.partial_week(as_of).is_some())
    }

    /// as_of 기준 주봉 특징 행 (마지막 max_rows개까지)
    pub fn rows_as_of(&self, as_of: NaiveDate, max_rows: usize) -> Vec<WeeklyFeatureRow> {
        let completed = self.completed_weeks_before(as_of);
        let partial = self.partial_week(as_of);

        let current_row = partial.and_then(|bar| {
            if self.weekly_bars.get(completed) == Some(&bar) {
                // as_of가 이미 그 주의 마지막 거래일 이후: 전체 이력 행을 그대로 사용
                self.rows.get(completed).cloned()
            } else {
                let lookback_start = completed.saturating_sub(MAX_LOOKBACK_WEEKS - 1);
                let mut prefix: Vec<WeeklyBar> =
                    self.weekly_bars[lookback_start..completed].to_vec();
                prefix.push(bar);
                compute_weekly_row(&prefix).map(|features| WeeklyFeatureRow { bar, features })
            }
        });

        let keep_completed = max_rows.saturating_sub(usize::from(current_row.is_some()));
        let start = completed.saturating_sub(keep_completed);
        let mut rows: Vec<WeeklyFeatureRow> = self.rows[start..completed].to_vec();
        rows.extend(current_row);
        rows
    }

    /// as_of에서 끝나는 n_weeks 길이 윈도우 (학습/추론 공용)
    pub fn window_as_of(&self, as_of: NaiveDate, n_weeks: usize) -> ForecastResult<SequenceWindow> {
        let available = self.weeks_available_as_of(as_of);
        if available < n_weeks {
            return Err(ForecastError::insufficient_window(
                self.ticker(),
                as_of,
                available,
                n_weeks,
            ));
        }
        let rows = self.rows_as_of(as_of, n_weeks);
        extract_sequence(self.ticker(), &rows, as_of, n_weeks)
    }
}
