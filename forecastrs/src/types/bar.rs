use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utility::constants::{N_WEEKLY_FEATURES, WEEKLY_FEATURE_COLUMNS};
use crate::utility::errors::{ForecastError, ForecastResult};

/// 일봉 1개 (종목 코드는 소유한 DailySeries가 가진다)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DailyBar {
    pub date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub adj_close: f64,
    pub volume: f64,
}

/// 한 종목의 일봉 시계열
/// 생성 시 날짜 오름차순으로 정렬되며, 같은 날짜가 두 번 나오면 거부한다
#[derive(Debug, Clone, PartialEq)]
pub struct DailySeries {
    ticker: String,
    bars: Vec<DailyBar>,
}

impl DailySeries {
    pub fn new(ticker: impl Into<String>, mut bars: Vec<DailyBar>) -> ForecastResult<Self> {
        let ticker = ticker.into();
        bars.sort_by_key(|bar| bar.date);

        if let Some(pair) = bars.windows(2).find(|pair| pair[0].date == pair[1].date) {
            return Err(ForecastError::invalid_daily_series(
                ticker,
                format!("중복 날짜: {}", pair[0].date),
            ));
        }

        Ok(Self { ticker, bars })
    }

    pub fn ticker(&self) -> &str {
        &self.ticker
    }

    pub fn bars(&self) -> &[DailyBar] {
        &self.bars
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn first_date(&self) -> Option<NaiveDate> {
        self.bars.first().map(|bar| bar.date)
    }

    pub fn last_date(&self) -> Option<NaiveDate> {
        self.bars.last().map(|bar| bar.date)
    }

    /// as_of 이하 날짜의 일봉만 반환
    pub fn up_to(&self, as_of: NaiveDate) -> &[DailyBar] {
        let end = self.bars.partition_point(|bar| bar.date <= as_of);
        &self.bars[..end]
    }

    /// 정확히 해당 날짜의 일봉
    pub fn get(&self, date: NaiveDate) -> Option<&DailyBar> {
        self.bars
            .binary_search_by_key(&date, |bar| bar.date)
            .ok()
            .map(|idx| &self.bars[idx])
    }

    /// date 이후(당일 포함) 첫 번째 일봉
    pub fn first_on_or_after(&self, date: NaiveDate) -> Option<&DailyBar> {
        let idx = self.bars.partition_point(|bar| bar.date < date);
        self.bars.get(idx)
    }

    /// as_of 이하 구간만 담은 새 시계열 (추론 경로에서 사용)
    pub fn truncated(&self, as_of: NaiveDate) -> Self {
        Self {
            ticker: self.ticker.clone(),
            bars: self.up_to(as_of).to_vec(),
        }
    }

    /// from 이상 날짜만 남긴 새 시계열
    pub fn since(&self, from: NaiveDate) -> Self {
        let start = self.bars.partition_point(|bar| bar.date < from);
        Self {
            ticker: self.ticker.clone(),
            bars: self.bars[start..].to_vec(),
        }
    }
}

/// ISO 연도-주차 키 ("%G-W%V")
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct IsoWeekKey {
    pub year: i32,
    pub week: u32,
}

impl IsoWeekKey {
    pub fn from_date(date: NaiveDate) -> Self {
        let iso = date.iso_week();
        Self {
            year: iso.year(),
            week: iso.week(),
        }
    }
}

impl fmt::Display for IsoWeekKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-W{:02}", self.year, self.week)
    }
}

/// ISO 주 단위 OHLCV 집계
/// close는 주의 마지막 거래일 수정종가
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WeeklyBar {
    pub key: IsoWeekKey,
    /// 해당 주의 마지막 거래일
    pub week_end: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

/// 주봉 특징 컬럼 (정규 순서와 동일한 discriminant)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WeeklyColumn {
    OpenWeek,
    HighWeek,
    LowWeek,
    CloseWeek,
    VolumeWeek,
    RetWeek,
    Ret4W,
    Ret13W,
    Ret26W,
    Ret52W,
    Ma4W,
    Ma13W,
    Ma26W,
    PriceVsMa4W,
    PriceVsMa13W,
    PriceVsMa26W,
    PriceVs52WH,
    PriceVs52WL,
    Vol13W,
    Vol26W,
    VolumeRatio,
    BodyRatio,
    ClosePosInRange,
}

impl WeeklyColumn {
    pub const ALL: [WeeklyColumn; N_WEEKLY_FEATURES] = [
        Self::OpenWeek,
        Self::HighWeek,
        Self::LowWeek,
        Self::CloseWeek,
        Self::VolumeWeek,
        Self::RetWeek,
        Self::Ret4W,
        Self::Ret13W,
        Self::Ret26W,
        Self::Ret52W,
        Self::Ma4W,
        Self::Ma13W,
        Self::Ma26W,
        Self::PriceVsMa4W,
        Self::PriceVsMa13W,
        Self::PriceVsMa26W,
        Self::PriceVs52WH,
        Self::PriceVs52WL,
        Self::Vol13W,
        Self::Vol26W,
        Self::VolumeRatio,
        Self::BodyRatio,
        Self::ClosePosInRange,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    /// 모델 계약상의 컬럼 이름
    pub fn name(self) -> &'static str {
        WEEKLY_FEATURE_COLUMNS[self.index()]
    }
}

/// 주봉 + 23개 파생 특징
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklyFeatureRow {
    pub bar: WeeklyBar,
    pub features: [f64; N_WEEKLY_FEATURES],
}

impl WeeklyFeatureRow {
    pub fn get(&self, column: WeeklyColumn) -> f64 {
        self.features[column.index()]
    }

    pub fn week_end(&self) -> NaiveDate {
        self.bar.week_end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(date: NaiveDate, price: f64) -> DailyBar {
        DailyBar {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume: 1000.0,
        }
    }

    #[test]
    fn test_daily_series_sorts_and_rejects_duplicates() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 2).expect("Invalid test date");
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 3).expect("Invalid test date");

        let series = DailySeries::new("AAPL", vec![bar(d2, 2.0), bar(d1, 1.0)])
            .expect("series should build");
        assert_eq!(series.first_date(), Some(d1));
        assert_eq!(series.last_date(), Some(d2));

        let duplicated = DailySeries::new("AAPL", vec![bar(d1, 1.0), bar(d1, 1.5)]);
        assert!(matches!(
            duplicated,
            Err(ForecastError::InvalidDailySeries { .. })
        ));
    }

    #[test]
    fn test_daily_series_lookups() {
        let d1 = NaiveDate::from_ymd_opt(2024, 1, 5).expect("Invalid test date");
        let d2 = NaiveDate::from_ymd_opt(2024, 1, 8).expect("Invalid test date");
        let series =
            DailySeries::new("X", vec![bar(d1, 1.0), bar(d2, 2.0)]).expect("series should build");

        // 주말은 다음 거래일로 매칭
        let saturday = NaiveDate::from_ymd_opt(2024, 1, 6).expect("Invalid test date");
        assert_eq!(series.first_on_or_after(saturday).map(|b| b.date), Some(d2));
        assert_eq!(series.first_on_or_after(d1).map(|b| b.date), Some(d1));
        assert!(series.first_on_or_after(d2.succ_opt().expect("date")).is_none());

        assert_eq!(series.up_to(saturday).len(), 1);
        assert_eq!(series.truncated(saturday).len(), 1);
        assert_eq!(series.since(saturday).len(), 1);
        assert!(series.get(saturday).is_none());
        assert_eq!(series.get(d2).map(|b| b.close), Some(2.0));
    }

    #[test]
    fn test_iso_week_key_format() {
        // 2021-01-03(일)은 ISO 기준 2020년 53주차
        let date = NaiveDate::from_ymd_opt(2021, 1, 3).expect("Invalid test date");
        let key = IsoWeekKey::from_date(date);
        assert_eq!(key.to_string(), "2020-W53");

        let next = IsoWeekKey::from_date(date.succ_opt().expect("date"));
        assert_eq!(next.to_string(), "2021-W01");
        assert!(key < next);
    }

    #[test]
    fn test_weekly_column_order_matches_contract() {
        for (idx, column) in WeeklyColumn::ALL.iter().enumerate() {
            assert_eq!(column.index(), idx);
        }
        assert_eq!(WeeklyColumn::Ma13W.name(), "MA_13W");
        assert_eq!(WeeklyColumn::ClosePosInRange.name(), "ClosePosInRange");
        assert_eq!(WeeklyColumn::PriceVs52WL.name(), "PriceVs52WL");
    }
}
