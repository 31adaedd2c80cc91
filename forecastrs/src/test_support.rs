//! 테스트용 합성 일봉 생성기

use chrono::{Datelike, NaiveDate, Weekday};

use crate::types::{DailyBar, DailySeries};

/// 기본 시작일 (2015-01-05, 월요일)
pub fn default_start() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 1, 5).expect("Invalid test date")
}

/// start부터 주말을 건너뛴 n개의 거래일
pub fn weekday_dates(start: NaiveDate, n: usize) -> Vec<NaiveDate> {
    let mut dates = Vec::with_capacity(n);
    let mut date = start;
    while dates.len() < n {
        if !matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
            dates.push(date);
        }
        date = date.succ_opt().expect("date overflow");
    }
    dates
}

/// 가격 경로 하나로 일봉 시계열 구성 (open/high/low는 종가 주변)
pub fn series_from_prices(ticker: &str, start: NaiveDate, prices: &[f64]) -> DailySeries {
    let bars = weekday_dates(start, prices.len())
        .into_iter()
        .zip(prices.iter().copied())
        .enumerate()
        .map(|(i, (date, price))| DailyBar {
            date,
            open: price * 0.995,
            high: price * 1.01,
            low: price * 0.985,
            close: price,
            adj_close: price,
            volume: 1_000.0 + (i % 17) as f64 * 37.0,
        })
        .collect();
    DailySeries::new(ticker, bars).expect("valid synthetic series")
}

/// 가격/거래량이 일정한 시계열 (open = high = low = close)
pub fn constant_series(ticker: &str, n_days: usize, price: f64, volume: f64) -> DailySeries {
    let bars = weekday_dates(default_start(), n_days)
        .into_iter()
        .map(|date| DailyBar {
            date,
            open: price,
            high: price,
            low: price,
            close: price,
            adj_close: price,
            volume,
        })
        .collect();
    DailySeries::new(ticker, bars).expect("valid synthetic series")
}

/// 완만한 상승 추세 + 주기적 등락
pub fn trending_series(ticker: &str, n_days: usize, start_price: f64) -> DailySeries {
    let prices: Vec<f64> = (0..n_days)
        .map(|i| {
            let t = i as f64;
            start_price * (1.0 + 0.002 * t) * (1.0 + 0.05 * (t / 7.0).sin())
        })
        .collect();
    series_from_prices(ticker, default_start(), &prices)
}
