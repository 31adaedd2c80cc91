//! 주봉 23개 시계열 특징 계산
//!
//! 모든 특징은 행 단위 인과 함수 `compute_weekly_row`로만 계산한다.
//! i번째 행의 값은 `bars[..=i]`만 보고 결정되므로, 뒤에 주봉이 더 붙어도
//! 이미 계산된 행은 바뀌지 않는다. 학습(벌크)과 추론(단일 종목) 경로가
//! 같은 함수를 쓰기 때문에 같은 입력이면 비트 단위로 같은 결과가 나온다.

use chrono::NaiveDate;

use super::rolling::{max_last, mean_last, min_last, pct_change_last, std_last};
use super::weekly_bars::aggregate_weekly;
use crate::types::{DailySeries, WeeklyBar, WeeklyFeatureRow};
use crate::utility::constants::{EPSILON, N_WEEKLY_FEATURES};

/// 한 행을 계산하는 데 필요한 최대 과거 주 수 (Ret52W: 현재 + 52주 전)
pub const MAX_LOOKBACK_WEEKS: usize = 53;

/// `bars`의 마지막 주봉에 대한 23개 특징 (빈 입력이면 None)
pub fn compute_weekly_row(bars: &[WeeklyBar]) -> Option<[f64; N_WEEKLY_FEATURES]> {
    let current = *bars.last()?;

    // 가장 긴 lookback만큼만 잘라도 결과는 같다.
    // window[0]의 수익률은 NaN으로 두지만 길이 53일 때는 어떤 창에도 포함되지 않는다.
    let window = &bars[bars.len().saturating_sub(MAX_LOOKBACK_WEEKS)..];
    let closes: Vec<f64> = window.iter().map(|b| b.close).collect();
    let highs: Vec<f64> = window.iter().map(|b| b.high).collect();
    let lows: Vec<f64> = window.iter().map(|b| b.low).collect();
    let volumes: Vec<f64> = window.iter().map(|b| b.volume).collect();
    let returns: Vec<f64> = (0..closes.len())
        .map(|j| {
            if j == 0 {
                f64::NAN
            } else {
                closes[j] / closes[j - 1] - 1.0
            }
        })
        .collect();

    let close = current.close;

    // 수익률
    let ret_week = pct_change_last(&closes, 1);
    let ret_4w = pct_change_last(&closes, 4);
    let ret_13w = pct_change_last(&closes, 13);
    let ret_26w = pct_change_last(&closes, 26);
    let ret_52w = pct_change_last(&closes, 52);

    // 이동평균과 괴리율
    let ma_4w = mean_last(&closes, 4);
    let ma_13w = mean_last(&closes, 13);
    let ma_26w = mean_last(&closes, 26);

    // 52주 고가/저가
    let high_52w = max_last(&highs, 52);
    let low_52w = min_last(&lows, 52);

    // 변동성
    let vol_13w = std_last(&returns, 13);
    let vol_26w = std_last(&returns, 26);

    // 거래량
    let volume_ma_13w = mean_last(&volumes, 13);

    // 캔들 형태
    let range = current.high - current.low + EPSILON;

    Some([
        current.open,
        current.high,
        current.low,
        close,
        current.volume,
        ret_week,
        ret_4w,
        ret_13w,
        ret_26w,
        ret_52w,
        ma_4w,
        ma_13w,
        ma_26w,
        close / ma_4w - 1.0,
        close / ma_13w - 1.0,
        close / ma_26w - 1.0,
        close / high_52w - 1.0,
        close / low_52w - 1.0,
        vol_13w,
        vol_26w,
        current.volume / (volume_ma_13w + EPSILON),
        (close - current.open).abs() / range,
        (close - current.low) / range,
    ])
}

/// 정렬된 주봉 전체에 대해 특징을 계산
pub fn compute_weekly_features(bars: &[WeeklyBar]) -> Vec<WeeklyFeatureRow> {
    (0..bars.len())
        .filter_map(|i| {
            compute_weekly_row(&bars[..=i]).map(|features| WeeklyFeatureRow {
                bar: bars[i],
                features,
            })
        })
        .collect()
}

/// 일봉에서 주봉 특징까지 한 번에 계산
/// as_of가 있으면 그 이후 일봉은 버리고, n_weeks가 있으면 전체 이력으로 계산한 뒤
/// 마지막 n_weeks 행만 남긴다 (잘라낸 뒤 계산하지 않는다)
pub fn weekly_features_as_of(
    series: &DailySeries,
    as_of: Option<NaiveDate>,
    n_weeks: Option<usize>,
) -> Vec<WeeklyFeatureRow> {
    let daily = match as_of {
        Some(date) => series.up_to(date),
        None => series.bars(),
    };

    let mut rows = compute_weekly_features(&aggregate_weekly(daily));

    if let Some(n) = n_weeks {
        let start = rows.len().saturating_sub(n);
        rows.drain(..start);
    }

    rows
}
