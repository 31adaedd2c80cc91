//! 주봉 특징 계산용 롤링 윈도우 헬퍼
//!
//! 모든 함수는 주어진 슬라이스의 끝부분만 본다.
//! i번째 값은 `&series[..=i]`를 넘겨서 계산하므로 미래 값을 참조하지 않는다.
//!
//! - 입력은 과거 -> 최신 순서의 슬라이스
//! - 최소 기간 1: 윈도우가 데이터보다 길면 있는 만큼만 사용
//! - NaN 입력은 집계에서 제외, 유효 관측치가 없으면 NaN 반환
//! - 비유한 값 정리는 호출하는 쪽에서 나중에 수행

use crate::utility::constants::EPSILON;

/// 마지막 값의 `periods` 이전 대비 변화율 (슬라이스 길이가 `periods` 이하면 NaN)
pub fn pct_change_last(x: &[f64], periods: usize) -> f64 {
    if periods == 0 || x.len() <= periods {
        return f64::NAN;
    }
    let last = x[x.len() - 1];
    let prev = x[x.len() - 1 - periods];
    last / prev - 1.0
}

fn tail(x: &[f64], window: usize) -> &[f64] {
    &x[x.len().saturating_sub(window)..]
}

/// 최근 `window`개 값의 평균 (NaN 제외, 최소 기간 1)
pub fn mean_last(x: &[f64], window: usize) -> f64 {
    let mut sum = 0.0;
    let mut count = 0usize;
    for &v in tail(x, window).iter().filter(|v| !v.is_nan()) {
        sum += v;
        count += 1;
    }
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

/// 최근 `window`개 값의 최댓값
pub fn max_last(x: &[f64], window: usize) -> f64 {
    tail(x, window)
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v > acc { v } else { acc })
}

/// 최근 `window`개 값의 최솟값
pub fn min_last(x: &[f64], window: usize) -> f64 {
    tail(x, window)
        .iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(f64::NAN, |acc, v| if acc.is_nan() || v < acc { v } else { acc })
}

/// 최근 `window`개 값의 표본 표준편차 (ddof = 1, 관측치 2개 미만이면 NaN)
pub fn std_last(x: &[f64], window: usize) -> f64 {
    sample_std(tail(x, window))
}

/// 전체 값의 표본 표준편차 (ddof = 1)
pub fn sample_std(x: &[f64]) -> f64 {
    let values: Vec<f64> = x.iter().copied().filter(|v| !v.is_nan()).collect();
    let n = values.len();
    if n < 2 {
        return f64::NAN;
    }
    let mean = values.iter().sum::<f64>() / n as f64;
    let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n as f64 - 1.0);
    var.sqrt()
}

/// 전체 값의 평균
pub fn nan_mean(x: &[f64]) -> f64 {
    mean_last(x, x.len())
}

/// 최대 낙폭: `(p - 누적 최고가) / (누적 최고가 + ε)`의 최솟값, 빈 경로는 0.0
pub fn max_drawdown(prices: &[f64]) -> f64 {
    let mut running_max = f64::NAN;
    let mut mdd = 0.0_f64;
    for &p in prices.iter().filter(|p| !p.is_nan()) {
        if running_max.is_nan() || p > running_max {
            running_max = p;
        }
        let dd = (p - running_max) / (running_max + EPSILON);
        if dd < mdd {
            mdd = dd;
        }
    }
    mdd
}

/// 중앙값 (짝수 개면 가운데 두 값의 평균, 비어 있으면 None)
pub fn median(values: &[f64]) -> Option<f64> {
    let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
    if sorted.is_empty() {
        return None;
    }
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    } else {
        Some(sorted[mid])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pct_change_last() {
        let x = [100.0, 110.0, 121.0];
        assert!((pct_change_last(&x, 1) - 0.1).abs() < 1e-12);
        assert!((pct_change_last(&x, 2) - 0.21).abs() < 1e-12);
        assert!(pct_change_last(&x, 3).is_nan());
    }

    #[test]
    fn test_min_periods_one() {
        let x = [1.0, 2.0, 3.0];
        // window가 데이터보다 길면 있는 만큼만 사용
        assert!((mean_last(&x, 13) - 2.0).abs() < 1e-12);
        assert!((mean_last(&x, 2) - 2.5).abs() < 1e-12);
        assert_eq!(max_last(&x, 52), 3.0);
        assert_eq!(min_last(&x, 2), 2.0);
        assert!(mean_last(&[], 4).is_nan());
    }

    #[test]
    fn test_std_last_skips_nan() {
        let x = [f64::NAN, 1.0, 3.0];
        assert!((std_last(&x, 13) - 2.0_f64.sqrt()).abs() < 1e-12);
        // 유효 관측치 1개면 NaN
        assert!(std_last(&[f64::NAN, 1.0], 13).is_nan());
        assert!(std_last(&x, 1).is_nan());
    }

    #[test]
    fn test_max_drawdown() {
        let prices = [100.0, 120.0, 90.0, 130.0, 117.0];
        let mdd = max_drawdown(&prices);
        assert!((mdd - (90.0 - 120.0) / (120.0 + EPSILON)).abs() < 1e-12);
        assert_eq!(max_drawdown(&[]), 0.0);
        assert_eq!(max_drawdown(&[5.0, 6.0, 7.0]), 0.0);
    }

    #[test]
    fn test_median() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 2.0, 3.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }
}
