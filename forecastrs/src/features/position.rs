use chrono::{Datelike, NaiveDate};

use crate::utility::constants::{N_POSITION_FEATURES, WEEKS_PER_YEAR};

/// 날짜 -> 위치 특징 [요일 인덱스 (월=0..일=6), ISO 주차 / 52]
/// 학습 샘플 조립과 추론이 반드시 이 함수 하나만 사용해야 한다
pub fn position_features(date: NaiveDate) -> [f64; N_POSITION_FEATURES] {
    let weekday = date.weekday().num_days_from_monday() as f64;
    let week_frac = date.iso_week().week() as f64 / WEEKS_PER_YEAR as f64;
    [weekday, week_frac]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_features() {
        // 2025-01-15 (수), ISO 3주차
        let date = NaiveDate::from_ymd_opt(2025, 1, 15).expect("Invalid test date");
        let [weekday, week_frac] = position_features(date);
        assert_eq!(weekday, 2.0);
        assert!((week_frac - 3.0 / 52.0).abs() < 1e-12);
    }

    #[test]
    fn test_position_features_iso_week_53() {
        // 2020-12-31 (목)은 ISO 53주차이므로 1을 약간 넘는다
        let date = NaiveDate::from_ymd_opt(2020, 12, 31).expect("Invalid test date");
        let [weekday, week_frac] = position_features(date);
        assert_eq!(weekday, 3.0);
        assert!((week_frac - 53.0 / 52.0).abs() < 1e-12);

        let sunday = NaiveDate::from_ymd_opt(2024, 3, 17).expect("Invalid test date");
        assert_eq!(position_features(sunday)[0], 6.0);
    }
}
