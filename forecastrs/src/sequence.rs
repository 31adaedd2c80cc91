use chrono::NaiveDate;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::types::{WeeklyColumn, WeeklyFeatureRow};
use crate::utility::constants::N_WEEKLY_FEATURES;
use crate::utility::errors::{ForecastError, ForecastResult};

/// 기준일에서 끝나는 고정 길이 주봉 특징 윈도우 (치환 전 원본 값)
#[derive(Debug, Clone, PartialEq)]
pub struct SequenceWindow {
    pub ticker: String,
    pub end_date: NaiveDate,
    pub week_ends: Vec<NaiveDate>,
    pub values: Vec<[f64; N_WEEKLY_FEATURES]>,
}

impl SequenceWindow {
    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// 윈도우 마지막 주의 종가 (수정종가 기준)
    pub fn last_close(&self) -> Option<f64> {
        self.values
            .last()
            .map(|row| row[WeeklyColumn::CloseWeek.index()])
    }

    /// (len, 23) f32 배열로 변환하면서 NaN/Inf를 0.0으로 치환
    /// 학습/추론 공통으로 특징 텐서를 변경하는 유일한 지점
    pub fn to_sanitized_array(&self) -> ForecastResult<(Array2<f32>, SanitizeStats)> {
        let mut stats = SanitizeStats::default();
        let mut flat = Vec::with_capacity(self.values.len() * N_WEEKLY_FEATURES);
        for row in &self.values {
            for &value in row {
                flat.push(stats.sanitize(value));
            }
        }
        let array = Array2::from_shape_vec((self.values.len(), N_WEEKLY_FEATURES), flat)?;
        Ok((array, stats))
    }
}

/// 비정상 값 치환 통계
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SanitizeStats {
    pub sanitized: usize,
    pub total: usize,
}

impl SanitizeStats {
    /// f32로 변환한 값이 유한하지 않으면 0.0으로 치환하고 개수를 센다
    pub fn sanitize(&mut self, value: f64) -> f32 {
        self.total += 1;
        let cast = value as f32;
        if cast.is_finite() {
            cast
        } else {
            self.sanitized += 1;
            0.0
        }
    }

    pub fn merge(&mut self, other: SanitizeStats) {
        self.sanitized += other.sanitized;
        self.total += other.total;
    }

    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.sanitized as f64 / self.total as f64
        }
    }

    /// 치환 비율이 허용치를 넘으면 오류 (계산 버그를 0.0 치환이 가리지 않도록)
    pub fn ensure_within(&self, limit: f64) -> ForecastResult<()> {
        let rate = self.rate();
        if rate > limit {
            return Err(ForecastError::SanitizationRateExceeded {
                sanitized: self.sanitized,
                total: self.total,
                rate,
                limit,
            });
        }
        Ok(())
    }
}

/// rows(오름차순)에서 week_end <= end_date인 행 중 마지막 length개를 추출
/// 부족하면 InsufficientWindow (0으로 채우지 않는다)
pub fn extract_sequence(
    ticker: &str,
    rows: &[WeeklyFeatureRow],
    end_date: NaiveDate,
    length: usize,
) -> ForecastResult<SequenceWindow> {
    let available = rows.partition_point(|row| row.week_end() <= end_date);
    if available < length {
        return Err(ForecastError::insufficient_window(
            ticker, end_date, available, length,
        ));
    }

    let window = &rows[available - length..available];
    Ok(SequenceWindow {
        ticker: ticker.to_string(),
        end_date,
        week_ends: window.iter().map(WeeklyFeatureRow::week_end).collect(),
        values: window.iter().map(|row| row.features).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::weekly_features_as_of;
    use crate::test_support::{constant_series, trending_series};

    #[test]
    fn test_extract_sequence_exact_length() {
        let series = trending_series("T", 600, 20.0);
        let rows = weekly_features_as_of(&series, None, None);
        let end_date = rows[99].week_end();

        let window = extract_sequence("T", &rows, end_date, 30).expect("enough history");
        assert_eq!(window.len(), 30);
        assert_eq!(window.week_ends.last(), Some(&end_date));
        assert_eq!(window.values[0], rows[70].features);
        assert_eq!(
            window.last_close(),
            Some(rows[99].get(WeeklyColumn::CloseWeek))
        );

        // 주중 날짜를 넘겨도 그 이전에 끝난 주까지만 포함
        let midweek = end_date.pred_opt().expect("date");
        let earlier = extract_sequence("T", &rows, midweek, 30).expect("enough history");
        assert_eq!(earlier.week_ends.last(), Some(&rows[98].week_end()));
    }

    #[test]
    fn test_extract_sequence_insufficient() {
        let series = trending_series("T", 100, 20.0);
        let rows = weekly_features_as_of(&series, None, None);
        let end_date = series.last_date().expect("non-empty");

        let result = extract_sequence("T", &rows, end_date, 156);
        match result {
            Err(ForecastError::InsufficientWindow {
                available,
                required,
                ..
            }) => {
                assert_eq!(available, 20);
                assert_eq!(required, 156);
            }
            other => panic!("expected InsufficientWindow, got {:?}", other),
        }
    }

    #[test]
    fn test_sanitize_replaces_non_finite() {
        let series = constant_series("X", 100, 100.0, 1_000.0);
        let rows = weekly_features_as_of(&series, None, None);
        let end_date = series.last_date().expect("non-empty");
        let window = extract_sequence("X", &rows, end_date, 20).expect("enough history");

        let (array, stats) = window.to_sanitized_array().expect("shape");
        assert_eq!(array.shape(), &[20, N_WEEKLY_FEATURES]);
        assert!(array.iter().all(|v| v.is_finite()));
        assert_eq!(stats.total, 20 * N_WEEKLY_FEATURES);
        // 첫 행: RetWeek, Ret4W, Ret13W, Ret26W, Ret52W, Vol_13W, Vol_26W
        // 이후 Ret52W는 20주 내내 NaN
        assert!(stats.sanitized >= 7 + 19);
        assert!(stats.ensure_within(1.0).is_ok());
        assert!(stats.ensure_within(0.0).is_err());
    }

    #[test]
    fn test_sanitize_stats_rate() {
        let mut stats = SanitizeStats::default();
        assert_eq!(stats.sanitize(1.5), 1.5);
        assert_eq!(stats.sanitize(f64::NAN), 0.0);
        assert_eq!(stats.sanitize(f64::INFINITY), 0.0);
        assert_eq!(stats.sanitize(1e300), 0.0);
        assert_eq!(stats.sanitized, 3);
        assert!((stats.rate() - 0.75).abs() < 1e-12);

        let mut merged = SanitizeStats::default();
        merged.merge(stats);
        merged.merge(stats);
        assert_eq!(merged.total, 8);
    }
}
