use serde::Serialize;
use tracing::info;

use crate::types::Sample;
use crate::utility::config::SplitRatios;

/// 시간 순 train/val/test 분할 결과
#[derive(Debug, Clone, Default)]
pub struct DatasetSplit {
    pub train: Vec<Sample>,
    pub val: Vec<Sample>,
    pub test: Vec<Sample>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SplitCounts {
    pub train: usize,
    pub val: usize,
    pub test: usize,
}

impl DatasetSplit {
    pub fn counts(&self) -> SplitCounts {
        SplitCounts {
            train: self.train.len(),
            val: self.val.len(),
            test: self.test.len(),
        }
    }

    /// (이름, 샘플) 순서대로
    pub fn parts(&self) -> [(&'static str, &[Sample]); 3] {
        [
            ("train", self.train.as_slice()),
            ("val", self.val.as_slice()),
            ("test", self.test.as_slice()),
        ]
    }
}

/// 전체 종목의 샘플을 base_date 기준으로 (동률은 종목 코드로) 정렬한 뒤
/// 앞에서부터 train / val / test로 자른다. 자르기 전에 섞지 않는다.
pub fn split_by_time(mut samples: Vec<Sample>, ratios: &SplitRatios) -> DatasetSplit {
    samples.sort_by(|a, b| {
        a.base_date
            .cmp(&b.base_date)
            .then_with(|| a.ticker.cmp(&b.ticker))
    });

    let n = samples.len();
    let n_train = ((n as f64 * ratios.train_ratio).floor() as usize).min(n);
    let n_val = ((n as f64 * ratios.val_ratio).floor() as usize).min(n - n_train);

    let test = samples.split_off(n_train + n_val);
    let val = samples.split_off(n_train);
    let train = samples;

    let split = DatasetSplit { train, val, test };
    let counts = split.counts();
    info!(
        "시간 순 분할 완료: train {} / val {} / test {}",
        counts.train, counts.val, counts.test
    );
    if let (Some(last_train), Some(first_test)) = (split.train.last(), split.test.first()) {
        info!(
            "분할 경계: train 마지막 {} / test 처음 {}",
            last_train.base_date, first_test.base_date
        );
    }
    split
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    fn sample(ticker: &str, base_date: NaiveDate) -> Sample {
        Sample {
            ticker: ticker.to_string(),
            base_date,
            target_dates: vec![base_date + Duration::days(30)],
            target_returns: vec![0.0],
        }
    }

    fn panel_samples() -> Vec<Sample> {
        let start = NaiveDate::from_ymd_opt(2020, 1, 1).expect("Invalid test date");
        let mut samples = Vec::new();
        // 종목마다 기간이 다르게 겹치도록
        for (offset, ticker) in ["CCC", "AAA", "BBB"].iter().enumerate() {
            for day in 0..37 {
                samples.push(sample(ticker, start + Duration::days((offset * 11 + day) as i64)));
            }
        }
        samples
    }

    #[test]
    fn test_split_chronology() {
        let split = split_by_time(panel_samples(), &SplitRatios::default());

        let max_train = split.train.iter().map(|s| s.base_date).max().expect("train");
        let min_val = split.val.iter().map(|s| s.base_date).min().expect("val");
        let max_val = split.val.iter().map(|s| s.base_date).max().expect("val");
        let min_test = split.test.iter().map(|s| s.base_date).min().expect("test");

        assert!(max_train <= min_val);
        assert!(max_val <= min_test);
    }

    #[test]
    fn test_split_counts_floor() {
        let split = split_by_time(panel_samples(), &SplitRatios::default());
        // n = 111: train = floor(77.7) = 77, val = floor(16.65) = 16, test = 18
        assert_eq!(
            split.counts(),
            SplitCounts {
                train: 77,
                val: 16,
                test: 18
            }
        );
    }

    #[test]
    fn test_split_is_deterministic_across_input_order() {
        let mut reversed = panel_samples();
        reversed.reverse();

        let a = split_by_time(panel_samples(), &SplitRatios::default());
        let b = split_by_time(reversed, &SplitRatios::default());
        assert_eq!(a.train, b.train);
        assert_eq!(a.val, b.val);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_split_empty_and_tiny() {
        let split = split_by_time(Vec::new(), &SplitRatios::default());
        assert_eq!(
            split.counts(),
            SplitCounts {
                train: 0,
                val: 0,
                test: 0
            }
        );

        let date = NaiveDate::from_ymd_opt(2020, 1, 1).expect("Invalid test date");
        let split = split_by_time(vec![sample("A", date)], &SplitRatios::default());
        assert_eq!(split.counts().test, 1);
    }
}
