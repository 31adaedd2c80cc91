use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// 하나의 (종목, 기준일) 학습 샘플
/// 156주 입력 윈도우와 모든 horizon 타겟이 확보된 경우에만 생성된다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub ticker: String,
    pub base_date: NaiveDate,
    /// horizon별 실제 매칭된 거래일 (base_date + m개월 이후 첫 거래일)
    pub target_dates: Vec<NaiveDate>,
    /// horizon별 로그 수익률 ln(target / base)
    pub target_returns: Vec<f64>,
}

impl Sample {
    pub fn n_horizons(&self) -> usize {
        self.target_returns.len()
    }
}

/// 데이터셋에서 제외된 종목과 그 이유
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedTicker {
    pub ticker: String,
    pub reason: String,
}
