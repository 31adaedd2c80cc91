use crate::types::{DailyBar, IsoWeekKey, WeeklyBar};

/// 한 ISO 주의 일봉을 누적해서 주봉으로 만든다
/// open은 첫 거래일 시가, high/low는 주중 최고/최저, close는 마지막 거래일 수정종가,
/// volume은 합계
#[derive(Debug, Clone)]
pub struct WeeklyAccumulator {
    bar: Option<WeeklyBar>,
}

impl WeeklyAccumulator {
    pub fn new() -> Self {
        Self { bar: None }
    }

    pub fn key(&self) -> Option<IsoWeekKey> {
        self.bar.map(|bar| bar.key)
    }

    /// 일봉 하나를 추가 (호출자는 같은 주의 일봉을 날짜 순으로 넣어야 한다)
    pub fn push(&mut self, daily: &DailyBar) {
        match self.bar.as_mut() {
            Some(bar) => {
                bar.week_end = daily.date;
                bar.high = bar.high.max(daily.high);
                bar.low = bar.low.min(daily.low);
                bar.close = daily.adj_close;
                bar.volume += daily.volume;
            }
            None => {
                self.bar = Some(WeeklyBar {
                    key: IsoWeekKey::from_date(daily.date),
                    week_end: daily.date,
                    open: daily.open,
                    high: daily.high,
                    low: daily.low,
                    close: daily.adj_close,
                    volume: daily.volume,
                });
            }
        }
    }

    pub fn finish(self) -> Option<WeeklyBar> {
        self.bar
    }
}

impl Default for WeeklyAccumulator {
    fn default() -> Self {
        Self::new()
    }
}

/// 날짜 오름차순 일봉을 ISO 주 단위로 묶는다
/// 빈 입력이면 빈 결과 (치명적인지는 호출자가 판단)
pub fn aggregate_weekly(bars: &[DailyBar]) -> Vec<WeeklyBar> {
    let mut weekly = Vec::with_capacity(bars.len() / 5 + 1);
    let mut acc = WeeklyAccumulator::new();

    for daily in bars {
        let key = IsoWeekKey::from_date(daily.date);
        if acc.key().is_some_and(|current| current != key) {
            let finished = std::mem::take(&mut acc);
            weekly.extend(finished.finish());
        }
        acc.push(daily);
    }
    weekly.extend(acc.finish());

    weekly
}
