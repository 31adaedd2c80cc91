pub mod bar;
pub mod sample;

pub use bar::{DailyBar, DailySeries, IsoWeekKey, WeeklyBar, WeeklyColumn, WeeklyFeatureRow};
pub use sample::{Sample, SkippedTicker};
