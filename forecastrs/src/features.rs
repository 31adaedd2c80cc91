pub mod position;
pub mod rolling;
pub mod static_features;
pub mod weekly;
pub mod weekly_bars;

// 재수출
pub use position::position_features;
pub use static_features::{
    ImputationReport, LongTermStats, StaticFeatureRecord, StaticFeatureTable, ValuationImputer,
};
pub use weekly::{compute_weekly_features, compute_weekly_row, weekly_features_as_of};
pub use weekly_bars::{aggregate_weekly, WeeklyAccumulator};
