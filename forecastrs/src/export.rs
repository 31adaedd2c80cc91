//! 데이터셋 내보내기: split별 .npy 텐서, samples.json, metadata.json
//!
//! ```text
//! <output_dir>/
//!   metadata.json
//!   train/ weekly_seq.npy static_features.npy position_features.npy sector_id.npy targets.npy samples.json
//!   val/   ...
//!   test/  ...
//! ```

use chrono::NaiveDate;
use ndarray::{ArrayBase, Data, Dimension};
use ndarray_npy::{WritableElement, WriteNpyExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::features::ImputationReport;
use crate::labeling::{FinetuneWindow, GenerationStats};
use crate::pipeline::{BuildMode, DatasetBuild, MaterializedSplits, SkippedTicker};
use crate::sector_manager::SectorMapper;
use crate::split::SplitCounts;
use crate::tensor::TensorBatch;
use crate::types::Sample;
use crate::utility::config::PipelineConfig;
use crate::utility::constants::{
    MODEL_INPUT_NAMES, N_POSITION_FEATURES, N_STATIC_FEATURES, N_WEEKLY_FEATURES, STATIC_FEATURE_COLUMNS,
    WEEKLY_FEATURE_COLUMNS,
};
use crate::utility::errors::{ForecastError, ForecastResult};

/// 모델 입력 텐서 shape (배치 차원 제외)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InputSpec {
    pub names: Vec<String>,
    pub weekly_seq: Vec<usize>,
    pub static_features: Vec<usize>,
    pub position_features: Vec<usize>,
    pub sector_id: Vec<usize>,
}

impl InputSpec {
    pub fn new(n_weeks: usize) -> Self {
        Self {
            names: MODEL_INPUT_NAMES.iter().map(|s| s.to_string()).collect(),
            weekly_seq: vec![n_weeks, N_WEEKLY_FEATURES],
            static_features: vec![N_STATIC_FEATURES],
            position_features: vec![N_POSITION_FEATURES],
            sector_id: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutputSpec {
    /// 1..n_horizons개월 로그 수익률
    pub log_returns: Vec<usize>,
}

/// metadata.json
#[derive(Debug, Clone, Serialize)]
pub struct DatasetMetadata {
    pub created_at: String,
    pub mode: BuildMode,
    pub pipeline: PipelineConfig,
    pub weekly_feature_columns: Vec<String>,
    pub static_feature_columns: Vec<String>,
    pub input_spec: InputSpec,
    pub output_spec: OutputSpec,
    pub sector_mapping: BTreeMap<String, i64>,
    pub num_sectors: usize,
    pub split_counts: SplitCounts,
    pub generation: GenerationStats,
    pub skipped_tickers: Vec<SkippedTicker>,
    pub sanitized_rate: f64,
    pub static_as_of: NaiveDate,
    pub imputation: ImputationReport,
    pub finetune_window: Option<FinetuneWindow>,
}

impl DatasetMetadata {
    pub fn new(
        build: &DatasetBuild,
        splits: &MaterializedSplits,
        sectors: &SectorMapper,
        config: &PipelineConfig,
    ) -> Self {
        Self {
            created_at: chrono::Utc::now().to_rfc3339(),
            mode: build.mode,
            pipeline: config.clone(),
            weekly_feature_columns: WEEKLY_FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            static_feature_columns: STATIC_FEATURE_COLUMNS.iter().map(|s| s.to_string()).collect(),
            input_spec: InputSpec::new(config.n_weeks_input),
            output_spec: OutputSpec {
                log_returns: vec![config.n_horizons as usize],
            },
            sector_mapping: sectors.mapping().clone(),
            num_sectors: sectors.num_sectors(),
            split_counts: build.split.counts(),
            generation: build.stats,
            skipped_tickers: build.skipped.clone(),
            sanitized_rate: splits.sanitized_rate(),
            static_as_of: build.static_as_of,
            imputation: build.statics.report(),
            finetune_window: build.finetune_window,
        }
    }
}

fn write_array<A, S, D>(path: &Path, array: &ArrayBase<S, D>) -> ForecastResult<()>
where
    A: WritableElement,
    S: Data<Elem = A>,
    D: Dimension,
{
    let mut file = File::create(path).map_err(|e| ForecastError::io(path.display().to_string(), e))?;
    array
        .write_npy(&mut file)
        .map_err(|e| ForecastError::export(path.display().to_string(), e.to_string()))
}

pub struct DatasetExporter {
    output_dir: PathBuf,
}

impl DatasetExporter {
    pub fn new<P: AsRef<Path>>(output_dir: P) -> Self {
        Self {
            output_dir: output_dir.as_ref().to_path_buf(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn export_split(&self, name: &str, batch: &TensorBatch, samples: &[Sample]) -> ForecastResult<()> {
        let dir = self.output_dir.join(name);
        fs::create_dir_all(&dir)?;

        write_array(&dir.join("weekly_seq.npy"), &batch.weekly_seq)?;
        write_array(&dir.join("static_features.npy"), &batch.static_features)?;
        write_array(&dir.join("position_features.npy"), &batch.position_features)?;
        write_array(&dir.join("sector_id.npy"), &batch.sector_id)?;
        write_array(&dir.join("targets.npy"), &batch.targets)?;

        let file = File::create(dir.join("samples.json"))?;
        serde_json::to_writer_pretty(file, samples)?;

        info!(
            "✅ {} 내보내기 완료: {} ({}개 샘플)",
            name,
            dir.display(),
            batch.len()
        );
        Ok(())
    }

    /// split별 텐서와 metadata.json을 쓴다
    pub fn export(
        &self,
        build: &DatasetBuild,
        splits: &MaterializedSplits,
        sectors: &SectorMapper,
        config: &PipelineConfig,
    ) -> ForecastResult<DatasetMetadata> {
        fs::create_dir_all(&self.output_dir)?;

        let samples = build.split.parts();
        for ((name, batch), (_, split_samples)) in splits.parts().iter().zip(samples.iter()) {
            if batch.len() != split_samples.len() {
                return Err(ForecastError::export(
                    *name,
                    format!("텐서 수({})와 샘플 수({})가 다릅니다", batch.len(), split_samples.len()),
                ));
            }
            self.export_split(name, batch, split_samples)?;
        }

        let metadata = DatasetMetadata::new(build, splits, sectors, config);
        let path = self.output_dir.join("metadata.json");
        let file = File::create(&path)?;
        serde_json::to_writer_pretty(file, &metadata)?;
        info!("✅ 메타데이터 저장: {}", path.display());

        Ok(metadata)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_reader::DailyPanel;
    use crate::pipeline::TrainingPipeline;
    use crate::sector_manager::{UniverseEntry, Valuation, ValuationTable};
    use crate::test_support::trending_series;
    use ndarray::{Array1, Array2, Array3};
    use ndarray_npy::ReadNpyExt;
    use tempfile::TempDir;

    fn build_and_export(mode: BuildMode, dir: &Path) -> (DatasetBuild, DatasetMetadata) {
        let config = PipelineConfig {
            n_weeks_input: 16,
            n_horizons: 2,
            max_sanitized_rate: 1.0,
            ..PipelineConfig::default()
        };
        let valuations = ValuationTable::from_entries(vec![UniverseEntry {
            ticker: "AAA".to_string(),
            sector: Some("Industrials".to_string()),
            valuation: Valuation::default(),
        }])
        .expect("universe");
        let sectors = SectorMapper::from_pairs(vec![("Industrials", 3)]).expect("sectors");
        let pipeline = TrainingPipeline::new(config.clone(), valuations, sectors.clone()).expect("pipeline");

        let daily = DailyPanel::from_series(vec![
            trending_series("AAA", 450, 12.0),
            trending_series("BBB", 430, 8.0),
        ])
        .expect("panel");
        let build = pipeline.run(daily, mode).expect("build");
        let splits = pipeline.materialize(&build).expect("tensors");
        let metadata = DatasetExporter::new(dir)
            .export(&build, &splits, &sectors, &config)
            .expect("export");
        (build, metadata)
    }

    #[test]
    fn test_export_writes_arrays_per_split() {
        let temp_dir = TempDir::new().expect("temp dir");
        let (build, _) = build_and_export(BuildMode::Full, temp_dir.path());
        let counts = build.split.counts();

        let train = temp_dir.path().join("train");
        let weekly: Array3<f32> =
            ReadNpyExt::read_npy(File::open(train.join("weekly_seq.npy")).expect("open")).expect("read");
        assert_eq!(weekly.shape(), &[counts.train, 16, 23]);

        let targets: Array2<f32> =
            ReadNpyExt::read_npy(File::open(train.join("targets.npy")).expect("open")).expect("read");
        assert_eq!(targets.shape(), &[counts.train, 2]);
        let first = &build.split.train[0];
        assert!((targets[[0, 1]] - first.target_returns[1] as f32).abs() < 1e-7);

        let sector_ids: Array1<i64> = ReadNpyExt::read_npy(
            File::open(temp_dir.path().join("test").join("sector_id.npy")).expect("open"),
        )
        .expect("read");
        assert_eq!(sector_ids.len(), counts.test);
        for (sample, &id) in build.split.test.iter().zip(sector_ids.iter()) {
            let expected = if sample.ticker == "AAA" { 3 } else { 0 };
            assert_eq!(id, expected);
        }

        let statics: Array2<f32> = ReadNpyExt::read_npy(
            File::open(temp_dir.path().join("val").join("static_features.npy")).expect("open"),
        )
        .expect("read");
        assert_eq!(statics.shape(), &[counts.val, 6]);

        let content = fs::read_to_string(train.join("samples.json")).expect("samples");
        let samples: Vec<Sample> = serde_json::from_str(&content).expect("parse");
        assert_eq!(samples, build.split.train);
    }

    #[test]
    fn test_metadata_contents() {
        let temp_dir = TempDir::new().expect("temp dir");
        let (build, metadata) = build_and_export(BuildMode::Finetune, temp_dir.path());

        let content = fs::read_to_string(temp_dir.path().join("metadata.json")).expect("metadata");
        let json: serde_json::Value = serde_json::from_str(&content).expect("parse");

        assert_eq!(json["mode"], "finetune");
        assert_eq!(json["weekly_feature_columns"][0], "OpenWeek");
        assert_eq!(json["weekly_feature_columns"][22], "ClosePosInRange");
        assert_eq!(json["static_feature_columns"][5], "DividendYield");
        assert_eq!(json["input_spec"]["weekly_seq"], serde_json::json!([16, 23]));
        assert_eq!(json["input_spec"]["sector_id"], serde_json::json!([]));
        assert_eq!(json["output_spec"]["log_returns"], serde_json::json!([2]));
        assert_eq!(json["sector_mapping"]["Industrials"], 3);
        assert_eq!(json["num_sectors"], 4);
        assert_eq!(json["pipeline"]["n_horizons"], 2);
        assert!(json["finetune_window"]["max_base_date"].is_string());
        assert_eq!(
            json["split_counts"]["train"].as_u64(),
            Some(build.split.counts().train as u64)
        );
        assert_eq!(metadata.static_as_of, build.static_as_of);
        assert!(chrono::DateTime::parse_from_rfc3339(&metadata.created_at).is_ok());
    }
}
