use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

use crate::utility::constants::{
    FINETUNE_LOOKBACK_YEARS, LOOKBACK_YEARS_DEFAULT, MIN_DAILY_RECORDS_PER_TICKER,
    MIN_STATIC_WEEKS, N_OUTPUT_MONTHS, N_WEEKS_INPUT,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("설정 파일을 찾을 수 없습니다: {0}")]
    FileNotFound(String),
    #[error("설정 파일 읽기 오류: {0}")]
    ReadError(#[from] std::io::Error),
    #[error("설정 파일 파싱 오류: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("설정 유효성 검증 실패: {0}")]
    ValidationError(String),
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    pub data: DataConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub labels: LabelsConfig,
    #[serde(default)]
    pub split: SplitRatios,
    #[serde(default)]
    pub finetune: FinetuneConfig,
    #[serde(default)]
    pub validation: ValidationConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DataConfig {
    /// 일별 스냅샷 JSON 디렉터리
    pub daily_data_dir: String,
    /// 종목별 섹터/밸류에이션 테이블 (TOML)
    pub universe_path: String,
    /// 섹터명 -> ID 테이블 (TOML)
    pub sectors_path: String,
    /// 학습 데이터셋 출력 디렉터리
    pub output_dir: String,
    /// 학습 시 저장된 metadata.json (추론 시 섹터 매핑 복원용)
    #[serde(default)]
    pub metadata_path: Option<String>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FeaturesConfig {
    pub n_weeks_input: usize,
    pub lookback_years: u32,
    pub min_static_weeks: usize,
    pub min_daily_records: usize,
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            n_weeks_input: N_WEEKS_INPUT,
            lookback_years: LOOKBACK_YEARS_DEFAULT,
            min_static_weeks: MIN_STATIC_WEEKS,
            min_daily_records: MIN_DAILY_RECORDS_PER_TICKER,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct LabelsConfig {
    pub n_horizons: u32,
}

impl Default for LabelsConfig {
    fn default() -> Self {
        Self {
            n_horizons: N_OUTPUT_MONTHS as u32,
        }
    }
}

/// train/val/test 분할 비율
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train_ratio: f64,
    pub val_ratio: f64,
    pub test_ratio: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train_ratio: 0.70,
            val_ratio: 0.15,
            test_ratio: 0.15,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FinetuneConfig {
    /// 전량 유지할 최근 구간 (개월)
    pub recent_months: u32,
    /// 과거 구간 샘플 수 = 최근 구간 샘플 수 * history_ratio
    pub history_ratio: f64,
    /// 과거 구간 다운샘플링 시드
    pub seed: u64,
    /// 파인튜닝 시 로드할 일봉 기간 (년)
    pub lookback_years: u32,
}

impl Default for FinetuneConfig {
    fn default() -> Self {
        Self {
            recent_months: 1,
            history_ratio: 0.5,
            seed: 42,
            lookback_years: FINETUNE_LOOKBACK_YEARS,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ValidationConfig {
    /// 텐서 내 NaN/Inf 치환 허용 비율
    pub max_sanitized_rate: f64,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_sanitized_rate: 0.05,
        }
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// 파이프라인 각 컴포넌트에 전달되는 불변 설정 레코드
/// 학습/추론이 같은 레코드를 공유하므로 파라미터가 구조적으로 일치한다
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub n_weeks_input: usize,
    pub n_horizons: u32,
    pub lookback_years: u32,
    pub min_static_weeks: usize,
    pub min_daily_records: usize,
    pub split: SplitRatios,
    pub finetune: FinetuneConfig,
    pub max_sanitized_rate: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let features = FeaturesConfig::default();
        Self {
            n_weeks_input: features.n_weeks_input,
            n_horizons: LabelsConfig::default().n_horizons,
            lookback_years: features.lookback_years,
            min_static_weeks: features.min_static_weeks,
            min_daily_records: features.min_daily_records,
            split: SplitRatios::default(),
            finetune: FinetuneConfig::default(),
            max_sanitized_rate: ValidationConfig::default().max_sanitized_rate,
        }
    }
}

impl PipelineConfig {
    /// 값 범위 검증 (Config를 거치지 않고 직접 만든 경우에도 사용)
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n_weeks_input == 0 {
            return Err(ConfigError::ValidationError(
                "n_weeks_input은 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.n_horizons == 0 {
            return Err(ConfigError::ValidationError(
                "n_horizons는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.lookback_years == 0 {
            return Err(ConfigError::ValidationError(
                "lookback_years는 1 이상이어야 합니다".to_string(),
            ));
        }
        if self.min_static_weeks < 2 {
            return Err(ConfigError::ValidationError(
                "min_static_weeks는 2 이상이어야 합니다".to_string(),
            ));
        }

        let ratios = [
            ("train_ratio", self.split.train_ratio),
            ("val_ratio", self.split.val_ratio),
            ("test_ratio", self.split.test_ratio),
        ];
        for (name, value) in ratios {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ValidationError(format!(
                    "{}는 0~1 사이여야 합니다: {}",
                    name, value
                )));
            }
        }
        let sum = self.split.train_ratio + self.split.val_ratio + self.split.test_ratio;
        if (sum - 1.0).abs() > 1e-6 {
            return Err(ConfigError::ValidationError(format!(
                "분할 비율의 합은 1이어야 합니다: {:.6}",
                sum
            )));
        }

        if self.finetune.recent_months == 0 {
            return Err(ConfigError::ValidationError(
                "finetune.recent_months는 1 이상이어야 합니다".to_string(),
            ));
        }
        if !(self.finetune.history_ratio >= 0.0) {
            return Err(ConfigError::ValidationError(
                "finetune.history_ratio는 0 이상이어야 합니다".to_string(),
            ));
        }
        if self.finetune.lookback_years == 0 {
            return Err(ConfigError::ValidationError(
                "finetune.lookback_years는 1 이상이어야 합니다".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.max_sanitized_rate) {
            return Err(ConfigError::ValidationError(
                "max_sanitized_rate는 0~1 사이여야 합니다".to_string(),
            ));
        }

        Ok(())
    }
}

impl Config {
    /// 지정된 파일에서 설정을 로드
    pub fn load_from_file(path: &str) -> Result<Self, ConfigError> {
        if !Path::new(path).exists() {
            return Err(ConfigError::FileNotFound(format!(
                "{}가 없습니다. config.example.toml을 복사해서 config.toml을 만들고 설정을 채워주세요.",
                path
            )));
        }

        let content = fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;

        // 환경 변수로 오버라이드
        config.apply_env_overrides();

        // 설정 유효성 검증
        config.validate()?;

        Ok(config)
    }

    /// 환경 변수로 설정을 오버라이드
    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("FORECAST_DAILY_DATA_DIR") {
            self.data.daily_data_dir = path;
        }
        if let Ok(path) = std::env::var("FORECAST_UNIVERSE_PATH") {
            self.data.universe_path = path;
        }
        if let Ok(path) = std::env::var("FORECAST_SECTORS_PATH") {
            self.data.sectors_path = path;
        }
        if let Ok(path) = std::env::var("FORECAST_OUTPUT_DIR") {
            self.data.output_dir = path;
        }
        if let Ok(seed) = std::env::var("FORECAST_FINETUNE_SEED") {
            if let Ok(seed_value) = seed.parse::<u64>() {
                self.finetune.seed = seed_value;
            }
        }

        // 로그 레벨 (모듈별 지시자가 포함된 RUST_LOG는 EnvFilter에만 적용)
        if let Ok(level) = std::env::var("RUST_LOG") {
            if matches!(
                level.to_lowercase().as_str(),
                "error" | "warn" | "info" | "debug" | "trace"
            ) {
                self.logging.level = level;
            }
        }
    }

    /// 설정 유효성 검증
    fn validate(&self) -> Result<(), ConfigError> {
        if self.data.daily_data_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "data.daily_data_dir가 비어 있습니다".to_string(),
            ));
        }
        if self.data.output_dir.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "data.output_dir가 비어 있습니다".to_string(),
            ));
        }

        // 로그 레벨 검증
        match self.logging.level.to_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" => {}
            _ => {
                return Err(ConfigError::ValidationError(
                    "log level은 'error', 'warn', 'info', 'debug', 'trace' 중 하나여야 합니다"
                        .to_string(),
                ))
            }
        }

        self.pipeline().validate()
    }

    /// 각 섹션을 하나의 불변 파이프라인 설정으로 묶는다
    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            n_weeks_input: self.features.n_weeks_input,
            n_horizons: self.labels.n_horizons,
            lookback_years: self.features.lookback_years,
            min_static_weeks: self.features.min_static_weeks,
            min_daily_records: self.features.min_daily_records,
            split: self.split,
            finetune: self.finetune.clone(),
            max_sanitized_rate: self.validation.max_sanitized_rate,
        }
    }

    /// 설정을 파일로 저장 (주로 디버깅용)
    pub fn save_to_file(&self, path: &str) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::ValidationError(format!("직렬화 오류: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
        [data]
        daily_data_dir = "data/daily"
        universe_path = "universe.toml"
        sectors_path = "sectors.toml"
        output_dir = "output"
    "#;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let config: Config = toml::from_str(MINIMAL).expect("minimal config should parse");
        assert!(config.validate().is_ok());

        let pipeline = config.pipeline();
        assert_eq!(pipeline, PipelineConfig::default());
        assert_eq!(pipeline.n_weeks_input, 156);
        assert_eq!(pipeline.n_horizons, 12);
        assert_eq!(pipeline.lookback_years, 3);
    }

    #[test]
    fn test_config_validation() {
        let mut config: Config = toml::from_str(MINIMAL).expect("minimal config should parse");

        // 비율 합계 오류
        config.split.train_ratio = 0.8;
        assert!(config.validate().is_err());
        config.split.train_ratio = 0.7;
        assert!(config.validate().is_ok());

        // 잘못된 로그 레벨
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
        config.logging.level = "debug".to_string();

        // 0주 윈도우
        config.features.n_weeks_input = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_pipeline_config_rejects_bad_finetune() {
        let mut pipeline = PipelineConfig::default();
        pipeline.finetune.history_ratio = -0.5;
        assert!(pipeline.validate().is_err());

        pipeline.finetune.history_ratio = f64::NAN;
        assert!(pipeline.validate().is_err());

        pipeline.finetune.history_ratio = 0.5;
        pipeline.finetune.recent_months = 0;
        assert!(pipeline.validate().is_err());
    }

    #[test]
    fn test_save_and_reload_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        let path_str = path.to_string_lossy().to_string();

        let mut config: Config = toml::from_str(MINIMAL).expect("minimal config should parse");
        config.finetune.seed = 7;
        config.save_to_file(&path_str).expect("save should succeed");

        let content = std::fs::read_to_string(&path).expect("read back");
        let reloaded: Config = toml::from_str(&content).expect("reparse");
        assert_eq!(reloaded.finetune.seed, 7);
        assert_eq!(reloaded.pipeline(), config.pipeline());
    }

    #[test]
    fn test_example_config_parses() {
        let config: Config =
            toml::from_str(include_str!("../../config.example.toml")).expect("example config should parse");
        assert!(config.validate().is_ok());
        assert_eq!(config.pipeline(), PipelineConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = Config::load_from_file("/nonexistent/forecast/config.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }
}
