use chrono::NaiveDate;
use thiserror::Error;

/// 예측 데이터 파이프라인의 모든 오류 타입을 정의하는 enum
/// 각 오류는 종목/날짜/개수 등 구체적인 컨텍스트를 포함하여 디버깅을 돕는다
#[derive(Error, Debug)]
pub enum ForecastError {
    /// 설정 관련 오류 (config.rs의 ConfigError와 연동)
    #[error("설정 오류: {0}")]
    Config(#[from] crate::utility::config::ConfigError),

    /// 일봉 시계열 자체가 잘못된 경우 (중복 날짜 등)
    #[error("일봉 데이터 오류: {ticker} - {reason}")]
    InvalidDailySeries { ticker: String, reason: String },

    /// 최소 일봉 개수 미달
    #[error("일봉 이력 부족: {ticker} ({available}개 < 최소 {required}개)")]
    InsufficientHistory {
        ticker: String,
        available: usize,
        required: usize,
    },

    /// 기준일까지 주봉 윈도우가 부족한 경우 (추론 시 치명적 오류)
    #[error("주봉 윈도우 부족: {ticker} (기준일: {end_date}, {available}주 < 필요 {required}주)")]
    InsufficientWindow {
        ticker: String,
        end_date: NaiveDate,
        available: usize,
        required: usize,
    },

    /// 종목을 찾을 수 없는 경우
    #[error("종목 데이터 없음: {ticker}")]
    TickerNotFound { ticker: String },

    /// 비정상 값(NaN/Inf) 치환 비율이 허용 범위를 넘은 경우
    #[error("비정상 값 비율 초과: {sanitized}/{total} ({rate:.4} > 허용 {limit:.4})")]
    SanitizationRateExceeded {
        sanitized: usize,
        total: usize,
        rate: f64,
        limit: f64,
    },

    /// 입력 데이터 로드 오류
    #[error("데이터 로드 실패: {path} - {reason}")]
    DataLoad { path: String, reason: String },

    /// 데이터 파싱 오류
    #[error("파싱 오류: {data_type} 파싱 실패 - {reason}")]
    Parsing { data_type: String, reason: String },

    /// 유효성 검증 오류
    #[error("유효성 검증 실패: {field} - {reason}")]
    Validation { field: String, reason: String },

    /// 텐서/메타데이터 내보내기 오류
    #[error("내보내기 실패: {operation} - {reason}")]
    Export { operation: String, reason: String },

    /// 일반적인 I/O 오류
    #[error("I/O 오류: {operation} - {source}")]
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// 일반적인 오류 (기타)
    #[error("오류: {message}")]
    General { message: String },
}

/// 파이프라인 전체에서 사용하는 Result 타입 별칭
pub type ForecastResult<T> = Result<T, ForecastError>;

impl ForecastError {
    /// 일봉 시계열 오류를 간편하게 생성하는 헬퍼 함수
    pub fn invalid_daily_series(ticker: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidDailySeries {
            ticker: ticker.into(),
            reason: reason.into(),
        }
    }

    /// 주봉 윈도우 부족 오류를 생성하는 헬퍼 함수
    pub fn insufficient_window(
        ticker: impl Into<String>,
        end_date: NaiveDate,
        available: usize,
        required: usize,
    ) -> Self {
        Self::InsufficientWindow {
            ticker: ticker.into(),
            end_date,
            available,
            required,
        }
    }

    pub fn ticker_not_found(ticker: impl Into<String>) -> Self {
        Self::TickerNotFound {
            ticker: ticker.into(),
        }
    }

    /// 데이터 로드 오류를 간편하게 생성하는 헬퍼 함수
    pub fn data_load(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DataLoad {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// 데이터 파싱 오류를 간편하게 생성하는 헬퍼 함수
    pub fn parsing(data_type: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parsing {
            data_type: data_type.into(),
            reason: reason.into(),
        }
    }

    /// 유효성 검증 오류를 간편하게 생성하는 헬퍼 함수
    pub fn validation(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// 내보내기 오류를 간편하게 생성하는 헬퍼 함수
    pub fn export(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Export {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    /// I/O 오류에 작업 이름을 붙여 생성하는 헬퍼 함수
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            source,
        }
    }

    /// 일반적인 오류를 생성하는 헬퍼 함수
    pub fn general(message: impl Into<String>) -> Self {
        Self::General {
            message: message.into(),
        }
    }

    /// 배치 단위에서 건너뛰어도 되는 종목 단위 오류인지 여부
    pub fn is_ticker_level(&self) -> bool {
        matches!(
            self,
            Self::InvalidDailySeries { .. }
                | Self::InsufficientHistory { .. }
                | Self::InsufficientWindow { .. }
                | Self::TickerNotFound { .. }
        )
    }
}

/// std::io::Error를 ForecastError로 변환
impl From<std::io::Error> for ForecastError {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            operation: "파일 I/O".to_string(),
            source: error,
        }
    }
}

/// serde_json 오류를 ForecastError로 변환
impl From<serde_json::Error> for ForecastError {
    fn from(error: serde_json::Error) -> Self {
        Self::parsing("JSON", error.to_string())
    }
}

/// ndarray shape 오류를 ForecastError로 변환
impl From<ndarray::ShapeError> for ForecastError {
    fn from(error: ndarray::ShapeError) -> Self {
        Self::export("텐서 shape 구성", error.to_string())
    }
}

/// &str을 ForecastError로 변환
impl From<&str> for ForecastError {
    fn from(message: &str) -> Self {
        Self::General {
            message: message.to_string(),
        }
    }
}

/// String을 ForecastError로 변환
impl From<String> for ForecastError {
    fn from(message: String) -> Self {
        Self::General { message }
    }
}
