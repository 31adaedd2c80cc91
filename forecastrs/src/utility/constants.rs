//! 모델과 주고받는 텐서 계약 및 데이터 처리 상수
//!
//! 컬럼 순서는 학습/추론 모두에서 바이트 단위로 동일해야 하며,
//! 순서를 바꾸면 모델을 다시 학습해야 한다.

/// 입력 주 수 (3년)
pub const N_WEEKS_INPUT: usize = 156;
/// 주봉 시계열 특징 수
pub const N_WEEKLY_FEATURES: usize = 23;
/// 정적 특징 수
pub const N_STATIC_FEATURES: usize = 6;
/// 위치 특징 수
pub const N_POSITION_FEATURES: usize = 2;
/// 예측 대상 개월 수 (1~12개월)
pub const N_OUTPUT_MONTHS: usize = 12;

pub const WEEKS_PER_YEAR: usize = 52;
/// 정적 특징 계산의 기본 lookback 기간 (년)
pub const LOOKBACK_YEARS_DEFAULT: u32 = 3;
/// 파인튜닝 시 일봉 로드 기간 (년)
pub const FINETUNE_LOOKBACK_YEARS: u32 = 5;
/// 종목당 최소 일봉 개수
pub const MIN_DAILY_RECORDS_PER_TICKER: usize = 200;
/// 장기 통계 계산에 필요한 최소 주 수
pub const MIN_STATIC_WEEKS: usize = 10;

/// 0 나눗셈 방지용 분모 보정값
pub const EPSILON: f64 = 1e-8;

/// 매핑되지 않은 섹터의 ID
pub const UNKNOWN_SECTOR_ID: i64 = 0;
pub const UNKNOWN_SECTOR_NAME: &str = "Unknown";

/// 주봉 특징 컬럼 (23개, 정규 순서)
pub const WEEKLY_FEATURE_COLUMNS: [&str; N_WEEKLY_FEATURES] = [
    // OHLCV (5)
    "OpenWeek",
    "HighWeek",
    "LowWeek",
    "CloseWeek",
    "VolumeWeek",
    // 수익률 (5)
    "RetWeek",
    "Ret4W",
    "Ret13W",
    "Ret26W",
    "Ret52W",
    // 이동평균 (3)
    "MA_4W",
    "MA_13W",
    "MA_26W",
    // 추세 위치 (3)
    "PriceVsMA_4W",
    "PriceVsMA_13W",
    "PriceVsMA_26W",
    // 고가/저가 위치 (2)
    "PriceVs52WH",
    "PriceVs52WL",
    // 변동성 (2)
    "Vol_13W",
    "Vol_26W",
    // 거래량 (1)
    "VolumeRatio",
    // 캔들 형태 (2)
    "BodyRatio",
    "ClosePosInRange",
];

/// 정적 특징 컬럼 (6개, 정규 순서)
pub const STATIC_FEATURE_COLUMNS: [&str; N_STATIC_FEATURES] = [
    // 장기 통계 (3)
    "LongTermMeanRet",
    "LongTermVol",
    "LongTermMaxDD",
    // 밸류에이션 (3)
    "PER",
    "PBR",
    "DividendYield",
];

/// 모델 입력 이름 (텐서 번들 필드 순서와 동일)
pub const MODEL_INPUT_NAMES: [&str; 4] =
    ["weekly_seq", "static_features", "position_features", "sector_id"];
