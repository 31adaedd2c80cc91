//! 일봉 스냅샷 디렉토리, 유니버스 테이블, 섹터 테이블 로더
//!
//! 스냅샷 파일 하나 = 하루치 전체 종목:
//! `{"as_of": "YYYY-MM-DD", "symbols": [{"ticker", "open", "high", "low", "close", "adjclose", "volume"}]}`

use chrono::{Duration, NaiveDate};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::sector_manager::{normalize_sector, SectorMapper, UniverseEntry, Valuation, ValuationTable};
use crate::types::{DailyBar, DailySeries, SkippedTicker};
use crate::utility::errors::{ForecastError, ForecastResult};

const LATEST_SNAPSHOT_FILE: &str = "latest.json";

#[derive(Debug, Deserialize)]
struct DailySnapshot {
    as_of: Option<String>,
    #[serde(default)]
    symbols: Vec<SnapshotSymbol>,
}

#[derive(Debug, Deserialize)]
struct SnapshotSymbol {
    ticker: String,
    open: Option<f64>,
    high: Option<f64>,
    low: Option<f64>,
    close: Option<f64>,
    adjclose: Option<f64>,
    volume: Option<f64>,
}

impl SnapshotSymbol {
    fn to_bar(&self, date: NaiveDate) -> DailyBar {
        let value = |v: Option<f64>| v.unwrap_or(f64::NAN);
        DailyBar {
            date,
            open: value(self.open),
            high: value(self.high),
            low: value(self.low),
            close: value(self.close),
            adj_close: value(self.adjclose),
            volume: value(self.volume),
        }
    }
}

/// 스냅샷 로드 범위
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotLoadOptions {
    /// 기준일로부터 거슬러 올라갈 일수 (None이면 전체)
    pub lookback_days: Option<i64>,
    /// 기준일 (None이면 가장 최근 스냅샷 날짜), 이후 파일은 읽지 않는다
    pub as_of: Option<NaiveDate>,
}

/// 종목 코드 -> 일봉 시계열
#[derive(Debug, Clone, Default)]
pub struct DailyPanel {
    series: BTreeMap<String, DailySeries>,
    /// 로드 단계에서 제외된 종목 (예: 중복 날짜)
    rejected: Vec<SkippedTicker>,
}

impl DailyPanel {
    pub fn from_series(series: Vec<DailySeries>) -> ForecastResult<Self> {
        let mut map = BTreeMap::new();
        for s in series {
            let ticker = s.ticker().to_string();
            if map.insert(ticker.clone(), s).is_some() {
                return Err(ForecastError::invalid_daily_series(ticker, "종목이 두 번 입력되었습니다"));
            }
        }
        Ok(Self {
            series: map,
            rejected: Vec::new(),
        })
    }

    pub fn with_rejected(mut self, rejected: Vec<SkippedTicker>) -> Self {
        self.rejected = rejected;
        self
    }

    pub fn rejected(&self) -> &[SkippedTicker] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.series.len()
    }

    pub fn is_empty(&self) -> bool {
        self.series.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<&DailySeries> {
        self.series.get(ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.series.keys().map(String::as_str)
    }

    /// 전체 종목 중 가장 최근 일봉 날짜
    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.series.values().filter_map(DailySeries::last_date).max()
    }

    pub fn into_series(self) -> Vec<DailySeries> {
        self.series.into_values().collect()
    }
}

fn snapshot_files(dir: &Path) -> ForecastResult<Vec<PathBuf>> {
    let entries = fs::read_dir(dir)
        .map_err(|e| ForecastError::data_load(dir.display().to_string(), e.to_string()))?;

    let mut files = Vec::new();
    for entry in entries {
        let path = entry?.path();
        let is_json = path.extension().and_then(|e| e.to_str()) == Some("json");
        let is_latest = path.file_name().and_then(|n| n.to_str()) == Some(LATEST_SNAPSHOT_FILE);
        if is_json && !is_latest {
            files.push(path);
        }
    }
    files.sort();
    Ok(files)
}

fn parse_date(value: &str) -> ForecastResult<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|e| ForecastError::parsing("날짜", format!("{}: {}", value, e)))
}

/// 파일명(YYYY-MM-DD.json)에서 날짜 추출, 형식이 다르면 None
fn file_date(path: &Path) -> Option<NaiveDate> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
}

fn read_snapshot(path: &Path) -> ForecastResult<(NaiveDate, Vec<SnapshotSymbol>)> {
    let content = fs::read_to_string(path)
        .map_err(|e| ForecastError::data_load(path.display().to_string(), e.to_string()))?;
    let snapshot: DailySnapshot = serde_json::from_str(&content)?;
    let as_of = snapshot
        .as_of
        .ok_or_else(|| ForecastError::parsing("스냅샷", "as_of 필드 없음"))?;
    Ok((parse_date(&as_of)?, snapshot.symbols))
}

/// 일봉 스냅샷 디렉토리를 읽어 종목별 시계열로 재구성
///
/// 손상된 파일은 경고 후 건너뛴다. 읽을 파일이 하나도 없으면 DataLoad 오류.
pub fn load_daily_snapshots(dir: impl AsRef<Path>, options: &SnapshotLoadOptions) -> ForecastResult<DailyPanel> {
    let dir = dir.as_ref();
    let mut files = snapshot_files(dir)?;
    if files.is_empty() {
        return Err(ForecastError::data_load(
            dir.display().to_string(),
            "JSON 스냅샷 파일이 없습니다",
        ));
    }

    if options.lookback_days.is_some() || options.as_of.is_some() {
        let reference = options
            .as_of
            .or_else(|| files.iter().filter_map(|f| file_date(f)).max());
        if let Some(reference) = reference {
            let cutoff = options.lookback_days.map(|days| reference - Duration::days(days));
            files.retain(|f| match file_date(f) {
                Some(date) => date <= reference && cutoff.map_or(true, |c| date >= c),
                None => false,
            });
            info!(
                "스냅샷 범위 제한: {} ~ {} ({}개 파일)",
                cutoff.map_or_else(|| "처음".to_string(), |c| c.to_string()),
                reference,
                files.len()
            );
        }
    }
    if files.is_empty() {
        return Err(ForecastError::data_load(
            dir.display().to_string(),
            "범위 필터 후 남은 스냅샷 파일이 없습니다",
        ));
    }

    let mut by_ticker: BTreeMap<String, Vec<DailyBar>> = BTreeMap::new();
    let mut failed = 0usize;
    for path in &files {
        match read_snapshot(path) {
            Ok((date, symbols)) => {
                if symbols.is_empty() {
                    debug!("종목 없는 스냅샷: {}", path.display());
                }
                for symbol in &symbols {
                    by_ticker
                        .entry(symbol.ticker.clone())
                        .or_default()
                        .push(symbol.to_bar(date));
                }
            }
            Err(e) => {
                failed += 1;
                warn!("스냅샷 읽기 실패, 건너뜀: {} - {}", path.display(), e);
            }
        }
    }
    if failed == files.len() {
        return Err(ForecastError::data_load(
            dir.display().to_string(),
            "읽을 수 있는 스냅샷이 없습니다",
        ));
    }

    let mut series = Vec::with_capacity(by_ticker.len());
    let mut rejected = Vec::new();
    for (ticker, bars) in by_ticker {
        match DailySeries::new(ticker.as_str(), bars) {
            Ok(s) => series.push(s),
            Err(e) if e.is_ticker_level() => {
                warn!("일봉 시계열 오류, 종목 제외: {}", e);
                rejected.push(SkippedTicker {
                    ticker,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    let panel = DailyPanel::from_series(series)?.with_rejected(rejected);

    info!(
        "✅ 일봉 스냅샷 로드 완료: {}개 파일, {}개 종목 (실패 {}, 제외 종목 {})",
        files.len() - failed,
        panel.len(),
        failed,
        panel.rejected().len()
    );
    Ok(panel)
}

#[derive(Debug, Deserialize)]
struct UniverseFile {
    #[serde(default)]
    universe: Vec<UniverseRecord>,
}

#[derive(Debug, Deserialize)]
struct UniverseRecord {
    ticker: String,
    sector: Option<String>,
    #[serde(alias = "PER")]
    per: Option<f64>,
    #[serde(alias = "PBR")]
    pbr: Option<f64>,
    #[serde(alias = "DividendYield")]
    dividend_yield: Option<f64>,
}

impl From<UniverseRecord> for UniverseEntry {
    fn from(record: UniverseRecord) -> Self {
        Self {
            sector: normalize_sector(record.sector.as_deref()),
            ticker: record.ticker,
            valuation: Valuation {
                per: record.per,
                pbr: record.pbr,
                dividend_yield: record.dividend_yield,
            },
        }
    }
}

fn read_toml_file(path: &Path) -> ForecastResult<String> {
    if !path.exists() {
        return Err(ForecastError::data_load(
            path.display().to_string(),
            "파일이 존재하지 않습니다",
        ));
    }
    fs::read_to_string(path).map_err(|e| ForecastError::data_load(path.display().to_string(), e.to_string()))
}

pub fn parse_universe(content: &str) -> ForecastResult<ValuationTable> {
    let file: UniverseFile =
        toml::from_str(content).map_err(|e| ForecastError::parsing("universe TOML", e.to_string()))?;
    ValuationTable::from_entries(file.universe.into_iter().map(UniverseEntry::from).collect())
}

/// 유니버스(종목별 섹터/밸류에이션) 테이블 로드
pub fn load_universe(path: impl AsRef<Path>) -> ForecastResult<ValuationTable> {
    let path = path.as_ref();
    let table = parse_universe(&read_toml_file(path)?)?;
    info!("유니버스 로드 완료: {}개 종목 ({})", table.len(), path.display());
    Ok(table)
}

#[derive(Debug, Deserialize)]
struct SectorFile {
    #[serde(default)]
    sectors: Vec<SectorRecord>,
}

#[derive(Debug, Deserialize)]
struct SectorRecord {
    name: String,
    id: i64,
}

pub fn parse_sectors(content: &str) -> ForecastResult<SectorMapper> {
    let file: SectorFile =
        toml::from_str(content).map_err(|e| ForecastError::parsing("sectors TOML", e.to_string()))?;
    SectorMapper::from_pairs(file.sectors.into_iter().map(|s| (s.name, s.id)))
}

/// 섹터 이름 -> ID 테이블 로드
pub fn load_sectors(path: impl AsRef<Path>) -> ForecastResult<SectorMapper> {
    let path = path.as_ref();
    let mapper = parse_sectors(&read_toml_file(path)?)?;
    info!(
        "섹터 테이블 로드 완료: {}개 섹터 (임베딩 크기 {})",
        mapper.mapping().len(),
        mapper.num_sectors()
    );
    Ok(mapper)
}
