use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::utility::constants::{UNKNOWN_SECTOR_ID, UNKNOWN_SECTOR_NAME};
use crate::utility::errors::{ForecastError, ForecastResult};

/// 종목별 밸류에이션 지표 (없으면 None, 보간은 정적 특징 계산기에서만 수행)
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Valuation {
    pub per: Option<f64>,
    pub pbr: Option<f64>,
    pub dividend_yield: Option<f64>,
}

impl Valuation {
    pub fn as_array(&self) -> [Option<f64>; 3] {
        [self.per, self.pbr, self.dividend_yield]
    }
}

/// 유니버스 항목: 종목의 섹터와 밸류에이션
#[derive(Debug, Clone, PartialEq)]
pub struct UniverseEntry {
    pub ticker: String,
    /// None이면 섹터 정보 없음, "Unknown"은 보간 시 하나의 섹터 그룹으로 취급
    pub sector: Option<String>,
    pub valuation: Valuation,
}

/// 섹터명을 정규화: 공백 제거, 빈 문자열은 섹터 없음
pub fn normalize_sector(sector: Option<&str>) -> Option<String> {
    sector
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// 종목 -> (섹터, 밸류에이션) 타입 테이블
#[derive(Debug, Clone, Default)]
pub struct ValuationTable {
    entries: BTreeMap<String, UniverseEntry>,
}

impl ValuationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<UniverseEntry>) -> ForecastResult<Self> {
        let mut table = Self::new();
        for mut entry in entries {
            entry.sector = normalize_sector(entry.sector.as_deref());
            if table.entries.contains_key(&entry.ticker) {
                return Err(ForecastError::validation(
                    "universe",
                    format!("중복 종목: {}", entry.ticker),
                ));
            }
            table.entries.insert(entry.ticker.clone(), entry);
        }
        debug!("유니버스 테이블 구성: {}개 종목", table.entries.len());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, ticker: &str) -> Option<&UniverseEntry> {
        self.entries.get(ticker)
    }

    pub fn tickers(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    /// 종목의 섹터 (테이블에 없거나 섹터가 비어 있으면 None)
    pub fn sector_of(&self, ticker: &str) -> Option<&str> {
        self.entries
            .get(ticker)
            .and_then(|entry| entry.sector.as_deref())
    }

    /// 종목의 원본 밸류에이션 (테이블에 없으면 전부 None)
    pub fn valuation_of(&self, ticker: &str) -> Valuation {
        self.entries
            .get(ticker)
            .map(|entry| entry.valuation)
            .unwrap_or_default()
    }
}

/// 섹터명 -> 정수 ID 매핑
/// ID 0은 Unknown으로 예약되어 있으며, 매핑되지 않은 섹터는 모두 0으로 간다
#[derive(Debug, Clone, PartialEq)]
pub struct SectorMapper {
    name_to_id: BTreeMap<String, i64>,
}

impl SectorMapper {
    /// Unknown만 있는 매퍼
    pub fn unknown_only() -> Self {
        let mut name_to_id = BTreeMap::new();
        name_to_id.insert(UNKNOWN_SECTOR_NAME.to_string(), UNKNOWN_SECTOR_ID);
        Self { name_to_id }
    }

    /// (섹터명, ID) 목록으로 생성
    /// 이름/ID 중복, 음수 ID, Unknown 이외 섹터의 ID 0 사용은 거부한다
    pub fn from_pairs<I, S>(pairs: I) -> ForecastResult<Self>
    where
        I: IntoIterator<Item = (S, i64)>,
        S: Into<String>,
    {
        let mut mapper = Self::unknown_only();
        let mut used_ids: BTreeMap<i64, String> = BTreeMap::new();
        used_ids.insert(UNKNOWN_SECTOR_ID, UNKNOWN_SECTOR_NAME.to_string());

        for (name, id) in pairs {
            let name: String = name.into();
            let name = name.trim().to_string();

            if name == UNKNOWN_SECTOR_NAME {
                if id != UNKNOWN_SECTOR_ID {
                    return Err(ForecastError::validation(
                        "sectors",
                        format!("{}의 ID는 {}이어야 합니다: {}", UNKNOWN_SECTOR_NAME, UNKNOWN_SECTOR_ID, id),
                    ));
                }
                continue;
            }
            if name.is_empty() {
                return Err(ForecastError::validation("sectors", "빈 섹터명"));
            }
            if id < 0 {
                return Err(ForecastError::validation(
                    "sectors",
                    format!("음수 섹터 ID: {} = {}", name, id),
                ));
            }
            if let Some(existing) = used_ids.get(&id) {
                return Err(ForecastError::validation(
                    "sectors",
                    format!("섹터 ID 중복: {} ({}, {})", id, existing, name),
                ));
            }
            if mapper.name_to_id.contains_key(&name) {
                return Err(ForecastError::validation(
                    "sectors",
                    format!("섹터명 중복: {}", name),
                ));
            }

            used_ids.insert(id, name.clone());
            mapper.name_to_id.insert(name, id);
        }

        info!("섹터 매핑 로드 완료: {}개 섹터", mapper.name_to_id.len());
        Ok(mapper)
    }

    /// 섹터명 -> ID (None이거나 매핑에 없으면 0)
    pub fn id_of(&self, sector: Option<&str>) -> i64 {
        match sector {
            Some(name) => match self.name_to_id.get(name.trim()) {
                Some(id) => *id,
                None => {
                    debug!("매핑되지 않은 섹터: {} (Unknown으로 설정)", name);
                    UNKNOWN_SECTOR_ID
                }
            },
            None => UNKNOWN_SECTOR_ID,
        }
    }

    /// 유니버스 테이블을 통해 종목의 섹터 ID 조회
    pub fn id_for_ticker(&self, ticker: &str, valuations: &ValuationTable) -> i64 {
        self.id_of(valuations.sector_of(ticker))
    }

    /// 모델 임베딩 크기 (최대 ID + 1)
    pub fn num_sectors(&self) -> usize {
        self.name_to_id
            .values()
            .copied()
            .max()
            .map(|max_id| max_id as usize + 1)
            .unwrap_or(1)
    }

    /// 메타데이터 저장용 매핑
    pub fn mapping(&self) -> &BTreeMap<String, i64> {
        &self.name_to_id
    }
}

impl Default for SectorMapper {
    fn default() -> Self {
        Self::unknown_only()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(ticker: &str, sector: Option<&str>, per: Option<f64>) -> UniverseEntry {
        UniverseEntry {
            ticker: ticker.to_string(),
            sector: sector.map(str::to_string),
            valuation: Valuation {
                per,
                pbr: None,
                dividend_yield: None,
            },
        }
    }

    #[test]
    fn test_sector_mapper_lookup() {
        let mapper = SectorMapper::from_pairs(vec![("Technology", 1), ("Financials", 3)])
            .expect("valid sector table");

        assert_eq!(mapper.id_of(Some("Technology")), 1);
        assert_eq!(mapper.id_of(Some("Financials")), 3);
        assert_eq!(mapper.id_of(Some("Utilities")), UNKNOWN_SECTOR_ID);
        assert_eq!(mapper.id_of(None), UNKNOWN_SECTOR_ID);
        assert_eq!(mapper.id_of(Some("Unknown")), UNKNOWN_SECTOR_ID);
        assert_eq!(mapper.num_sectors(), 4);
        assert_eq!(SectorMapper::unknown_only().num_sectors(), 1);
    }

    #[test]
    fn test_sector_mapper_rejects_invalid_tables() {
        assert!(SectorMapper::from_pairs(vec![("A", 1), ("B", 1)]).is_err());
        assert!(SectorMapper::from_pairs(vec![("A", 1), ("A", 2)]).is_err());
        assert!(SectorMapper::from_pairs(vec![("A", 0)]).is_err());
        assert!(SectorMapper::from_pairs(vec![("Unknown", 5)]).is_err());
        assert!(SectorMapper::from_pairs(vec![("A", -1)]).is_err());
        assert!(SectorMapper::from_pairs(vec![("Unknown", 0), ("A", 1)]).is_ok());
    }

    #[test]
    fn test_valuation_table() {
        let table = ValuationTable::from_entries(vec![
            entry("AAA", Some("Technology"), Some(12.0)),
            entry("BBB", Some("Unknown"), None),
            entry("CCC", Some("  "), None),
        ])
        .expect("valid universe");

        assert_eq!(table.sector_of("AAA"), Some("Technology"));
        assert_eq!(table.sector_of("BBB"), Some("Unknown"));
        assert_eq!(table.sector_of("CCC"), None);
        assert_eq!(table.sector_of("ZZZ"), None);
        assert_eq!(table.valuation_of("AAA").per, Some(12.0));
        assert_eq!(table.valuation_of("ZZZ"), Valuation::default());

        let mapper = SectorMapper::from_pairs(vec![("Technology", 2)]).expect("valid sectors");
        assert_eq!(mapper.id_for_ticker("AAA", &table), 2);
        assert_eq!(mapper.id_for_ticker("BBB", &table), UNKNOWN_SECTOR_ID);
        assert_eq!(mapper.id_for_ticker("CCC", &table), UNKNOWN_SECTOR_ID);
        assert_eq!(mapper.id_for_ticker("ZZZ", &table), UNKNOWN_SECTOR_ID);

        let duplicated = ValuationTable::from_entries(vec![
            entry("AAA", None, None),
            entry("AAA", None, None),
        ]);
        assert!(duplicated.is_err());
    }
}
