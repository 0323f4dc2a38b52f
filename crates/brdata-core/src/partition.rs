//! Partition keys and Hive-style partition paths
//!
//! Records are grouped by `(ano, mes[, sigla_uf])` and written under
//! `ano=<year>/mes=<month>[/sigla_uf=<UF>]`. Month is rendered unpadded.

use std::fmt;
use std::ops::Range;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::geo::{BrazilState, Month};
use crate::municipality::{correct_record, CorrectedRecord};
use crate::record::{Record, Value};

pub const COL_YEAR: &str = "ano";
pub const COL_MONTH: &str = "mes";
pub const COL_STATE: &str = "sigla_uf";
pub const COL_MUNICIPALITY: &str = "id_municipio";

/// Years with published data. Upper bound exclusive.
pub const SUPPORTED_YEARS: Range<i32> = 1997..2024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PartitionKey {
    pub year: i32,
    pub month: Month,
    pub state: Option<BrazilState>,
}

impl PartitionKey {
    pub fn segments(&self) -> Vec<String> {
        let mut segments = vec![
            format!("{}={}", COL_YEAR, self.year),
            format!("{}={}", COL_MONTH, self.month),
        ];
        if let Some(state) = self.state {
            segments.push(format!("{}={}", COL_STATE, state));
        }
        segments
    }

    pub fn relative_dir(&self) -> PathBuf {
        self.segments().iter().collect()
    }

    /// Parse `ano=2020/mes=3[/sigla_uf=SP]` back into a key.
    pub fn parse(path: &str) -> Result<Self, PartitionPathError> {
        let invalid = || PartitionPathError(path.to_string());
        let mut parts = path.trim_matches('/').split('/');

        let year = segment_value(parts.next(), COL_YEAR)
            .and_then(|v| v.parse::<i32>().ok())
            .ok_or_else(invalid)?;
        let month = segment_value(parts.next(), COL_MONTH)
            .and_then(|v| v.parse::<u32>().ok())
            .and_then(Month::new)
            .ok_or_else(invalid)?;
        let state = match parts.next() {
            None => None,
            Some(segment) => Some(
                segment_value(Some(segment), COL_STATE)
                    .and_then(|v| v.parse::<BrazilState>().ok())
                    .ok_or_else(invalid)?,
            ),
        };
        if parts.next().is_some() {
            return Err(invalid());
        }

        Ok(Self { year, month, state })
    }
}

fn segment_value<'a>(segment: Option<&'a str>, column: &str) -> Option<&'a str> {
    segment?.strip_prefix(column)?.strip_prefix('=')
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments().join("/"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Not a partition path: '{0}'")]
pub struct PartitionPathError(pub String);

/// Which columns define a partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Granularity {
    /// `ano/mes`
    Month,
    /// `ano/mes/sigla_uf`
    MonthState,
}

impl Granularity {
    pub fn partition_columns(&self) -> &'static [&'static str] {
        match self {
            Granularity::Month => &[COL_YEAR, COL_MONTH],
            Granularity::MonthState => &[COL_YEAR, COL_MONTH, COL_STATE],
        }
    }
}

/// Why a record could not be assigned a partition. The record is dropped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Unpartitionable {
    #[error("missing column '{0}'")]
    MissingField(&'static str),

    #[error("column '{column}' has unparseable value '{value}'")]
    InvalidField { column: &'static str, value: String },

    #[error("year {0} outside the partitioned range")]
    YearOutOfRange(i64),

    #[error("month {0} outside 1..=12")]
    MonthOutOfRange(i64),

    #[error("unknown state '{0}'")]
    UnknownState(String),

    #[error("state {0} not partitioned for this table")]
    StateNotInScheme(BrazilState),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Invalid year range {start}..{end}: must be non-empty and within {}..{}", SUPPORTED_YEARS.start, SUPPORTED_YEARS.end)]
pub struct InvalidYearRange {
    pub start: i32,
    pub end: i32,
}

/// The set of partitions a table is written into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionScheme {
    granularity: Granularity,
    years: Range<i32>,
    states: Vec<BrazilState>,
}

impl PartitionScheme {
    pub fn new(granularity: Granularity) -> Self {
        Self {
            granularity,
            years: SUPPORTED_YEARS,
            states: BrazilState::ALL.to_vec(),
        }
    }

    /// Restrict the year range. Must be a non-empty subrange of the supported years.
    pub fn with_years(mut self, years: Range<i32>) -> Result<Self, InvalidYearRange> {
        if years.is_empty()
            || years.start < SUPPORTED_YEARS.start
            || years.end > SUPPORTED_YEARS.end
        {
            return Err(InvalidYearRange {
                start: years.start,
                end: years.end,
            });
        }
        self.years = years;
        Ok(self)
    }

    pub fn with_states(mut self, states: Vec<BrazilState>) -> Self {
        self.states = states;
        self
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn years(&self) -> Range<i32> {
        self.years.clone()
    }

    pub fn partition_columns(&self) -> &'static [&'static str] {
        self.granularity.partition_columns()
    }

    /// Derive the key from the record's canonical columns.
    pub fn derive(&self, record: &Record) -> Result<PartitionKey, Unpartitionable> {
        let year = int_field(record, COL_YEAR)?;
        if year < i64::from(self.years.start) || year >= i64::from(self.years.end) {
            return Err(Unpartitionable::YearOutOfRange(year));
        }

        let month_number = int_field(record, COL_MONTH)?;
        let month = u32::try_from(month_number)
            .ok()
            .and_then(Month::new)
            .ok_or(Unpartitionable::MonthOutOfRange(month_number))?;

        let state = match self.granularity {
            Granularity::Month => None,
            Granularity::MonthState => {
                let raw = field(record, COL_STATE)?.to_string();
                let state = raw
                    .parse::<BrazilState>()
                    .map_err(|_| Unpartitionable::UnknownState(raw.clone()))?;
                if !self.states.contains(&state) {
                    return Err(Unpartitionable::StateNotInScheme(state));
                }
                Some(state)
            }
        };

        Ok(PartitionKey {
            year: year as i32,
            month,
            state,
        })
    }

    /// Every key this scheme writes, in ascending order.
    pub fn expected_keys(&self) -> Vec<PartitionKey> {
        let mut keys = Vec::new();
        for year in self.years.clone() {
            for month in Month::all() {
                match self.granularity {
                    Granularity::Month => keys.push(PartitionKey {
                        year,
                        month,
                        state: None,
                    }),
                    Granularity::MonthState => {
                        keys.extend(self.states.iter().map(|state| PartitionKey {
                            year,
                            month,
                            state: Some(*state),
                        }))
                    }
                }
            }
        }
        keys.sort();
        keys
    }

    pub fn contains(&self, key: &PartitionKey) -> bool {
        self.years.contains(&key.year)
            && match (self.granularity, key.state) {
                (Granularity::Month, None) => true,
                (Granularity::MonthState, Some(state)) => self.states.contains(&state),
                _ => false,
            }
    }
}

/// Present, non-blank value of a column.
fn field<'a>(record: &'a Record, column: &'static str) -> Result<&'a Value, Unpartitionable> {
    match record.get(column) {
        Some(value) if !value.to_string().trim().is_empty() => Ok(value),
        _ => Err(Unpartitionable::MissingField(column)),
    }
}

fn int_field(record: &Record, column: &'static str) -> Result<i64, Unpartitionable> {
    let value = field(record, column)?;
    value.as_i64().ok_or_else(|| Unpartitionable::InvalidField {
        column,
        value: value.to_string(),
    })
}

pub fn derive_partition_key(
    record: &CorrectedRecord,
    scheme: &PartitionScheme,
) -> Result<PartitionKey, Unpartitionable> {
    scheme.derive(record.as_record())
}

/// Correct the municipality code, then derive the partition key from the
/// corrected record. Never fails; an out-of-range record gets `Err` in place
/// of a key.
pub fn correct_and_key(
    record: Record,
    scheme: &PartitionScheme,
) -> (CorrectedRecord, Result<PartitionKey, Unpartitionable>) {
    let corrected = correct_record(record);
    let key = derive_partition_key(&corrected, scheme);
    (corrected, key)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(year: &str, month: &str, state: &str, municipality: &str) -> Record {
        [
            (COL_YEAR, Value::from(year)),
            (COL_MONTH, Value::from(month)),
            (COL_STATE, Value::from(state)),
            (COL_MUNICIPALITY, Value::from(municipality)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_key_display() {
        let key = PartitionKey {
            year: 2020,
            month: Month::new(3).unwrap(),
            state: Some(BrazilState::SaoPaulo),
        };
        assert_eq!(key.to_string(), "ano=2020/mes=3/sigla_uf=SP");
        assert_eq!(
            key.relative_dir(),
            PathBuf::from("ano=2020").join("mes=3").join("sigla_uf=SP")
        );
    }

    #[test]
    fn test_every_supported_key_round_trips() {
        for granularity in [Granularity::Month, Granularity::MonthState] {
            for key in PartitionScheme::new(granularity).expected_keys() {
                assert_eq!(PartitionKey::parse(&key.to_string()), Ok(key));
            }
        }
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(PartitionKey::parse("ano=2020").is_err());
        assert!(PartitionKey::parse("ano=2020/mes=13").is_err());
        assert!(PartitionKey::parse("ano=2020/mes=3/sigla_uf=XX").is_err());
        assert!(PartitionKey::parse("ano=2020/mes=3/sigla_uf=SP/extra").is_err());
        assert!(PartitionKey::parse("year=2020/mes=3").is_err());
    }

    #[test]
    fn test_correct_and_key() {
        let scheme = PartitionScheme::new(Granularity::MonthState);
        let (record, key) = correct_and_key(row("2020", " 3 ", "SP", "3400000"), &scheme);

        assert_eq!(
            record.as_record().get(COL_MUNICIPALITY),
            Some(&Value::Int(3_500_000))
        );
        assert_eq!(key.unwrap().to_string(), "ano=2020/mes=3/sigla_uf=SP");
    }

    #[test]
    fn test_out_of_range_records() {
        let scheme = PartitionScheme::new(Granularity::MonthState);
        let cases = [
            (row("1996", "1", "SP", "1"), Unpartitionable::YearOutOfRange(1996)),
            (row("2024", "1", "SP", "1"), Unpartitionable::YearOutOfRange(2024)),
            (row("2020", "0", "SP", "1"), Unpartitionable::MonthOutOfRange(0)),
            (row("2020", "13", "SP", "1"), Unpartitionable::MonthOutOfRange(13)),
            (row("2020", "1", "ZZ", "1"), Unpartitionable::UnknownState("ZZ".into())),
            (row("", "1", "SP", "1"), Unpartitionable::MissingField(COL_YEAR)),
        ];
        for (record, expected) in cases {
            let (_, key) = correct_and_key(record, &scheme);
            assert_eq!(key, Err(expected));
        }
    }

    #[test]
    fn test_month_granularity_ignores_state() {
        let scheme = PartitionScheme::new(Granularity::Month);
        let key = scheme.derive(&row("2021", "12", "", "")).unwrap();
        assert_eq!(key.to_string(), "ano=2021/mes=12");
    }

    #[test]
    fn test_with_years() {
        let scheme = PartitionScheme::new(Granularity::Month)
            .with_years(2020..2022)
            .unwrap();
        assert_eq!(scheme.expected_keys().len(), 24);
        assert_eq!(
            scheme.derive(&row("2019", "1", "SP", "")),
            Err(Unpartitionable::YearOutOfRange(2019))
        );

        assert!(PartitionScheme::new(Granularity::Month)
            .with_years(2020..2020)
            .is_err());
        assert!(PartitionScheme::new(Granularity::Month)
            .with_years(1990..2000)
            .is_err());
    }

    #[test]
    fn test_expected_keys_cross_product() {
        let scheme = PartitionScheme::new(Granularity::MonthState)
            .with_years(2020..2021)
            .unwrap()
            .with_states(vec![BrazilState::SaoPaulo, BrazilState::Acre]);
        let keys = scheme.expected_keys();
        assert_eq!(keys.len(), 24);
        assert!(keys.windows(2).all(|w| w[0] < w[1]));
        assert!(keys.iter().all(|k| scheme.contains(k)));
        assert_eq!(
            scheme.derive(&row("2020", "1", "RJ", "")),
            Err(Unpartitionable::StateNotInScheme(BrazilState::RioDeJaneiro))
        );
    }
}
