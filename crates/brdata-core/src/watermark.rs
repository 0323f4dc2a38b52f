// Ingestion watermark
//
// The most recent period present in a table's ingested records. Stored per
// dataset/table and only ever moved forward.

use std::fmt;

use chrono::{Datelike, Months, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::partition::{COL_MONTH, COL_YEAR};
use crate::record::{Record, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Watermark(NaiveDate);

impl Watermark {
    pub fn new(date: NaiveDate) -> Self {
        Self(date)
    }

    /// First day of the given month.
    pub fn from_year_month(year: i32, month: u32) -> Option<Self> {
        NaiveDate::from_ymd_opt(year, month, 1).map(Self)
    }

    pub fn date(&self) -> NaiveDate {
        self.0
    }

    /// Render for the metadata updater.
    pub fn format(&self, format: DateFormat) -> String {
        match format {
            DateFormat::YearMonth => format!("{:04}-{:02}", self.0.year(), self.0.month()),
            DateFormat::YearMonthDay => self.0.format("%Y-%m-%d").to_string(),
        }
    }

    /// The later of the two. Watermarks never move backwards.
    pub fn advance(self, candidate: Watermark) -> Watermark {
        self.max(candidate)
    }

    /// Start of the month `n` months before this one.
    pub fn months_back(&self, n: u32) -> Option<Watermark> {
        let first = NaiveDate::from_ymd_opt(self.0.year(), self.0.month(), 1)?;
        first.checked_sub_months(Months::new(n)).map(Self)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.format("%Y-%m-%d"))
    }
}

/// How the metadata catalogue expects coverage dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DateFormat {
    #[default]
    #[serde(rename = "yy-mm")]
    YearMonth,
    #[serde(rename = "yy-mm-dd")]
    YearMonthDay,
}

/// Where the period of a record comes from.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WatermarkSource {
    /// `ano` + `mes` columns.
    #[default]
    YearMonth,
    /// A single `YYYY-MM-DD` column.
    DateColumn(String),
}

impl WatermarkSource {
    pub fn extract(&self, record: &Record) -> Option<Watermark> {
        match self {
            WatermarkSource::YearMonth => {
                let year = record.get(COL_YEAR).and_then(Value::as_i64)?;
                let month = record.get(COL_MONTH).and_then(Value::as_i64)?;
                Watermark::from_year_month(i32::try_from(year).ok()?, u32::try_from(month).ok()?)
            }
            WatermarkSource::DateColumn(column) => {
                let raw = record.get(column)?.to_string();
                NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
                    .ok()
                    .map(Watermark)
            }
        }
    }
}

/// Maximum period across a record set, `None` when no record carries one.
pub fn max_watermark<'a, I>(records: I, source: &WatermarkSource) -> Option<Watermark>
where
    I: IntoIterator<Item = &'a Record>,
{
    records
        .into_iter()
        .filter_map(|record| source.extract(record))
        .max()
}
