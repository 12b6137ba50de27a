//! Core data types for the candle archive.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Timestamp in milliseconds since Unix epoch (UTC).
pub type TimestampMs = i64;

/// Number of columns in every stored candle row.
pub const COLUMN_COUNT: usize = 6;

/// The "no value" marker stored in unset cells.
pub const MISSING: f64 = f64::NAN;

/// Human-readable timestamp format accepted by [`parse_timestamp`].
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Check whether a cell holds the missing sentinel.
#[inline]
pub fn is_missing(value: f64) -> bool {
    value.is_nan()
}

/// Render a millisecond timestamp as a UTC date string for logs.
pub fn format_mts(mts: TimestampMs) -> String {
    match DateTime::from_timestamp_millis(mts) {
        Some(dt) => dt.format(TIMESTAMP_FORMAT).to_string(),
        None => format!("{mts}ms"),
    }
}

/// Parse a `%Y-%m-%d %H:%M:%S` UTC string into a millisecond timestamp.
pub fn parse_timestamp(s: &str) -> Result<TimestampMs> {
    let dt = NaiveDateTime::parse_from_str(s.trim(), TIMESTAMP_FORMAT).map_err(|e| {
        Error::invalid_query(format!("\"{s}\" is not a {TIMESTAMP_FORMAT} timestamp: {e}"))
    })?;
    Ok(dt.and_utc().timestamp_millis())
}

/// Bucket duration of a candle table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Resolution {
    M1,
    M5,
    M15,
    M30,
    H1,
    H3,
    H6,
    H12,
    D1,
    D7,
    D14,
    Month,
}

/// Identifier, canonical duration in seconds and storage table name,
/// indexed by `Resolution as usize`.
const RESOLUTION_TABLE: [(&str, i64, &str); 12] = [
    ("1m", 60, "candles_1m"),
    ("5m", 60 * 5, "candles_5m"),
    ("15m", 60 * 15, "candles_15m"),
    ("30m", 60 * 30, "candles_30m"),
    ("1h", 60 * 60, "candles_1h"),
    ("3h", 60 * 60 * 3, "candles_3h"),
    ("6h", 60 * 60 * 6, "candles_6h"),
    ("12h", 60 * 60 * 12, "candles_12h"),
    ("1D", 60 * 60 * 24, "candles_1d"),
    ("7D", 60 * 60 * 24 * 7, "candles_7d"),
    ("14D", 60 * 60 * 24 * 14, "candles_14d"),
    // A month is approximated as 31 days.
    ("1M", 60 * 60 * 24 * 31, "candles_1mo"),
];

impl Resolution {
    /// All resolutions, shortest first.
    pub const ALL: [Resolution; 12] = [
        Resolution::M1,
        Resolution::M5,
        Resolution::M15,
        Resolution::M30,
        Resolution::H1,
        Resolution::H3,
        Resolution::H6,
        Resolution::H12,
        Resolution::D1,
        Resolution::D7,
        Resolution::D14,
        Resolution::Month,
    ];

    /// Identifier used by the remote source (e.g. "1m", "1D", "1M").
    #[inline]
    pub fn as_str(self) -> &'static str {
        RESOLUTION_TABLE[self as usize].0
    }

    /// Canonical bucket duration in seconds.
    #[inline]
    pub fn duration_secs(self) -> i64 {
        RESOLUTION_TABLE[self as usize].1
    }

    /// Canonical bucket duration in milliseconds.
    #[inline]
    pub fn duration_ms(self) -> i64 {
        self.duration_secs() * 1000
    }

    /// Name of the table holding this resolution.
    ///
    /// Distinct from [`as_str`](Self::as_str) because storage identifiers
    /// are case-insensitive and "1m"/"1M" would collide.
    #[inline]
    pub fn table_name(self) -> &'static str {
        RESOLUTION_TABLE[self as usize].2
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Resolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Resolution::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Resolution::ALL.iter().map(|r| r.as_str()).collect();
                Error::invalid_query(format!(
                    "\"{s}\" is not a resolution, expected one of {valid:?}"
                ))
            })
    }
}

impl TryFrom<String> for Resolution {
    type Error = Error;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<Resolution> for String {
    fn from(r: Resolution) -> Self {
        r.as_str().to_string()
    }
}

/// One of the six fixed candle columns, in storage order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Column {
    Mts = 0,
    Open = 1,
    Close = 2,
    High = 3,
    Low = 4,
    Volume = 5,
}

impl Column {
    /// All columns in canonical order.
    pub const ALL: [Column; COLUMN_COUNT] = [
        Column::Mts,
        Column::Open,
        Column::Close,
        Column::High,
        Column::Low,
        Column::Volume,
    ];

    /// Position of the column within a row.
    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    /// Upper-case column name ("MTS", "OPEN", ...).
    pub fn name(self) -> &'static str {
        match self {
            Column::Mts => "MTS",
            Column::Open => "OPEN",
            Column::Close => "CLOSE",
            Column::High => "HIGH",
            Column::Low => "LOW",
            Column::Volume => "VOLUME",
        }
    }

    /// Lower-case name used for storage columns.
    pub fn field_name(self) -> &'static str {
        match self {
            Column::Mts => "mts",
            Column::Open => "open",
            Column::Close => "close",
            Column::High => "high",
            Column::Low => "low",
            Column::Volume => "volume",
        }
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Column {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().is_empty() {
            return Err(Error::schema("all columns must be named"));
        }
        Column::ALL
            .into_iter()
            .find(|c| c.name() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = Column::ALL.iter().map(|c| c.name()).collect();
                Error::schema(format!(
                    "\"{s}\" is not a column name, valid names are {valid:?}"
                ))
            })
    }
}

/// A single OHLCV row `(MTS, OPEN, CLOSE, HIGH, LOW, VOLUME)`.
///
/// Any cell may hold [`MISSING`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    values: [f64; COLUMN_COUNT],
}

impl Candle {
    /// Create a fully populated candle.
    pub fn new(mts: TimestampMs, open: f64, close: f64, high: f64, low: f64, volume: f64) -> Self {
        Self {
            values: [mts as f64, open, close, high, low, volume],
        }
    }

    /// A candle with every cell missing.
    pub fn missing() -> Self {
        Self {
            values: [MISSING; COLUMN_COUNT],
        }
    }

    /// Build a candle from raw cells in canonical order.
    pub fn from_values(values: [f64; COLUMN_COUNT]) -> Self {
        Self { values }
    }

    /// Raw cells in canonical order.
    #[inline]
    pub fn values(&self) -> &[f64; COLUMN_COUNT] {
        &self.values
    }

    #[inline]
    pub fn get(&self, column: Column) -> f64 {
        self.values[column.index()]
    }

    #[inline]
    pub fn set(&mut self, column: Column, value: f64) {
        self.values[column.index()] = value;
    }

    /// Raw MTS cell (may be missing).
    #[inline]
    pub fn mts(&self) -> f64 {
        self.values[Column::Mts.index()]
    }

    /// MTS as an integer timestamp, `None` when missing.
    #[inline]
    pub fn mts_ms(&self) -> Option<TimestampMs> {
        let mts = self.mts();
        if is_missing(mts) {
            None
        } else {
            Some(mts as TimestampMs)
        }
    }

    #[inline]
    pub fn open(&self) -> f64 {
        self.get(Column::Open)
    }

    #[inline]
    pub fn close(&self) -> f64 {
        self.get(Column::Close)
    }

    #[inline]
    pub fn high(&self) -> f64 {
        self.get(Column::High)
    }

    #[inline]
    pub fn low(&self) -> f64 {
        self.get(Column::Low)
    }

    #[inline]
    pub fn volume(&self) -> f64 {
        self.get(Column::Volume)
    }

    /// Cell-wise equality that treats two missing cells as equal.
    pub fn same_cells(&self, other: &Candle) -> bool {
        self.values
            .iter()
            .zip(other.values.iter())
            .all(|(a, b)| a == b || (is_missing(*a) && is_missing(*b)))
    }
}

/// A column-labelled block of rows, as read from or saved to a table.
///
/// Columns may repeat when produced by a selection query; saving validates
/// uniqueness.
#[derive(Debug, Clone, PartialEq)]
pub struct CandleFrame {
    columns: Vec<Column>,
    rows: Vec<Vec<f64>>,
}

impl CandleFrame {
    /// Create a frame, checking that every row has one cell per column.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<f64>>) -> Result<Self> {
        if let Some((i, row)) = rows
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != columns.len())
        {
            return Err(Error::schema(format!(
                "row {i} has {} cells but the frame has {} columns",
                row.len(),
                columns.len()
            )));
        }
        Ok(Self { columns, rows })
    }

    /// Create a frame from column names such as `["MTS", "HIGH"]`.
    pub fn from_named(names: &[&str], rows: Vec<Vec<f64>>) -> Result<Self> {
        let columns = names
            .iter()
            .map(|n| n.parse::<Column>())
            .collect::<Result<Vec<_>>>()?;
        Self::new(columns, rows)
    }

    /// Frame holding all six columns of the given candles.
    pub fn from_candles(candles: &[Candle]) -> Self {
        Self {
            columns: Column::ALL.to_vec(),
            rows: candles.iter().map(|c| c.values().to_vec()).collect(),
        }
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Values of the first occurrence of `column`, if present.
    pub fn column(&self, column: Column) -> Option<Vec<f64>> {
        let pos = self.columns.iter().position(|c| *c == column)?;
        Some(self.rows.iter().map(|row| row[pos]).collect())
    }

    /// Expand into full candles; absent columns are filled with [`MISSING`].
    pub fn to_candles(&self) -> Vec<Candle> {
        self.rows
            .iter()
            .map(|row| {
                let mut candle = Candle::missing();
                for (column, value) in self.columns.iter().zip(row.iter()) {
                    candle.set(*column, *value);
                }
                candle
            })
            .collect()
    }
}
