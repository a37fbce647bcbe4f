//! Tabular ingestion: turning raw per-asset record sets into typed series.
//!
//! The ingestion collaborator hands the engine one [`AssetTable`] per asset:
//! a symbol, a header row and string cells. This module finds the date and
//! price columns, parses the cells and drops rows that cannot be used.

use crate::error::{AnalyticsError, Result};
use crate::types::{normalize_symbol, AssetSeries, Observation};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use csv::ReaderBuilder;
use std::path::Path;
use tracing::{debug, info, warn};

/// Column names that can never act as the price column.
const RESERVED_COLUMNS: [&str; 5] = ["date", "volume", "adj close", "adj_close", "adj-close"];

/// A raw record set for one asset, as supplied by the ingestion collaborator.
#[derive(Debug, Clone, PartialEq)]
pub struct AssetTable {
    /// Asset symbol (normalized to upper case).
    pub symbol: String,
    /// Column names (trimmed, lower-cased).
    pub columns: Vec<String>,
    /// Row cells, one `Vec` per record, aligned with `columns`.
    pub rows: Vec<Vec<String>>,
}

/// Resolved positions of the columns the engine reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnLayout {
    pub date: usize,
    pub price: usize,
    pub open: Option<usize>,
    pub high: Option<usize>,
    pub low: Option<usize>,
    pub volume: Option<usize>,
}

impl AssetTable {
    /// Create a table, normalizing the symbol and column names.
    pub fn new<S, C>(symbol: &str, columns: C, rows: Vec<Vec<String>>) -> Self
    where
        C: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            symbol: normalize_symbol(symbol),
            columns: columns
                .into_iter()
                .map(|c| c.as_ref().trim().to_lowercase())
                .collect(),
            rows,
        }
    }

    /// Build a table from `&str` cells; convenient for tests and fixtures.
    pub fn from_rows(symbol: &str, columns: &[&str], rows: &[&[&str]]) -> Self {
        let rows = rows
            .iter()
            .map(|r| r.iter().map(|c| c.to_string()).collect())
            .collect();
        Self::new(symbol, columns.iter().copied(), rows)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Index of a column by exact (normalized) name.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Locate the date column: a column named `date`, otherwise the first
    /// column whose name mentions a date or a time.
    pub fn date_column(&self) -> Result<usize> {
        self.column_index("date")
            .or_else(|| {
                self.columns
                    .iter()
                    .position(|c| c.contains("date") || c.contains("time"))
            })
            .ok_or_else(|| {
                AnalyticsError::Schema(format!(
                    "table for {} must contain a 'date' or date-like column",
                    self.symbol
                ))
            })
    }

    /// Locate the price column: `close` when present, otherwise the last
    /// column that is neither the date column nor a reserved name.
    pub fn price_column(&self, date_column: usize) -> Result<usize> {
        if let Some(idx) = self.column_index("close") {
            return Ok(idx);
        }

        self.columns
            .iter()
            .enumerate()
            .rev()
            .find(|(idx, name)| *idx != date_column && !RESERVED_COLUMNS.contains(&name.as_str()))
            .map(|(idx, _)| idx)
            .ok_or_else(|| {
                AnalyticsError::Schema(format!(
                    "table for {} must contain a 'close' or price-like column",
                    self.symbol
                ))
            })
    }

    /// Resolve every column the engine reads.
    pub fn layout(&self) -> Result<ColumnLayout> {
        let date = self.date_column()?;
        let price = self.price_column(date)?;
        let optional = |name: &str| self.column_index(name).filter(|&i| i != price);

        Ok(ColumnLayout {
            date,
            price,
            open: optional("open"),
            high: optional("high"),
            low: optional("low"),
            volume: optional("volume"),
        })
    }

    /// Convert the table into an [`AssetSeries`].
    ///
    /// Rows with an unparseable date or a non-numeric price are dropped. The
    /// result may be empty; the aligner decides what to do with it.
    pub fn to_series(&self) -> Result<AssetSeries> {
        let layout = self.layout()?;
        let mut observations = Vec::with_capacity(self.rows.len());
        let mut skipped = 0usize;

        for (row_num, row) in self.rows.iter().enumerate() {
            let date = row.get(layout.date).and_then(|s| parse_date(s));
            let close = row.get(layout.price).and_then(|s| parse_number(s));

            match (date, close) {
                (Some(date), Some(close)) => {
                    let cell = |idx: Option<usize>| idx.and_then(|i| row.get(i)).and_then(|s| parse_number(s));
                    observations.push(Observation {
                        date,
                        close,
                        open: cell(layout.open),
                        high: cell(layout.high),
                        low: cell(layout.low),
                        volume: cell(layout.volume),
                    });
                }
                _ => {
                    debug!("{}: skipping row {} (bad date or price)", self.symbol, row_num + 1);
                    skipped += 1;
                }
            }
        }

        if skipped > 0 {
            warn!("{}: skipped {} unusable rows", self.symbol, skipped);
        }

        Ok(AssetSeries::new(&self.symbol, observations))
    }

    /// Close prices read from a literal `close` column, with their dates when
    /// the table has a `date` column.
    ///
    /// Dated rows are sorted ascending and rows with a bad date are dropped;
    /// undated rows keep their order. Rows with a non-numeric close are
    /// always dropped.
    pub fn close_rows(&self) -> Result<Vec<(Option<NaiveDate>, f64)>> {
        let close = self.column_index("close").ok_or_else(|| {
            AnalyticsError::Schema(format!("'close' column not found for {}", self.symbol))
        })?;
        let price = |row: &Vec<String>| row.get(close).and_then(|c| parse_number(c));

        let Some(date) = self.column_index("date") else {
            return Ok(self.rows.iter().filter_map(|r| price(r).map(|p| (None, p))).collect());
        };

        let mut dated: Vec<(Option<NaiveDate>, f64)> = self
            .rows
            .iter()
            .filter_map(|row| {
                let d = row.get(date).and_then(|c| parse_date(c))?;
                price(row).map(|p| (Some(d), p))
            })
            .collect();
        dated.sort_by_key(|(d, _)| *d);
        Ok(dated)
    }
}

/// Parse a numeric cell. Empty, non-numeric and non-finite values yield `None`.
pub fn parse_number(s: &str) -> Option<f64> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed
        .replace(',', "")
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

/// Parse a date cell into a calendar date, trying several common layouts.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.date_naive());
    }

    let datetime_formats = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y/%m/%d %H:%M:%S",
        "%d-%m-%Y %H:%M:%S",
        "%d/%m/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M:%S",
        "%m/%d/%Y %H:%M",
    ];
    for fmt in &datetime_formats {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt.date());
        }
    }

    let date_formats = [
        "%Y-%m-%d", "%Y/%m/%d", "%d-%m-%Y", "%d/%m/%Y", "%m/%d/%Y", "%d-%b-%Y", "%d %b %Y",
        "%b %d, %Y",
    ];
    for fmt in &date_formats {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Some(d);
        }
    }

    // Compact YYYYMMDD wins over a timestamp when it names a real date.
    if s.len() == 8 && s.bytes().all(|b| b.is_ascii_digit()) {
        let (year, month, day) = (s[..4].parse().ok()?, s[4..6].parse().ok()?, s[6..].parse().ok()?);
        if let Some(d) = NaiveDate::from_ymd_opt(year, month, day) {
            return Some(d);
        }
    }

    // Unix timestamps, in seconds or milliseconds.
    if let Ok(ts) = s.parse::<i64>() {
        let secs = if ts.abs() >= 100_000_000_000 { ts / 1000 } else { ts };
        return DateTime::from_timestamp(secs, 0).map(|dt| dt.date_naive());
    }

    None
}

/// Load a CSV file into an [`AssetTable`].
///
/// The symbol comes from a `symbol` column when the file has one, otherwise
/// from the file stem.
pub fn load_csv(path: impl AsRef<Path>) -> Result<AssetTable> {
    let path = path.as_ref();
    info!("Loading data from: {}", path.display());

    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)?;

    let columns: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(record.iter().map(|c| c.to_string()).collect::<Vec<_>>());
    }

    let symbol = columns
        .iter()
        .position(|c| c == "symbol")
        .and_then(|idx| rows.first().and_then(|r: &Vec<String>| r.get(idx)).cloned())
        .filter(|s| !s.trim().is_empty())
        .or_else(|| path.file_stem().map(|s| s.to_string_lossy().into_owned()))
        .unwrap_or_else(|| "ASSET".to_string());

    info!("Loaded {} rows for {}", rows.len(), normalize_symbol(&symbol));
    Ok(AssetTable::new(&symbol, columns, rows))
}

/// Load several CSV files.
pub fn load_many<P: AsRef<Path>>(paths: &[P]) -> Result<Vec<AssetTable>> {
    paths.iter().map(load_csv).collect()
}

/// Convert every table into a series, failing on the first schema error.
pub fn tables_to_series(tables: &[AssetTable]) -> Result<Vec<AssetSeries>> {
    tables.iter().map(AssetTable::to_series).collect()
}
