//! Multi-asset alignment into a single date-indexed price matrix.
//!
//! Every asset is outer-joined on date, so a date seen by any asset becomes
//! a row of the matrix. Gaps are forward-filled and then back-filled per
//! column, which leaves no missing cell inside the matrix.

use crate::error::{AnalyticsError, Result};
use crate::stats;
use crate::types::{AssetSeries, Observation};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use tracing::{debug, warn};

/// Date-ascending table of close prices, one column per asset.
///
/// Columns keep the order in which assets were supplied; the first column is
/// the market proxy used for beta.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceMatrix {
    dates: Vec<NaiveDate>,
    symbols: Vec<String>,
    /// Column-major prices: `columns[asset][row]`.
    columns: Vec<Vec<f64>>,
}

impl PriceMatrix {
    /// Build a matrix from already-aligned columns.
    ///
    /// Dates must be strictly ascending, symbols unique, and every column as
    /// long as `dates` with finite values.
    pub fn from_columns(
        dates: Vec<NaiveDate>,
        symbols: Vec<String>,
        columns: Vec<Vec<f64>>,
    ) -> Result<Self> {
        if symbols.len() != columns.len() {
            return Err(AnalyticsError::InvalidInput(format!(
                "{} symbols but {} columns",
                symbols.len(),
                columns.len()
            )));
        }
        if dates.windows(2).any(|w| w[0] >= w[1]) {
            return Err(AnalyticsError::InvalidInput(
                "dates must be strictly ascending".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = symbols.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(AnalyticsError::Schema(format!("duplicate symbol {}", dup)));
        }
        for (symbol, column) in symbols.iter().zip(&columns) {
            if column.len() != dates.len() {
                return Err(AnalyticsError::InvalidInput(format!(
                    "column {} has {} values for {} dates",
                    symbol,
                    column.len(),
                    dates.len()
                )));
            }
            if column.iter().any(|v| !v.is_finite()) {
                return Err(AnalyticsError::InvalidInput(format!(
                    "column {} contains non-finite prices",
                    symbol
                )));
            }
        }

        Ok(Self {
            dates,
            symbols,
            columns,
        })
    }

    pub fn dates(&self) -> &[NaiveDate] {
        &self.dates
    }

    pub fn symbols(&self) -> &[String] {
        &self.symbols
    }

    /// Number of rows (dates).
    pub fn len(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }

    pub fn num_assets(&self) -> usize {
        self.symbols.len()
    }

    /// Prices of one asset.
    pub fn column(&self, symbol: &str) -> Option<&[f64]> {
        self.symbols
            .iter()
            .position(|s| s == symbol)
            .map(|i| self.columns[i].as_slice())
    }

    /// Iterate `(symbol, prices)` in column order.
    pub fn iter_columns(&self) -> impl Iterator<Item = (&str, &[f64])> {
        self.symbols
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    /// Most recent price per asset, in column order.
    pub fn latest_prices(&self) -> Vec<(String, f64)> {
        self.iter_columns()
            .filter_map(|(s, col)| col.last().map(|&p| (s.to_string(), p)))
            .collect()
    }

    /// Simple returns per asset, in column order.
    pub fn simple_returns(&self) -> Vec<Vec<f64>> {
        self.columns.iter().map(|c| stats::simple_returns(c)).collect()
    }

    /// Log returns per asset, in column order.
    pub fn log_returns(&self) -> Vec<Vec<f64>> {
        self.columns.iter().map(|c| stats::log_returns(c)).collect()
    }

    /// Number of return observations (`rows - 1`, floored at zero).
    pub fn num_returns(&self) -> usize {
        self.len().saturating_sub(1)
    }

    /// Split the matrix back into one series per asset.
    pub fn to_series(&self) -> Vec<AssetSeries> {
        self.iter_columns()
            .map(|(symbol, col)| {
                let observations = self
                    .dates
                    .iter()
                    .zip(col)
                    .map(|(&d, &p)| Observation::new(d, p))
                    .collect();
                AssetSeries::new(symbol, observations)
            })
            .collect()
    }
}

/// Align asset series into a [`PriceMatrix`].
///
/// Assets are outer-joined on date and sorted ascending; rows that are empty
/// for every asset are dropped and remaining gaps are forward-filled, then
/// back-filled. Assets with no usable observation at all are left out of the
/// matrix.
///
/// # Errors
/// * [`AnalyticsError::EmptyData`] when no series is supplied or nothing
///   survives filtering.
/// * [`AnalyticsError::Schema`] when two series share a symbol.
pub fn align_series(series: &[AssetSeries]) -> Result<PriceMatrix> {
    if series.is_empty() {
        return Err(AnalyticsError::EmptyData(
            "no asset series supplied".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    if let Some(dup) = series.iter().find(|s| !seen.insert(s.symbol())) {
        return Err(AnalyticsError::Schema(format!(
            "duplicate symbol {}",
            dup.symbol()
        )));
    }

    let usable: Vec<&AssetSeries> = series
        .iter()
        .filter(|s| {
            if s.is_empty() {
                warn!("{}: no usable observations, leaving it out", s.symbol());
            }
            !s.is_empty()
        })
        .collect();

    if usable.is_empty() {
        return Err(AnalyticsError::EmptyData(
            "every row was dropped during parsing".to_string(),
        ));
    }

    // Outer join: date -> one optional price per asset.
    let mut joined: BTreeMap<NaiveDate, Vec<Option<f64>>> = BTreeMap::new();
    for (col, s) in usable.iter().enumerate() {
        for obs in s.observations() {
            joined.entry(obs.date).or_insert_with(|| vec![None; usable.len()])[col] =
                Some(obs.close);
        }
    }
    joined.retain(|_, row| row.iter().any(Option::is_some));

    let dates: Vec<NaiveDate> = joined.keys().copied().collect();
    let mut columns: Vec<Vec<Option<f64>>> = (0..usable.len())
        .map(|col| joined.values().map(|row| row[col]).collect())
        .collect();

    let mut filled = 0usize;
    for column in &mut columns {
        filled += forward_fill(column) + backward_fill(column);
    }
    if filled > 0 {
        debug!("Filled {} missing cells during alignment", filled);
    }

    let columns: Vec<Vec<f64>> = columns
        .into_iter()
        .map(|c| c.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
        .collect();
    let symbols = usable.iter().map(|s| s.symbol().to_string()).collect();

    PriceMatrix::from_columns(dates, symbols, columns)
}

/// Fill each gap with the previous known value. Returns the number filled.
fn forward_fill(column: &mut [Option<f64>]) -> usize {
    let mut last = None;
    let mut filled = 0;
    for cell in column.iter_mut() {
        match cell {
            Some(v) => last = Some(*v),
            None => {
                if last.is_some() {
                    *cell = last;
                    filled += 1;
                }
            }
        }
    }
    filled
}

/// Fill each gap with the next known value. Returns the number filled.
fn backward_fill(column: &mut [Option<f64>]) -> usize {
    let mut next = None;
    let mut filled = 0;
    for cell in column.iter_mut().rev() {
        match cell {
            Some(v) => next = Some(*v),
            None => {
                if next.is_some() {
                    *cell = next;
                    filled += 1;
                }
            }
        }
    }
    filled
}
