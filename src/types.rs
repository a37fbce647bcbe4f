//! Core data types shared by the analytics components.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single daily observation of an asset.
///
/// Only `close` is required; the other OHLCV fields are carried when the
/// source table provides them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub date: NaiveDate,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl Observation {
    /// Create a close-only observation.
    pub fn new(date: NaiveDate, close: f64) -> Self {
        Self {
            date,
            close,
            open: None,
            high: None,
            low: None,
            volume: None,
        }
    }

    /// Create a full OHLCV observation.
    pub fn ohlcv(date: NaiveDate, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            date,
            close,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            volume: Some(volume),
        }
    }
}

/// Price history of one asset, ordered by date.
///
/// The symbol is normalized to upper case when the series is created and
/// cannot be changed afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetSeries {
    symbol: String,
    observations: Vec<Observation>,
}

impl AssetSeries {
    /// Create a series, sorting observations by date and keeping the last
    /// observation for any repeated date.
    pub fn new(symbol: impl AsRef<str>, mut observations: Vec<Observation>) -> Self {
        observations.sort_by_key(|o| o.date);
        // Keep the last row seen for a date: dedup keeps the first of a run,
        // so dedup a reversed copy.
        observations.reverse();
        observations.dedup_by_key(|o| o.date);
        observations.reverse();

        Self {
            symbol: normalize_symbol(symbol.as_ref()),
            observations,
        }
    }

    /// Build a close-only series from `(date, close)` pairs.
    pub fn from_closes(symbol: impl AsRef<str>, closes: &[(NaiveDate, f64)]) -> Self {
        let observations = closes
            .iter()
            .map(|&(date, close)| Observation::new(date, close))
            .collect();
        Self::new(symbol, observations)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    /// Close prices in date order.
    pub fn closes(&self) -> Vec<f64> {
        self.observations.iter().map(|o| o.close).collect()
    }

    /// Dates in ascending order.
    pub fn dates(&self) -> Vec<NaiveDate> {
        self.observations.iter().map(|o| o.date).collect()
    }

    /// Date of the most recent observation.
    pub fn last_date(&self) -> Option<NaiveDate> {
        self.observations.last().map(|o| o.date)
    }
}

/// Normalize a ticker symbol: trimmed and upper-cased.
pub fn normalize_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Moving-average crossover signal reported by the technical metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TradingSignal {
    /// Short average above the long average.
    Buy,
    /// Short average below the long average.
    Sell,
    #[default]
    Hold,
}

impl fmt::Display for TradingSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradingSignal::Buy => write!(f, "Buy"),
            TradingSignal::Sell => write!(f, "Sell"),
            TradingSignal::Hold => write!(f, "Hold"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 1, d).unwrap()
    }

    #[test]
    fn test_series_sorts_and_normalizes_symbol() {
        let series = AssetSeries::from_closes(" btc ", &[(day(3), 3.0), (day(1), 1.0), (day(2), 2.0)]);
        assert_eq!(series.symbol(), "BTC");
        assert_eq!(series.closes(), vec![1.0, 2.0, 3.0]);
        assert_eq!(series.last_date(), Some(day(3)));
    }

    #[test]
    fn test_series_keeps_last_duplicate() {
        let series = AssetSeries::from_closes("ETH", &[(day(1), 1.0), (day(1), 5.0), (day(2), 2.0)]);
        assert_eq!(series.len(), 2);
        assert_eq!(series.closes(), vec![5.0, 2.0]);
    }

    #[test]
    fn test_signal_display() {
        assert_eq!(TradingSignal::Buy.to_string(), "Buy");
        assert_eq!(TradingSignal::default(), TradingSignal::Hold);
    }
}
