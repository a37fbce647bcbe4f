//! Per-asset technical indicators over raw tables.
//!
//! Each asset gets a short history of daily indicators (percent change,
//! rolling volatility, rolling mean return and a moving-average crossover
//! signal) plus whole-series Sortino and beta figures. Beta is measured
//! against the first usable asset.

use crate::data::AssetTable;
use crate::stats::{self, TRADING_DAYS};
use crate::types::TradingSignal;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, warn};

const VOLATILITY_WINDOW: usize = 7;
const RETURN_WINDOW: usize = 3;
const SHORT_MA: usize = 5;
const LONG_MA: usize = 20;

/// Default number of trailing rows reported per asset.
pub const DEFAULT_ROWS: usize = 10;

/// Indicators for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TechnicalRow {
    pub date: Option<NaiveDate>,
    /// Simple return as a decimal.
    pub percent_change: f64,
    pub rolling_volatility_7d: f64,
    pub average_return_3d: f64,
    pub trading_signal: TradingSignal,
}

/// Indicators for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetTechnicals {
    pub symbol: String,
    pub rows: Vec<TechnicalRow>,
    /// Annualized Sortino ratio over the whole series.
    pub sortino: Option<f64>,
    /// Beta against the first asset, matched by date.
    pub beta: Option<f64>,
}

/// Row identity used to match returns across assets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum RowKey {
    Date(NaiveDate),
    Position(usize),
}

struct Prepared {
    symbol: String,
    keys: Vec<RowKey>,
    dates: Vec<Option<NaiveDate>>,
    closes: Vec<f64>,
    returns: Vec<f64>,
}

impl Prepared {
    fn from_table(table: &AssetTable) -> Option<Self> {
        let rows = match table.close_rows() {
            Ok(rows) => rows,
            Err(e) => {
                warn!("{}: skipped for technical metrics: {}", table.symbol, e);
                return None;
            }
        };
        if rows.len() < 2 {
            debug!("{}: fewer than 2 valid rows, skipped", table.symbol);
            return None;
        }

        let keys = rows
            .iter()
            .enumerate()
            .map(|(i, (d, _))| d.map_or(RowKey::Position(i), RowKey::Date))
            .collect();
        let (dates, closes): (Vec<_>, Vec<_>) = rows.into_iter().unzip();
        let returns = stats::simple_returns(&closes);

        Some(Self {
            symbol: table.symbol.clone(),
            keys,
            dates,
            closes,
            returns,
        })
    }

    /// Returns keyed by the row they end on.
    fn keyed_returns(&self) -> BTreeMap<RowKey, f64> {
        self.keys[1..].iter().copied().zip(self.returns.iter().copied()).collect()
    }
}

/// Compute indicators for every usable table, keeping the last `rows`
/// complete rows per asset.
///
/// Tables without a `close` column or with fewer than two valid rows are
/// skipped.
pub fn technical_metrics(tables: &[AssetTable], rows: usize) -> Vec<AssetTechnicals> {
    let prepared: Vec<Prepared> = tables.iter().filter_map(Prepared::from_table).collect();
    let market = prepared.first().map(Prepared::keyed_returns);

    prepared
        .iter()
        .map(|asset| AssetTechnicals {
            symbol: asset.symbol.clone(),
            rows: indicator_rows(asset, rows),
            sortino: annualized_sortino(&asset.returns),
            beta: market.as_ref().and_then(|m| matched_beta(&asset.keyed_returns(), m)),
        })
        .collect()
}

fn indicator_rows(asset: &Prepared, keep: usize) -> Vec<TechnicalRow> {
    let volatility = stats::rolling_std(&asset.returns, VOLATILITY_WINDOW);
    let average = stats::rolling_mean(&asset.returns, RETURN_WINDOW);
    let short_ma = stats::rolling_mean(&asset.closes, SHORT_MA);
    let long_ma = stats::rolling_mean(&asset.closes, LONG_MA);

    // Return i ends on row i + 1.
    let complete: Vec<TechnicalRow> = asset
        .returns
        .iter()
        .enumerate()
        .filter_map(|(i, &change)| {
            let row = i + 1;
            Some(TechnicalRow {
                date: asset.dates[row],
                percent_change: change,
                rolling_volatility_7d: volatility[i]?,
                average_return_3d: average[i]?,
                trading_signal: crossover(short_ma[row], long_ma[row]),
            })
        })
        .collect();

    let skip = complete.len().saturating_sub(keep);
    complete.into_iter().skip(skip).collect()
}

fn crossover(short: Option<f64>, long: Option<f64>) -> TradingSignal {
    match (short, long) {
        (Some(s), Some(l)) if s > l => TradingSignal::Buy,
        (Some(s), Some(l)) if s < l => TradingSignal::Sell,
        _ => TradingSignal::Hold,
    }
}

fn annualized_sortino(returns: &[f64]) -> Option<f64> {
    let downside: Vec<f64> = returns.iter().copied().filter(|r| *r < 0.0).collect();
    let downside_std = stats::sample_std(&downside)?;
    if stats::is_zero_variance(downside_std) {
        return None;
    }
    let mean_annual = stats::mean(returns)? * TRADING_DAYS;
    Some(mean_annual / (downside_std * TRADING_DAYS.sqrt())).filter(|v| v.is_finite())
}

fn matched_beta(asset: &BTreeMap<RowKey, f64>, market: &BTreeMap<RowKey, f64>) -> Option<f64> {
    let (a, m): (Vec<f64>, Vec<f64>) = asset
        .iter()
        .filter_map(|(k, r)| market.get(k).map(|mr| (*r, *mr)))
        .unzip();
    if a.len() < 2 {
        return None;
    }
    let var = stats::sample_covariance(&m, &m)?;
    if stats::is_zero_variance(var.sqrt()) {
        return None;
    }
    stats::sample_covariance(&a, &m)
        .map(|cov| cov / var)
        .filter(|b| b.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(symbol: &str, closes: &[f64]) -> AssetTable {
        let rows: Vec<Vec<String>> = closes
            .iter()
            .enumerate()
            .map(|(i, c)| {
                let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + chrono::Duration::days(i as i64);
                vec![date.to_string(), c.to_string()]
            })
            .collect();
        AssetTable::new(symbol, ["date", "close"], rows)
    }

    fn zigzag(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n)
            .map(|i| start + step * i as f64 + if i % 2 == 0 { 1.0 } else { -1.0 })
            .collect()
    }

    #[test]
    fn test_rows_are_complete_and_trailing() {
        let t = table("BTC", &zigzag(30, 100.0, 0.5));
        let out = technical_metrics(&[t], DEFAULT_ROWS);
        assert_eq!(out.len(), 1);
        let rows = &out[0].rows;
        assert_eq!(rows.len(), 10);
        assert_eq!(rows.last().unwrap().date, NaiveDate::from_ymd_opt(2024, 1, 30));
        // 30 rows with a rising trend: MA5 above MA20.
        assert_eq!(rows.last().unwrap().trading_signal, TradingSignal::Buy);
    }

    #[test]
    fn test_short_history_has_hold_signal() {
        let t = table("ETH", &zigzag(12, 10.0, 0.1));
        let out = technical_metrics(&[t], DEFAULT_ROWS);
        let rows = &out[0].rows;
        // 11 returns, first complete row at return index 6.
        assert_eq!(rows.len(), 5);
        assert!(rows.iter().all(|r| r.trading_signal == TradingSignal::Hold));
    }

    #[test]
    fn test_falling_trend_sells() {
        let t = table("SOL", &zigzag(25, 200.0, -2.0));
        let out = technical_metrics(&[t], 3);
        assert_eq!(out[0].rows.len(), 3);
        assert_eq!(out[0].rows[2].trading_signal, TradingSignal::Sell);
    }

    #[test]
    fn test_beta_against_first_asset() {
        let market = zigzag(15, 100.0, 0.2);
        let doubled: Vec<f64> = {
            let r = stats::simple_returns(&market);
            let mut p = vec![50.0];
            for x in r {
                let last = p[p.len() - 1];
                p.push(last * (1.0 + 2.0 * x));
            }
            p
        };
        let out = technical_metrics(&[table("BTC", &market), table("ETH", &doubled)], DEFAULT_ROWS);
        assert!((out[0].beta.unwrap() - 1.0).abs() < 1e-9);
        assert!((out[1].beta.unwrap() - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_unusable_tables_are_skipped() {
        let no_close = AssetTable::from_rows("X", &["date", "price"], &[&["2024-01-01", "1"], &["2024-01-02", "2"]]);
        let one_row = table("Y", &[1.0]);
        let ok = table("Z", &[1.0, 2.0, 1.5]);
        let out = technical_metrics(&[no_close, one_row, ok], DEFAULT_ROWS);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].symbol, "Z");
        assert!(out[0].rows.is_empty());
    }

    #[test]
    fn test_sortino_needs_two_negative_returns() {
        assert_eq!(annualized_sortino(&[0.1, -0.05, 0.02]), None);
        let s = annualized_sortino(&[0.1, -0.05, 0.02, -0.01]).unwrap();
        assert!(s > 0.0);
    }
}
