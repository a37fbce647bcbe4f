//! One-step-ahead price forecasting with model selection and validation.
//!
//! For each asset the forecaster:
//!
//! 1. splits the close series chronologically into training and holdout parts,
//! 2. grid-searches ARIMA orders on the training part and keeps the one with
//!    the lowest AIC,
//! 3. backtests that order over the holdout with an expanding window,
//! 4. refits on the full series and forecasts the next period with a
//!    confidence interval.
//!
//! Only too-short input is fatal. Failed fits fall back to naive persistence
//! during the backtest and to a weighted moving average for the final
//! forecast.

mod accuracy;
mod arima;

pub use accuracy::AccuracyMetrics;
pub use arima::{ArimaFit, ArimaOrder, FitError};

use crate::data::AssetTable;
use crate::error::{AnalyticsError, Result};
use crate::stats;
use crate::types::{normalize_symbol, AssetSeries};
use chrono::{Duration, Local, NaiveDate};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Default candidate grid, searched in this order.
pub const DEFAULT_GRID: [ArimaOrder; 12] = [
    ArimaOrder::new(1, 1, 0),
    ArimaOrder::new(1, 1, 1),
    ArimaOrder::new(2, 1, 0),
    ArimaOrder::new(2, 1, 1),
    ArimaOrder::new(3, 1, 0),
    ArimaOrder::new(3, 1, 1),
    ArimaOrder::new(5, 1, 0),
    ArimaOrder::new(5, 1, 1),
    ArimaOrder::new(1, 1, 2),
    ArimaOrder::new(2, 1, 2),
    ArimaOrder::new(3, 1, 2),
    ArimaOrder::new(5, 1, 2),
];

/// Forecaster settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastConfig {
    /// Fewer close prices than this is an error.
    #[serde(default = "default_min_observations")]
    pub min_observations: usize,
    /// Fraction of the series used for model selection.
    #[serde(default = "default_train_ratio")]
    pub train_ratio: f64,
    /// Orders tried by the grid search, in tie-break order.
    #[serde(default = "default_grid")]
    pub candidate_orders: Vec<ArimaOrder>,
    /// Order used when no candidate fits.
    #[serde(default = "default_fallback_order")]
    pub fallback_order: ArimaOrder,
    /// Trailing window of the weighted-moving-average fallback.
    #[serde(default = "default_fallback_window")]
    pub fallback_window: usize,
    /// Normal quantile of the confidence interval.
    #[serde(default = "default_z_score")]
    pub z_score: f64,
}

fn default_min_observations() -> usize {
    30
}
fn default_train_ratio() -> f64 {
    0.8
}
fn default_grid() -> Vec<ArimaOrder> {
    DEFAULT_GRID.to_vec()
}
fn default_fallback_order() -> ArimaOrder {
    ArimaOrder::new(1, 1, 0)
}
fn default_fallback_window() -> usize {
    10
}
fn default_z_score() -> f64 {
    1.96
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            min_observations: default_min_observations(),
            train_ratio: default_train_ratio(),
            candidate_orders: default_grid(),
            fallback_order: default_fallback_order(),
            fallback_window: default_fallback_window(),
            z_score: default_z_score(),
        }
    }
}

impl ForecastConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_observations < 2 {
            return Err(AnalyticsError::ConfigError(
                "forecast needs a minimum of at least 2 observations".to_string(),
            ));
        }
        if !(self.train_ratio > 0.0 && self.train_ratio < 1.0) {
            return Err(AnalyticsError::ConfigError(format!(
                "train ratio must be in (0, 1), got {}",
                self.train_ratio
            )));
        }
        if self.candidate_orders.is_empty() {
            return Err(AnalyticsError::ConfigError(
                "candidate order grid is empty".to_string(),
            ));
        }
        if self.fallback_window == 0 {
            return Err(AnalyticsError::ConfigError(
                "fallback window must be at least 1".to_string(),
            ));
        }
        if !(self.z_score.is_finite() && self.z_score > 0.0) {
            return Err(AnalyticsError::ConfigError(format!(
                "z score must be positive, got {}",
                self.z_score
            )));
        }
        Ok(())
    }
}

/// Close prices of one asset, oldest first.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastInput {
    pub symbol: String,
    pub closes: Vec<f64>,
    /// Date of the last close, when the source carried dates.
    pub last_date: Option<NaiveDate>,
}

impl ForecastInput {
    pub fn new(symbol: &str, closes: Vec<f64>, last_date: Option<NaiveDate>) -> Self {
        Self {
            symbol: normalize_symbol(symbol),
            closes,
            last_date,
        }
    }

    pub fn from_series(series: &AssetSeries) -> Self {
        Self {
            symbol: series.symbol().to_string(),
            closes: series.closes(),
            last_date: series.last_date(),
        }
    }

    /// Read a raw table. A literal `close` column is required; a `date`
    /// column is optional and, when present, orders the rows.
    pub fn from_table(table: &AssetTable) -> Result<Self> {
        let rows = table.close_rows()?;
        let last_date = rows.last().and_then(|(d, _)| *d);
        let closes = rows.into_iter().map(|(_, c)| c).collect();
        Ok(Self::new(&table.symbol, closes, last_date))
    }
}

/// How the final point forecast was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ForecastMethod {
    Arima,
    WeightedMovingAverage,
}

/// Validated one-step forecast for one asset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastResult {
    pub symbol: String,
    pub predicted_value: f64,
    pub confidence_interval: (f64, f64),
    pub next_period: NaiveDate,
    #[serde(flatten)]
    pub accuracy: AccuracyMetrics,
    pub model_order: ArimaOrder,
    pub training_size: usize,
    pub validation_size: usize,
    /// AIC of the selected order on the training part; `None` when nothing fit.
    pub aic: Option<f64>,
    pub method: ForecastMethod,
}

/// Outcome of the grid search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelSelection {
    pub order: ArimaOrder,
    pub aic: Option<f64>,
    /// Number of candidates that fit.
    pub fitted: usize,
}

/// Per-asset forecaster.
#[derive(Debug, Clone, Default)]
pub struct Forecaster {
    config: ForecastConfig,
}

impl Forecaster {
    pub fn new(config: ForecastConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    /// Forecast one asset; undated input is stamped with today's date.
    pub fn forecast(&self, input: &ForecastInput) -> Result<ForecastResult> {
        self.forecast_at(input, Local::now().date_naive())
    }

    /// Forecast one asset, using `today` as the next period of undated input.
    pub fn forecast_at(&self, input: &ForecastInput, today: NaiveDate) -> Result<ForecastResult> {
        self.config.validate()?;
        let closes = &input.closes;
        let n = closes.len();
        if n < self.config.min_observations {
            return Err(AnalyticsError::insufficient(
                format!("forecast of {}", input.symbol),
                self.config.min_observations,
                n,
            ));
        }

        let split = ((n as f64 * self.config.train_ratio).floor() as usize).clamp(1, n - 1);
        let (train, holdout) = closes.split_at(split);

        let selection = self.select_order(train);
        info!(
            "{}: selected ARIMA{} ({} of {} candidates fit)",
            input.symbol,
            selection.order,
            selection.fitted,
            self.config.candidate_orders.len()
        );

        let predictions = backtest(closes, split, selection.order);
        let accuracy = AccuracyMetrics::evaluate(holdout, &predictions);

        let (predicted_value, confidence_interval, method) =
            match ArimaFit::fit(closes, selection.order).map(|f| f.forecast_interval(self.config.z_score)) {
                Ok((point, ci)) if point.is_finite() && ci.0.is_finite() && ci.1.is_finite() => {
                    (point, ci, ForecastMethod::Arima)
                }
                outcome => {
                    if let Err(e) = outcome {
                        warn!("{}: final fit failed ({}), using weighted moving average", input.symbol, e);
                    }
                    let (point, ci) =
                        weighted_moving_average(closes, self.config.fallback_window, self.config.z_score);
                    (point, ci, ForecastMethod::WeightedMovingAverage)
                }
            };

        let next_period = input
            .last_date
            .map(|d| d + Duration::days(1))
            .unwrap_or(today);

        Ok(ForecastResult {
            symbol: input.symbol.clone(),
            predicted_value,
            confidence_interval,
            next_period,
            accuracy,
            model_order: selection.order,
            training_size: split,
            validation_size: holdout.len(),
            aic: selection.aic,
            method,
        })
    }

    /// Forecast several assets in parallel; each asset succeeds or fails on
    /// its own.
    pub fn forecast_many(&self, inputs: &[ForecastInput]) -> Vec<(String, Result<ForecastResult>)> {
        let today = Local::now().date_naive();
        inputs
            .par_iter()
            .map(|input| (input.symbol.clone(), self.forecast_at(input, today)))
            .collect()
    }

    /// Fit every candidate on `train` and keep the lowest AIC; the earliest
    /// candidate wins ties.
    ///
    /// Every candidate is scored on the observations after the largest
    /// `d + p` in the grid.
    pub fn select_order(&self, train: &[f64]) -> ModelSelection {
        let burn_in = self
            .config
            .candidate_orders
            .iter()
            .map(|o| o.d + o.p)
            .max()
            .unwrap_or(0);
        let fits: Vec<(ArimaOrder, std::result::Result<ArimaFit, FitError>)> = self
            .config
            .candidate_orders
            .par_iter()
            .map(|&order| (order, ArimaFit::fit_with_burn_in(train, order, burn_in)))
            .collect();

        let mut best: Option<(ArimaOrder, f64)> = None;
        let mut fitted = 0;
        for (order, outcome) in &fits {
            match outcome {
                Ok(fit) if fit.aic.is_finite() => {
                    fitted += 1;
                    if best.map_or(true, |(_, aic)| fit.aic < aic) {
                        best = Some((*order, fit.aic));
                    }
                }
                Ok(_) => debug!("ARIMA{} produced a non-finite AIC", order),
                Err(e) => debug!("ARIMA{} failed to fit: {}", order, e),
            }
        }

        match best {
            Some((order, aic)) => ModelSelection {
                order,
                aic: Some(aic),
                fitted,
            },
            None => {
                let order = self.config.fallback_order;
                warn!("No candidate order fit, falling back to ARIMA{}", order);
                let aic = ArimaFit::fit(train, order).ok().map(|f| f.aic);
                ModelSelection { order, aic, fitted }
            }
        }
    }
}

/// Expanding-window one-step predictions for every point from `split` on.
///
/// A failed refit predicts the last observed value.
fn backtest(closes: &[f64], split: usize, order: ArimaOrder) -> Vec<f64> {
    let outcomes: Vec<(f64, bool)> = (split..closes.len())
        .into_par_iter()
        .map(|t| {
            let history = &closes[..t];
            let last = history[history.len() - 1];
            match ArimaFit::fit(history, order).map(|f| f.forecast()) {
                Ok(pred) if pred.is_finite() => (pred, false),
                _ => (last, true),
            }
        })
        .collect();

    let fallbacks = outcomes.iter().filter(|(_, fell_back)| *fell_back).count();
    if fallbacks > 0 {
        debug!(
            "{} of {} backtest refits used the last observed value",
            fallbacks,
            outcomes.len()
        );
    }
    outcomes.into_iter().map(|(pred, _)| pred).collect()
}

/// Linearly weighted average of the trailing `window` closes with a
/// `±z·s` band, `s` being the sample standard deviation of the window.
pub fn weighted_moving_average(closes: &[f64], window: usize, z: f64) -> (f64, (f64, f64)) {
    let recent = &closes[closes.len().saturating_sub(window)..];
    let (weighted, total) = recent
        .iter()
        .enumerate()
        .fold((0.0, 0.0), |(sum, w_sum), (i, price)| {
            let w = (i + 1) as f64;
            (sum + w * price, w_sum + w)
        });
    let point = if total > 0.0 { weighted / total } else { 0.0 };
    let half = z * stats::sample_std(recent).unwrap_or(0.0);
    (point, (point - half, point + half))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn noisy_walk(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut price = 100.0;
        let mut drift = 0.0;
        (0..n)
            .map(|_| {
                drift = 0.5 * drift + noise.sample(&mut rng);
                price += drift;
                price
            })
            .collect()
    }

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_forty_observations_split_and_order() {
        let input = ForecastInput::new("btc", noisy_walk(40, 42), Some(day(2024, 2, 9)));
        let result = Forecaster::default().forecast(&input).unwrap();

        assert_eq!(result.symbol, "BTC");
        assert_eq!(result.training_size, 32);
        assert_eq!(result.validation_size, 8);
        assert!(DEFAULT_GRID.contains(&result.model_order) || result.model_order == ArimaOrder::new(1, 1, 0));
        assert_eq!(result.next_period, day(2024, 2, 10));
        let (lo, hi) = result.confidence_interval;
        assert!(lo <= result.predicted_value && result.predicted_value <= hi);
    }

    #[test]
    fn test_too_few_observations() {
        let input = ForecastInput::new("ETH", noisy_walk(29, 1), None);
        let err = Forecaster::default().forecast(&input).unwrap_err();
        assert!(matches!(
            err,
            AnalyticsError::InsufficientData {
                required: 30,
                available: 29,
                ..
            }
        ));
    }

    #[test]
    fn test_constant_series_degrades_gracefully() {
        let input = ForecastInput::new("USDT", vec![1.0; 35], None);
        let today = day(2025, 6, 1);
        let result = Forecaster::default().forecast_at(&input, today).unwrap();

        assert_eq!(result.method, ForecastMethod::WeightedMovingAverage);
        assert_eq!(result.predicted_value, 1.0);
        assert_eq!(result.confidence_interval, (1.0, 1.0));
        assert_eq!(result.model_order, ArimaOrder::new(1, 1, 0));
        assert_eq!(result.aic, None);
        assert_eq!(result.accuracy, AccuracyMetrics::default());
        assert_eq!(result.next_period, today);
    }

    #[test]
    fn test_selection_prefers_earliest_on_ties() {
        let forecaster = Forecaster::new(ForecastConfig {
            candidate_orders: vec![ArimaOrder::new(1, 1, 0), ArimaOrder::new(1, 1, 0)],
            ..Default::default()
        });
        let selection = forecaster.select_order(&noisy_walk(60, 9));
        assert_eq!(selection.order, ArimaOrder::new(1, 1, 0));
        assert_eq!(selection.fitted, 2);
        assert!(selection.aic.is_some());
    }

    #[test]
    fn test_selection_ignores_price_scale() {
        let forecaster = Forecaster::default();
        for seed in [3, 17, 42] {
            let train = noisy_walk(120, seed);
            let scaled: Vec<f64> = train.iter().map(|v| v * 30_000.0 + 250.0).collect();

            let plain = forecaster.select_order(&train);
            let rescaled = forecaster.select_order(&scaled);
            assert_eq!(plain.order, rescaled.order, "seed {}", seed);
            assert_eq!(plain.fitted, rescaled.fitted);
        }
    }

    #[test]
    fn test_weighted_moving_average() {
        let (point, (lo, hi)) = weighted_moving_average(&[1.0, 2.0, 3.0], 10, 1.96);
        // (1 + 4 + 9) / 6
        assert!((point - 14.0 / 6.0).abs() < 1e-12);
        assert!(((hi - lo) / 2.0 - 1.96).abs() < 1e-12);

        let (point, _) = weighted_moving_average(&[100.0, 1.0, 2.0], 2, 1.96);
        assert!((point - 5.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_from_table_requires_close() {
        let table = AssetTable::from_rows("SOL", &["date", "price"], &[&["2024-01-01", "1.0"]]);
        assert!(matches!(ForecastInput::from_table(&table), Err(AnalyticsError::Schema(_))));
    }

    #[test]
    fn test_from_table_sorts_by_date() {
        let table = AssetTable::from_rows(
            "sol",
            &["Date", "Close"],
            &[
                &["2024-01-03", "3.0"],
                &["2024-01-01", "1.0"],
                &["not a date", "9.0"],
                &["2024-01-02", "n/a"],
            ],
        );
        let input = ForecastInput::from_table(&table).unwrap();
        assert_eq!(input.symbol, "SOL");
        assert_eq!(input.closes, vec![1.0, 3.0]);
        assert_eq!(input.last_date, Some(day(2024, 1, 3)));
    }

    #[test]
    fn test_from_table_without_dates() {
        let table = AssetTable::from_rows("ada", &["close"], &[&["1.5"], &["2.5"]]);
        let input = ForecastInput::from_table(&table).unwrap();
        assert_eq!(input.closes, vec![1.5, 2.5]);
        assert_eq!(input.last_date, None);
    }

    #[test]
    fn test_forecast_many_isolates_failures() {
        let inputs = vec![
            ForecastInput::new("BTC", noisy_walk(50, 3), Some(day(2024, 3, 1))),
            ForecastInput::new("DOGE", noisy_walk(10, 4), None),
        ];
        let results = Forecaster::default().forecast_many(&inputs);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0, "BTC");
        assert!(results[0].1.is_ok());
        assert!(matches!(results[1].1, Err(AnalyticsError::InsufficientData { .. })));
    }

    #[test]
    fn test_config_validation() {
        assert!(ForecastConfig::default().validate().is_ok());
        let bad = ForecastConfig {
            train_ratio: 1.0,
            ..Default::default()
        };
        assert!(matches!(bad.validate(), Err(AnalyticsError::ConfigError(_))));
    }
}
