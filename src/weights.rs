//! Allocation weights under a closed set of strategies.
//!
//! Every strategy produces raw, non-negative weights that are then passed
//! through [`cap_weights`], so no asset ends up above the configured cap
//! (whenever the cap is feasible) and the vector sums to one.

use crate::align::PriceMatrix;
use crate::error::{AnalyticsError, Result};
use crate::stats;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, warn};

/// Tolerance on `Σ weights = 1`.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

/// Tunables for the weighting engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightingConfig {
    /// Maximum weight of any single asset.
    #[serde(default = "default_cap")]
    pub cap: f64,
    /// Per-period risk-free rate subtracted from mean log returns (Sharpe strategy).
    #[serde(default)]
    pub risk_free_rate: f64,
}

fn default_cap() -> f64 {
    0.5
}

impl Default for WeightingConfig {
    fn default() -> Self {
        Self {
            cap: default_cap(),
            risk_free_rate: 0.0,
        }
    }
}

impl WeightingConfig {
    /// Set the per-asset cap.
    pub fn with_cap(mut self, cap: f64) -> Self {
        self.cap = cap;
        self
    }

    /// Set the risk-free rate.
    pub fn with_risk_free_rate(mut self, rate: f64) -> Self {
        self.risk_free_rate = rate;
        self
    }

    /// Check that the cap is usable.
    pub fn validate(&self) -> Result<()> {
        if !(self.cap > 0.0 && self.cap <= 1.0) {
            return Err(AnalyticsError::ConfigError(format!(
                "weight cap must be in (0, 1], got {}",
                self.cap
            )));
        }
        if !self.risk_free_rate.is_finite() {
            return Err(AnalyticsError::ConfigError(
                "risk-free rate must be finite".to_string(),
            ));
        }
        Ok(())
    }
}

/// Allocation across assets: symbol -> weight, summing to one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WeightVector(BTreeMap<String, f64>);

impl WeightVector {
    /// Validate and wrap caller-supplied weights.
    ///
    /// Weights must be finite, non-negative and sum to one within
    /// [`WEIGHT_TOLERANCE`].
    pub fn new(weights: BTreeMap<String, f64>) -> Result<Self> {
        if weights.is_empty() {
            return Err(AnalyticsError::InvalidInput("weight vector is empty".to_string()));
        }
        if let Some((s, w)) = weights.iter().find(|(_, w)| !w.is_finite() || **w < 0.0) {
            return Err(AnalyticsError::InvalidInput(format!(
                "weight for {} must be a non-negative number, got {}",
                s, w
            )));
        }
        let total: f64 = weights.values().sum();
        if (total - 1.0).abs() > WEIGHT_TOLERANCE {
            return Err(AnalyticsError::InvalidInput(format!(
                "weights must sum to 1, got {:.8}",
                total
            )));
        }
        Ok(Self(weights))
    }

    /// Weight of one asset, zero when absent.
    pub fn get(&self, symbol: &str) -> f64 {
        self.0.get(symbol).copied().unwrap_or(0.0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.0.iter().map(|(s, w)| (s.as_str(), *w))
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> f64 {
        self.0.values().sum()
    }

    /// Largest single weight.
    pub fn max_weight(&self) -> f64 {
        self.0.values().copied().fold(0.0, f64::max)
    }

    /// Weights laid out in the given symbol order (zero for missing symbols).
    pub fn ordered(&self, symbols: &[String]) -> Vec<f64> {
        symbols.iter().map(|s| self.get(s)).collect()
    }

    pub fn as_map(&self) -> &BTreeMap<String, f64> {
        &self.0
    }
}

/// Weighting strategy. The set is closed; names are parsed with [`FromStr`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WeightingStrategy {
    /// 1/N per asset.
    Equal,
    /// Proportional to the latest price.
    Price,
    /// Proportional to 1/σ of simple returns; zero-σ assets get nothing.
    InverseVolatility,
    /// Proportional to positive per-asset Sharpe ratios of log returns.
    Sharpe,
}

impl WeightingStrategy {
    /// All strategies, in display order.
    pub const ALL: [WeightingStrategy; 4] = [
        WeightingStrategy::Equal,
        WeightingStrategy::Price,
        WeightingStrategy::InverseVolatility,
        WeightingStrategy::Sharpe,
    ];

    /// Canonical name.
    pub fn name(&self) -> &'static str {
        match self {
            WeightingStrategy::Equal => "Equal",
            WeightingStrategy::Price => "Price",
            WeightingStrategy::InverseVolatility => "InvVol",
            WeightingStrategy::Sharpe => "Sharpe",
        }
    }

    /// Compute capped weights for `symbols` from the aligned prices.
    ///
    /// # Errors
    /// * [`AnalyticsError::InsufficientData`] with fewer than two return
    ///   observations.
    /// * [`AnalyticsError::InvalidInput`] when a symbol is not in the matrix
    ///   or no symbol is given.
    pub fn compute(&self, symbols: &[String], ctx: &WeightContext<'_>) -> Result<WeightVector> {
        ctx.config.validate()?;
        if symbols.is_empty() {
            return Err(AnalyticsError::InvalidInput("no symbols to weight".to_string()));
        }
        let available = ctx.matrix.num_returns();
        if available < 2 {
            return Err(AnalyticsError::insufficient(
                format!("{} weighting", self.name()),
                2,
                available,
            ));
        }

        let columns = symbols
            .iter()
            .map(|s| {
                ctx.matrix.column(s).ok_or_else(|| {
                    AnalyticsError::InvalidInput(format!("symbol {} is not in the price matrix", s))
                })
            })
            .collect::<Result<Vec<&[f64]>>>()?;

        let raw = match self {
            WeightingStrategy::Equal => equal_raw(symbols.len()),
            WeightingStrategy::Price => price_raw(&columns),
            WeightingStrategy::InverseVolatility => inverse_volatility_raw(&columns),
            WeightingStrategy::Sharpe => sharpe_raw(&columns, ctx.config.risk_free_rate),
        };

        let raw: BTreeMap<String, f64> = symbols.iter().cloned().zip(raw).collect();
        debug!("{} raw weights: {:?}", self.name(), raw);
        Ok(WeightVector(cap_weights(&raw, ctx.config.cap)))
    }
}

impl fmt::Display for WeightingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for WeightingStrategy {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        let key: String = s
            .trim()
            .chars()
            .filter(|c| !matches!(c, '-' | '_' | ' '))
            .collect::<String>()
            .to_lowercase();
        match key.as_str() {
            "equal" | "equalweight" => Ok(WeightingStrategy::Equal),
            "price" | "priceweight" => Ok(WeightingStrategy::Price),
            "invvol" | "inversevolatility" | "inversevol" => Ok(WeightingStrategy::InverseVolatility),
            "sharpe" | "sharpeoptimized" => Ok(WeightingStrategy::Sharpe),
            _ => Err(AnalyticsError::UnknownStrategy(s.to_string())),
        }
    }
}

/// Inputs a strategy reads.
#[derive(Debug, Clone, Copy)]
pub struct WeightContext<'a> {
    pub matrix: &'a PriceMatrix,
    pub config: &'a WeightingConfig,
}

impl<'a> WeightContext<'a> {
    pub fn new(matrix: &'a PriceMatrix, config: &'a WeightingConfig) -> Self {
        Self { matrix, config }
    }
}

/// Weight every asset of the matrix with one strategy.
pub fn compute_weights(
    strategy: WeightingStrategy,
    matrix: &PriceMatrix,
    config: &WeightingConfig,
) -> Result<WeightVector> {
    strategy.compute(matrix.symbols(), &WeightContext::new(matrix, config))
}

fn equal_raw(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

fn normalize_or_equal(raw: Vec<f64>, what: &str) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    if total > 0.0 && total.is_finite() {
        raw.into_iter().map(|w| w / total).collect()
    } else {
        warn!("{}: no positive raw weight, using equal weights", what);
        equal_raw(raw.len())
    }
}

fn price_raw(columns: &[&[f64]]) -> Vec<f64> {
    let latest = columns
        .iter()
        .map(|c| c.last().copied().unwrap_or(0.0).max(0.0))
        .collect();
    normalize_or_equal(latest, "price weighting")
}

fn inverse_volatility_raw(columns: &[&[f64]]) -> Vec<f64> {
    let inverse = columns
        .iter()
        .map(|c| {
            let vol = stats::population_std(&stats::simple_returns(c)).unwrap_or(0.0);
            if stats::is_zero_variance(vol) {
                0.0
            } else {
                1.0 / vol
            }
        })
        .collect();
    normalize_or_equal(inverse, "inverse-volatility weighting")
}

fn sharpe_raw(columns: &[&[f64]], risk_free_rate: f64) -> Vec<f64> {
    let clipped: Vec<f64> = columns
        .iter()
        .map(|c| {
            let returns = stats::log_returns(c);
            match (stats::mean(&returns), stats::sample_std(&returns)) {
                (Some(m), Some(sd)) if !stats::is_zero_variance(sd) => ((m - risk_free_rate) / sd).max(0.0),
                _ => 0.0,
            }
        })
        .collect();

    let total: f64 = clipped.iter().sum();
    if total > 0.0 && total.is_finite() {
        clipped.into_iter().map(|s| s / total).collect()
    } else {
        debug!("No positive Sharpe ratio, falling back to equal weights");
        equal_raw(clipped.len())
    }
}

/// Clamp weights to `cap` and redistribute the excess.
///
/// 1. Clamp every weight to `cap`.
/// 2. If the clamped weights already sum to one, stop.
/// 3. If no asset was originally below the cap, renormalize and stop.
/// 4. Otherwise hand the excess to the assets below the cap, pro rata to
///    their original weights (equally when those weights are all zero).
///    Any asset pushed past the cap is re-clamped and the remainder goes
///    round again among the others; then renormalize so the vector sums to
///    one.
///
/// The result never exceeds `cap` when `N * cap >= 1`. Otherwise every asset
/// saturates and the vector renormalizes to equal weights.
pub fn cap_weights(weights: &BTreeMap<String, f64>, cap: f64) -> BTreeMap<String, f64> {
    let mut capped: BTreeMap<String, f64> = weights
        .iter()
        .map(|(s, &w)| (s.clone(), w.min(cap)))
        .collect();
    let total_capped: f64 = capped.values().sum();
    if (1.0 - total_capped).abs() < 1e-9 {
        return capped;
    }

    let mut saturated: BTreeSet<&String> = weights
        .iter()
        .filter(|(_, w)| **w >= cap)
        .map(|(s, _)| s)
        .collect();

    loop {
        let free: Vec<&String> = weights.keys().filter(|s| !saturated.contains(s)).collect();
        if free.is_empty() {
            break;
        }

        let budget = 1.0 - cap * saturated.len() as f64;
        let free_count = free.len() as f64;
        let free_total: f64 = free.iter().map(|s| weights[*s]).sum();
        if free_total <= 0.0 {
            debug!("No raw weight below the cap, splitting the excess equally");
        }

        let mut overshot = false;
        for s in free {
            let share = if free_total > 0.0 {
                weights[s] / free_total
            } else {
                1.0 / free_count
            };
            let w = budget * share;
            let slot = capped.entry(s.clone()).or_insert(0.0);
            if w > cap {
                *slot = cap;
                saturated.insert(s);
                overshot = true;
            } else {
                *slot = w;
            }
        }
        if !overshot {
            break;
        }
    }

    let total_final: f64 = capped.values().sum();
    renormalize(capped, total_final)
}

fn renormalize(mut weights: BTreeMap<String, f64>, total: f64) -> BTreeMap<String, f64> {
    if total > 0.0 {
        for w in weights.values_mut() {
            *w /= total;
        }
    }
    weights
}
