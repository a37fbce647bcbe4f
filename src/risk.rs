//! Portfolio risk monitoring.
//!
//! This module computes the classical risk ratios of an equal-weighted
//! portfolio over an aligned price matrix and checks them against a set of
//! thresholds. Undefined statistics are reported as `None` and are never
//! compared against a threshold.

use crate::align::PriceMatrix;
use crate::stats::{self, TRADING_DAYS};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Limits that trigger a risk violation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskThresholds {
    /// Annualized volatility at or above this is a violation.
    #[serde(default = "default_volatility")]
    pub volatility: f64,
    /// Sharpe ratio below this is a violation.
    #[serde(default = "default_ratio")]
    pub sharpe: f64,
    /// Sortino ratio below this is a violation.
    #[serde(default = "default_ratio")]
    pub sortino: f64,
    /// Drawdown below this (more negative) is a violation.
    #[serde(default = "default_max_drawdown")]
    pub max_drawdown: f64,
    /// Beta at or above this is a violation.
    #[serde(default = "default_beta")]
    pub beta: f64,
    /// Any single weight above this is a violation.
    #[serde(default = "default_max_weight")]
    pub max_weight: f64,
}

fn default_volatility() -> f64 {
    0.05
}
fn default_ratio() -> f64 {
    1.0
}
fn default_max_drawdown() -> f64 {
    -0.20
}
fn default_beta() -> f64 {
    1.2
}
fn default_max_weight() -> f64 {
    0.5
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            volatility: default_volatility(),
            sharpe: default_ratio(),
            sortino: default_ratio(),
            max_drawdown: default_max_drawdown(),
            beta: default_beta(),
            max_weight: default_max_weight(),
        }
    }
}

/// Which metric a violation refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskMetric {
    Volatility,
    Sharpe,
    Sortino,
    MaxDrawdown,
    Beta,
    MaxWeight,
}

impl fmt::Display for RiskMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RiskMetric::Volatility => "Volatility",
            RiskMetric::Sharpe => "Sharpe",
            RiskMetric::Sortino => "Sortino",
            RiskMetric::MaxDrawdown => "Max Drawdown",
            RiskMetric::Beta => "Beta",
            RiskMetric::MaxWeight => "Max Weight",
        };
        write!(f, "{}", name)
    }
}

/// Risk ratios of a portfolio. `None` marks a mathematically undefined value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RiskMetricsSnapshot {
    /// Annualized standard deviation of portfolio returns.
    pub volatility: Option<f64>,
    /// Annualized mean / standard deviation.
    pub sharpe: Option<f64>,
    /// Annualized mean / downside standard deviation.
    pub sortino: Option<f64>,
    /// Worst peak-to-trough decline, non-positive.
    pub max_drawdown: Option<f64>,
    /// Sensitivity to the first asset's returns.
    pub beta: Option<f64>,
    /// Largest weight in the portfolio.
    pub max_weight: Option<f64>,
}

impl RiskMetricsSnapshot {
    /// Compute the snapshot from a portfolio return series.
    ///
    /// `market` is the return series of the market proxy and must be aligned
    /// with `portfolio`.
    pub fn from_returns(portfolio: &[f64], market: &[f64], max_weight: Option<f64>) -> Self {
        let annualizer = TRADING_DAYS.sqrt();
        let mean = stats::mean(portfolio);
        let std = stats::sample_std(portfolio);

        let volatility = std.map(|s| s * annualizer);

        let sharpe = match (mean, std) {
            (Some(m), Some(s)) if !stats::is_zero_variance(s) => Some(m / s * annualizer),
            _ => None,
        };

        let downside: Vec<f64> = portfolio.iter().copied().filter(|r| *r < 0.0).collect();
        let sortino = match (mean, stats::sample_std(&downside)) {
            (Some(m), Some(d)) if !stats::is_zero_variance(d) => Some(m / d * annualizer),
            _ => None,
        };

        let max_drawdown = stats::max_drawdown(portfolio);

        let beta = stats::sample_covariance(market, market).and_then(|var| {
            if stats::is_zero_variance(var.sqrt()) {
                None
            } else {
                stats::sample_covariance(portfolio, market).map(|cov| cov / var)
            }
        });

        Self {
            volatility: finite(volatility),
            sharpe: finite(sharpe),
            sortino: finite(sortino),
            max_drawdown: finite(max_drawdown),
            beta: finite(beta),
            max_weight: finite(max_weight),
        }
    }

    /// Check the snapshot against `thresholds`, in a fixed metric order.
    pub fn evaluate(&self, thresholds: &RiskThresholds) -> Vec<RiskViolation> {
        let mut violations = Vec::new();

        if let Some(v) = self.volatility.filter(|v| *v >= thresholds.volatility) {
            violations.push(RiskViolation::new(
                RiskMetric::Volatility,
                v,
                thresholds.volatility,
                format!("Volatility {} >= {}", pct(v, 2), pct(thresholds.volatility, 0)),
            ));
        }
        if let Some(v) = self.sharpe.filter(|v| *v < thresholds.sharpe) {
            violations.push(RiskViolation::new(
                RiskMetric::Sharpe,
                v,
                thresholds.sharpe,
                format!("Sharpe {:.2} < {:.1}", v, thresholds.sharpe),
            ));
        }
        if let Some(v) = self.sortino.filter(|v| *v < thresholds.sortino) {
            violations.push(RiskViolation::new(
                RiskMetric::Sortino,
                v,
                thresholds.sortino,
                format!("Sortino {:.2} < {:.1}", v, thresholds.sortino),
            ));
        }
        if let Some(v) = self.max_drawdown.filter(|v| *v < thresholds.max_drawdown) {
            violations.push(RiskViolation::new(
                RiskMetric::MaxDrawdown,
                v,
                thresholds.max_drawdown,
                format!("Max Drawdown {} < {}", pct(v, 2), pct(thresholds.max_drawdown, 0)),
            ));
        }
        if let Some(v) = self.beta.filter(|v| *v >= thresholds.beta) {
            violations.push(RiskViolation::new(
                RiskMetric::Beta,
                v,
                thresholds.beta,
                format!("Beta {:.2} >= {:.2}", v, thresholds.beta),
            ));
        }
        if let Some(v) = self.max_weight.filter(|v| *v > thresholds.max_weight) {
            violations.push(RiskViolation::new(
                RiskMetric::MaxWeight,
                v,
                thresholds.max_weight,
                format!("Max Weight {} >= {}", pct(v, 2), pct(thresholds.max_weight, 0)),
            ));
        }

        violations
    }
}

/// A metric that crossed its threshold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskViolation {
    pub metric: RiskMetric,
    pub value: f64,
    pub threshold: f64,
    /// Human-readable description, e.g. `"Sharpe 0.42 < 1.0"`.
    pub message: String,
}

impl RiskViolation {
    fn new(metric: RiskMetric, value: f64, threshold: f64, message: String) -> Self {
        Self {
            metric,
            value,
            threshold,
            message,
        }
    }
}

impl fmt::Display for RiskViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

/// Metrics, violations and the alert text of one risk check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskReport {
    pub metrics: RiskMetricsSnapshot,
    pub violations: Vec<RiskViolation>,
    /// `None` when nothing was violated.
    pub alert: Option<String>,
}

impl RiskReport {
    /// Evaluate a snapshot and compose the alert text.
    pub fn new(metrics: RiskMetricsSnapshot, thresholds: &RiskThresholds) -> Self {
        let violations = metrics.evaluate(thresholds);
        let alert = compose_alert(&violations);
        Self {
            metrics,
            violations,
            alert,
        }
    }

    pub fn has_violations(&self) -> bool {
        !self.violations.is_empty()
    }
}

/// Equal-weighted risk snapshot of every asset in the matrix.
///
/// Returns are simple percentage changes; the first column is the market
/// proxy for beta.
pub fn compute_risk_metrics(matrix: &PriceMatrix) -> RiskMetricsSnapshot {
    let n = matrix.num_assets();
    if n == 0 {
        return RiskMetricsSnapshot::default();
    }
    let weights = vec![1.0 / n as f64; n];
    let returns = matrix.simple_returns();
    let portfolio = crate::analysis::portfolio_returns(&weights, &returns);
    let market = returns.first().map(Vec::as_slice).unwrap_or(&[]);

    RiskMetricsSnapshot::from_returns(&portfolio, market, weights.iter().copied().reduce(f64::max))
}

/// Join violation messages into the alert text.
pub fn compose_alert(violations: &[RiskViolation]) -> Option<String> {
    if violations.is_empty() {
        return None;
    }
    let joined: Vec<&str> = violations.iter().map(|v| v.message.as_str()).collect();
    Some(format!("Risk Alert Triggered: {}", joined.join(", ")))
}

/// Format a fraction as a percentage with `decimals` places.
pub(crate) fn pct(value: f64, decimals: usize) -> String {
    format!("{:.*}%", decimals, value * 100.0)
}

fn finite(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn matrix(columns: Vec<(&str, Vec<f64>)>) -> PriceMatrix {
        let n = columns[0].1.len();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let dates = (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect();
        let (symbols, cols): (Vec<String>, Vec<Vec<f64>>) =
            columns.into_iter().map(|(s, c)| (s.to_string(), c)).unzip();
        PriceMatrix::from_columns(dates, symbols, cols).unwrap()
    }

    #[test]
    fn test_zero_variance_single_asset() {
        let m = matrix(vec![("BTC", vec![100.0; 12])]);
        let snapshot = compute_risk_metrics(&m);

        assert_eq!(snapshot.sharpe, None);
        assert_eq!(snapshot.sortino, None);
        assert_eq!(snapshot.beta, None);
        assert_eq!(snapshot.volatility, Some(0.0));
        assert_eq!(snapshot.max_drawdown, Some(0.0));
        assert_eq!(snapshot.max_weight, Some(1.0));

        let violations = snapshot.evaluate(&RiskThresholds::default());
        assert!(violations.iter().all(|v| v.metric != RiskMetric::Sharpe));
        assert!(violations.iter().any(|v| v.metric == RiskMetric::MaxWeight));
    }

    #[test]
    fn test_beta_of_asset_against_itself_is_one() {
        let m = matrix(vec![("BTC", vec![100.0, 103.0, 99.0, 104.0, 101.0, 107.0])]);
        let snapshot = compute_risk_metrics(&m);
        assert!((snapshot.beta.unwrap() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_drawdown_and_sortino() {
        let m = matrix(vec![("BTC", vec![100.0, 110.0, 55.0, 66.0])]);
        let snapshot = compute_risk_metrics(&m);
        assert!((snapshot.max_drawdown.unwrap() + 0.5).abs() < 1e-12);
        // A single negative return has no sample deviation.
        assert_eq!(snapshot.sortino, None);
    }

    #[test]
    fn test_no_returns_leaves_everything_undefined() {
        let m = matrix(vec![("BTC", vec![100.0]), ("ETH", vec![10.0])]);
        let snapshot = compute_risk_metrics(&m);
        assert_eq!(snapshot.volatility, None);
        assert_eq!(snapshot.max_drawdown, None);
        assert_eq!(snapshot.max_weight, Some(0.5));
        assert!(snapshot.evaluate(&RiskThresholds::default()).is_empty());
    }

    #[test]
    fn test_violation_messages_and_alert() {
        let snapshot = RiskMetricsSnapshot {
            volatility: Some(0.8123),
            sharpe: Some(0.4),
            sortino: Some(2.0),
            max_drawdown: Some(-0.35),
            beta: Some(1.5),
            max_weight: Some(0.5),
        };
        let report = RiskReport::new(snapshot, &RiskThresholds::default());
        let messages: Vec<&str> = report.violations.iter().map(|v| v.message.as_str()).collect();
        assert_eq!(
            messages,
            vec![
                "Volatility 81.23% >= 5%",
                "Sharpe 0.40 < 1.0",
                "Max Drawdown -35.00% < -20%",
                "Beta 1.50 >= 1.20",
            ]
        );
        assert_eq!(
            report.alert.as_deref(),
            Some("Risk Alert Triggered: Volatility 81.23% >= 5%, Sharpe 0.40 < 1.0, Max Drawdown -35.00% < -20%, Beta 1.50 >= 1.20")
        );
    }

    #[test]
    fn test_clean_report_has_no_alert() {
        let snapshot = RiskMetricsSnapshot {
            volatility: Some(0.01),
            sharpe: Some(3.0),
            sortino: Some(4.0),
            max_drawdown: Some(-0.01),
            beta: Some(1.0),
            max_weight: Some(0.25),
        };
        let report = RiskReport::new(snapshot, &RiskThresholds::default());
        assert!(!report.has_violations());
        assert_eq!(report.alert, None);
    }

    #[test]
    fn test_pct_formatting() {
        assert_eq!(pct(0.05, 0), "5%");
        assert_eq!(pct(-0.2, 0), "-20%");
        assert_eq!(pct(0.123456, 2), "12.35%");
    }
}
