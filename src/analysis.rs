//! Portfolio-level workflows built on the individual engines.

use crate::align::PriceMatrix;
use crate::error::{AnalyticsError, Result};
use crate::risk::{compute_risk_metrics, RiskReport, RiskThresholds};
use crate::stats;
use crate::stress::{StressConfig, StressSimulator, StressTestResult};
use crate::weights::{compute_weights, WeightVector, WeightingConfig, WeightingStrategy};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Number of leading periods shown in a strategy comparison.
pub const COMPARISON_PERIODS: usize = 15;

/// Weighted sum of per-asset returns, period by period, over the shortest
/// series.
pub fn portfolio_returns(weights: &[f64], returns: &[Vec<f64>]) -> Vec<f64> {
    let len = returns.iter().map(Vec::len).min().unwrap_or(0);
    (0..len)
        .map(|t| weights.iter().zip(returns).map(|(w, r)| w * r[t]).sum())
        .collect()
}

/// One column of a strategy comparison, values in percent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonColumn {
    pub name: String,
    pub values: Vec<f64>,
}

impl ComparisonColumn {
    /// `"<name> -> Avg Return=<mean>%, Risk=<std>"`.
    pub fn insight(&self) -> String {
        let avg = stats::mean(&self.values).unwrap_or(0.0);
        let risk = stats::population_std(&self.values).unwrap_or(0.0);
        format!("{} -> Avg Return={:.2}%, Risk={:.2}", self.name, avg, risk)
    }
}

/// Result of [`analyze_strategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyAnalysis {
    pub strategy: WeightingStrategy,
    pub weights: WeightVector,
    /// Per-asset percent returns followed by the portfolio column.
    pub comparison: Vec<ComparisonColumn>,
    pub insights: Vec<String>,
}

/// Weight the matrix with `strategy` and compare the portfolio's percent
/// returns against each asset over the leading periods.
pub fn analyze_strategy(
    strategy: WeightingStrategy,
    matrix: &PriceMatrix,
    config: &WeightingConfig,
) -> Result<StrategyAnalysis> {
    let weights = compute_weights(strategy, matrix, config)?;

    let percent: Vec<Vec<f64>> = matrix
        .simple_returns()
        .into_iter()
        .map(|r| r.into_iter().map(|x| x * 100.0).collect())
        .collect();
    let portfolio = portfolio_returns(&weights.ordered(matrix.symbols()), &percent);
    let window = COMPARISON_PERIODS.min(portfolio.len());

    let mut comparison: Vec<ComparisonColumn> = matrix
        .symbols()
        .iter()
        .zip(&percent)
        .map(|(symbol, r)| ComparisonColumn {
            name: format!("{}_Return", symbol),
            values: r[..window].to_vec(),
        })
        .collect();
    comparison.push(ComparisonColumn {
        name: format!("{}_Portfolio", strategy.name()),
        values: portfolio[..window].to_vec(),
    });

    let insights = comparison.iter().map(ComparisonColumn::insight).collect();
    info!("{} analysis over {} periods", strategy, window);

    Ok(StrategyAnalysis {
        strategy,
        weights,
        comparison,
        insights,
    })
}

/// Result of [`run_investment_strategy`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestmentStrategyResult {
    pub weights: WeightVector,
    /// Latest-period log return of the weighted portfolio.
    pub portfolio_return: f64,
    pub stress_test: StressTestResult,
    pub insights: Vec<String>,
}

/// Sharpe-weighted allocation, its latest return and a stress test.
pub fn run_investment_strategy(
    matrix: &PriceMatrix,
    weighting: &WeightingConfig,
    stress: &StressConfig,
) -> Result<InvestmentStrategyResult> {
    let weights = compute_weights(WeightingStrategy::Sharpe, matrix, weighting)?;

    let log_returns = matrix.log_returns();
    let portfolio_return = weights
        .ordered(matrix.symbols())
        .iter()
        .zip(&log_returns)
        .map(|(w, r)| r.last().map_or(0.0, |last| w * last))
        .sum();

    let stress_test = StressSimulator::new(stress.clone()).run(&weights)?;
    let insights = stress_test.insights();

    Ok(InvestmentStrategyResult {
        weights,
        portfolio_return,
        stress_test,
        insights,
    })
}

/// Equal-weighted risk metrics checked against `thresholds`.
pub fn run_risk_check(matrix: &PriceMatrix, thresholds: &RiskThresholds) -> Result<RiskReport> {
    if matrix.is_empty() {
        return Err(AnalyticsError::EmptyData("price matrix has no rows".to_string()));
    }
    let report = RiskReport::new(compute_risk_metrics(matrix), thresholds);
    if let Some(alert) = &report.alert {
        info!("{}", alert);
    }
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn matrix(columns: Vec<(&str, Vec<f64>)>) -> PriceMatrix {
        let n = columns[0].1.len();
        let start = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let dates = (0..n).map(|i| start + chrono::Duration::days(i as i64)).collect();
        let (symbols, cols): (Vec<String>, Vec<Vec<f64>>) =
            columns.into_iter().map(|(s, c)| (s.to_string(), c)).unzip();
        PriceMatrix::from_columns(dates, symbols, cols).unwrap()
    }

    #[test]
    fn test_portfolio_returns_common_length() {
        let r = portfolio_returns(&[0.5, 0.5], &[vec![0.1, 0.2, 0.3], vec![0.3, 0.0]]);
        assert_eq!(r.len(), 2);
        assert!((r[0] - 0.2).abs() < 1e-12);
        assert!((r[1] - 0.1).abs() < 1e-12);
        assert!(portfolio_returns(&[], &[]).is_empty());
    }

    #[test]
    fn test_analyze_strategy_columns_and_insights() {
        let up: Vec<f64> = (0..20).map(|i| 100.0 * 1.01_f64.powi(i)).collect();
        let flat = vec![50.0; 20];
        let m = matrix(vec![("A", up), ("B", flat)]);
        let analysis = analyze_strategy(WeightingStrategy::Equal, &m, &WeightingConfig::default()).unwrap();

        let names: Vec<&str> = analysis.comparison.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["A_Return", "B_Return", "Equal_Portfolio"]);
        assert!(analysis.comparison.iter().all(|c| c.values.len() == COMPARISON_PERIODS));
        assert_eq!(analysis.insights[0], "A_Return -> Avg Return=1.00%, Risk=0.00");
        assert_eq!(analysis.insights[2], "Equal_Portfolio -> Avg Return=0.50%, Risk=0.00");
    }

    #[test]
    fn test_investment_strategy() {
        let a: Vec<f64> = (0..12).map(|i| 10.0 + i as f64 + if i % 2 == 0 { 0.3 } else { 0.0 }).collect();
        let b: Vec<f64> = (0..12).map(|i| 20.0 - 0.5 * i as f64).collect();
        let m = matrix(vec![("A", a.clone()), ("B", b.clone())]);
        let result = run_investment_strategy(
            &m,
            &WeightingConfig::default(),
            &StressConfig::default().with_seed(5),
        )
        .unwrap();

        // B falls steadily and gets no Sharpe weight; A is clamped to the cap
        // and B takes the excess.
        assert!((result.weights.get("A") - 0.5).abs() < 1e-12);
        assert!((result.weights.get("B") - 0.5).abs() < 1e-12);
        let expected = 0.5 * (a[11] / a[10]).ln() + 0.5 * (b[11] / b[10]).ln();
        assert!((result.portfolio_return - expected).abs() < 1e-12);
        assert_eq!(result.insights.len(), 3);
    }

    #[test]
    fn test_risk_check_composes_alert() {
        let m = matrix(vec![("BTC", vec![100.0, 150.0, 60.0, 90.0, 40.0])]);
        let report = run_risk_check(&m, &RiskThresholds::default()).unwrap();
        assert!(report.has_violations());
        assert!(report.alert.unwrap().starts_with("Risk Alert Triggered: Volatility"));
    }
}
