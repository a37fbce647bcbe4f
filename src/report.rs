//! Terminal and JSON rendering of analytics results.

use crate::analysis::{InvestmentStrategyResult, StrategyAnalysis};
use crate::error::Result;
use crate::forecast::ForecastResult;
use crate::risk::{pct, RiskReport};
use crate::stress::StressTestResult;
use crate::technical::AssetTechnicals;
use crate::weights::WeightVector;
use colored::Colorize;
use serde::Serialize;
use tabled::{builder::Builder, settings::Style};

/// Pretty-printed JSON for any result.
pub fn to_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    Ok(serde_json::to_string_pretty(value)?)
}

fn heading(title: &str) -> String {
    format!("{}", title.bold().underline())
}

fn optional(value: Option<f64>, render: impl Fn(f64) -> String) -> String {
    value.map(render).unwrap_or_else(|| "n/a".to_string())
}

/// Renders results as text tables.
pub struct ReportFormatter;

impl ReportFormatter {
    pub fn weights(title: &str, weights: &WeightVector) -> String {
        let mut builder = Builder::new();
        builder.push_record(["Asset", "Weight"]);
        for (symbol, w) in weights.iter() {
            builder.push_record([symbol.to_string(), pct(w, 2)]);
        }
        let table = builder.build().with(Style::rounded()).to_string();
        format!("{}\n{}", heading(title), table)
    }

    pub fn strategy_analysis(analysis: &StrategyAnalysis) -> String {
        let mut out = vec![Self::weights(
            &format!("{} weights", analysis.strategy),
            &analysis.weights,
        )];

        let periods = analysis.comparison.first().map_or(0, |c| c.values.len());
        let mut builder = Builder::new();
        let mut header = vec!["Period".to_string()];
        header.extend(analysis.comparison.iter().map(|c| c.name.clone()));
        builder.push_record(header);
        for t in 0..periods {
            let mut row = vec![(t + 1).to_string()];
            row.extend(analysis.comparison.iter().map(|c| format!("{:.2}%", c.values[t])));
            builder.push_record(row);
        }
        out.push(format!(
            "{}\n{}",
            heading("Returns comparison"),
            builder.build().with(Style::rounded())
        ));

        out.push(heading("Insights"));
        out.extend(analysis.insights.iter().map(|i| format!("  {}", i)));
        out.join("\n")
    }

    pub fn risk(report: &RiskReport) -> String {
        let m = &report.metrics;
        let mut builder = Builder::new();
        builder.push_record(["Metric", "Value"]);
        builder.push_record(["Volatility".to_string(), optional(m.volatility, |v| pct(v, 2))]);
        builder.push_record(["Sharpe".to_string(), optional(m.sharpe, |v| format!("{:.2}", v))]);
        builder.push_record(["Sortino".to_string(), optional(m.sortino, |v| format!("{:.2}", v))]);
        builder.push_record(["Max Drawdown".to_string(), optional(m.max_drawdown, |v| pct(v, 2))]);
        builder.push_record(["Beta".to_string(), optional(m.beta, |v| format!("{:.2}", v))]);
        builder.push_record(["Max Weight".to_string(), optional(m.max_weight, |v| pct(v, 2))]);

        let mut out = vec![format!(
            "{}\n{}",
            heading("Risk metrics"),
            builder.build().with(Style::rounded())
        )];
        if report.violations.is_empty() {
            out.push(format!("{}", "No risk thresholds breached.".green()));
        } else {
            out.push(heading("Violations"));
            out.extend(report.violations.iter().map(|v| format!("  {}", v.message.red())));
        }
        out.join("\n")
    }

    pub fn stress(result: &StressTestResult) -> String {
        let mut builder = Builder::new();
        builder.push_record(["Scenario", "Mean", "Volatility", "Min", "Max"]);
        for s in &result.scenarios {
            builder.push_record([
                s.scenario.clone(),
                pct(s.mean_return, 2),
                pct(s.volatility, 2),
                pct(s.min_return, 2),
                pct(s.max_return, 2),
            ]);
        }
        let mut out = vec![format!(
            "{}\n{}",
            heading(&format!("Stress test ({} trials)", result.num_trials)),
            builder.build().with(Style::rounded())
        )];
        out.push(heading("Insights"));
        out.extend(result.insights().into_iter().map(|i| format!("  {}", i)));
        out.join("\n")
    }

    pub fn investment_strategy(result: &InvestmentStrategyResult) -> String {
        let change = result.portfolio_return;
        let latest = if change >= 0.0 {
            pct(change, 2).green().to_string()
        } else {
            pct(change, 2).red().to_string()
        };
        [
            Self::weights("Sharpe-optimized weights", &result.weights),
            format!("Latest portfolio log return: {}", latest),
            Self::stress(&result.stress_test),
        ]
        .join("\n")
    }

    pub fn forecasts(results: &[ForecastResult]) -> String {
        let mut builder = Builder::new();
        builder.push_record([
            "Asset", "Next period", "Prediction", "95% interval", "Order", "AIC", "R2", "RMSE", "MAE",
            "MAPE", "Train/Valid",
        ]);
        for r in results {
            builder.push_record([
                r.symbol.clone(),
                r.next_period.to_string(),
                format!("{:.4}", r.predicted_value),
                format!("[{:.4}, {:.4}]", r.confidence_interval.0, r.confidence_interval.1),
                r.model_order.to_string(),
                optional(r.aic, |v| format!("{:.2}", v)),
                format!("{:.4}", r.accuracy.r2_score),
                format!("{:.4}", r.accuracy.rmse),
                format!("{:.4}", r.accuracy.mae),
                format!("{:.2}%", r.accuracy.mape),
                format!("{}/{}", r.training_size, r.validation_size),
            ]);
        }
        format!("{}\n{}", heading("Forecasts"), builder.build().with(Style::rounded()))
    }

    pub fn technicals(assets: &[AssetTechnicals]) -> String {
        let mut out = Vec::new();
        for asset in assets {
            out.push(heading(&format!(
                "{} (Sortino {}, Beta {})",
                asset.symbol,
                optional(asset.sortino, |v| format!("{:.2}", v)),
                optional(asset.beta, |v| format!("{:.2}", v))
            )));
            let mut builder = Builder::new();
            builder.push_record(["Date", "Change", "Vol 7d", "Avg 3d", "Signal"]);
            for row in &asset.rows {
                builder.push_record([
                    row.date.map_or_else(|| "-".to_string(), |d| d.to_string()),
                    pct(row.percent_change, 2),
                    pct(row.rolling_volatility_7d, 2),
                    pct(row.average_return_3d, 2),
                    row.trading_signal.to_string(),
                ]);
            }
            out.push(builder.build().with(Style::rounded()).to_string());
        }
        out.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::risk::{RiskMetricsSnapshot, RiskThresholds};
    use std::collections::BTreeMap;

    fn weights() -> WeightVector {
        let map: BTreeMap<String, f64> = [("BTC".to_string(), 0.5), ("ETH".to_string(), 0.5)].into();
        WeightVector::new(map).unwrap()
    }

    #[test]
    fn test_weights_table() {
        colored::control::set_override(false);
        let text = ReportFormatter::weights("Equal weights", &weights());
        assert!(text.contains("BTC"));
        assert!(text.contains("50.00%"));
    }

    #[test]
    fn test_risk_marks_undefined_metrics() {
        colored::control::set_override(false);
        let report = RiskReport::new(
            RiskMetricsSnapshot {
                volatility: Some(0.9),
                ..Default::default()
            },
            &RiskThresholds::default(),
        );
        let text = ReportFormatter::risk(&report);
        assert!(text.contains("n/a"));
        assert!(text.contains("Volatility 90.00% >= 5%"));
    }

    #[test]
    fn test_json_uses_null_for_undefined() {
        let snapshot = RiskMetricsSnapshot {
            volatility: Some(0.1),
            ..Default::default()
        };
        let json = to_json(&snapshot).unwrap();
        assert!(json.contains("\"sharpe\": null"));
        let weights_json = to_json(&weights()).unwrap();
        assert!(weights_json.contains("\"BTC\": 0.5"));
    }
}
