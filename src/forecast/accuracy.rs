//! Holdout accuracy of one-step forecasts.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

/// Validation accuracy over a holdout window.
///
/// A holdout with no variance has no meaningful R2, which is reported as
/// `0.0` while the error metrics are still computed. When any other metric
/// cannot be computed, all four are reported as `0.0`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct AccuracyMetrics {
    pub r2_score: f64,
    pub rmse: f64,
    pub mae: f64,
    /// Mean absolute percentage error, in percent.
    pub mape: f64,
}

impl AccuracyMetrics {
    /// Score `predictions` against `actuals`.
    pub fn evaluate(actuals: &[f64], predictions: &[f64]) -> Self {
        match Self::try_evaluate(actuals, predictions) {
            Some(metrics) => metrics,
            None => {
                warn!(
                    "Accuracy metrics undefined over {} holdout points, reporting zeros",
                    actuals.len()
                );
                Self::default()
            }
        }
    }

    fn try_evaluate(actuals: &[f64], predictions: &[f64]) -> Option<Self> {
        if actuals.is_empty() || actuals.len() != predictions.len() {
            return None;
        }
        if actuals.iter().any(|a| *a == 0.0) {
            return None;
        }

        let n = actuals.len() as f64;
        let mean_actual = actuals.iter().sum::<f64>() / n;
        let ss_tot: f64 = actuals.iter().map(|a| (a - mean_actual).powi(2)).sum();

        let errors: Vec<f64> = actuals.iter().zip(predictions).map(|(a, p)| a - p).collect();
        let ss_res: f64 = errors.iter().map(|e| e * e).sum();

        let r2_score = if ss_tot == 0.0 {
            debug!("Holdout has zero variance, reporting R2 as 0");
            0.0
        } else {
            1.0 - ss_res / ss_tot
        };

        let metrics = Self {
            r2_score,
            rmse: (ss_res / n).sqrt(),
            mae: errors.iter().map(|e| e.abs()).sum::<f64>() / n,
            mape: errors
                .iter()
                .zip(actuals)
                .map(|(e, a)| (e / a).abs())
                .sum::<f64>()
                / n
                * 100.0,
        };

        let all_finite = [metrics.r2_score, metrics.rmse, metrics.mae, metrics.mape]
            .iter()
            .all(|v| v.is_finite());
        all_finite.then_some(metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_predictions() {
        let actual = [1.0, 2.0, 3.0];
        let m = AccuracyMetrics::evaluate(&actual, &actual);
        assert_eq!(m.r2_score, 1.0);
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert_eq!(m.mape, 0.0);
    }

    #[test]
    fn test_known_values() {
        let actual = [100.0, 200.0];
        let predicted = [110.0, 180.0];
        let m = AccuracyMetrics::evaluate(&actual, &predicted);
        assert!((m.mae - 15.0).abs() < 1e-12);
        assert!((m.rmse - 250.0_f64.sqrt()).abs() < 1e-12);
        assert!((m.mape - 10.0).abs() < 1e-12);
        // ss_tot = 5000, ss_res = 500.
        assert!((m.r2_score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_zero_actual_degrades_everything() {
        let m = AccuracyMetrics::evaluate(&[0.0, 1.0], &[0.5, 1.5]);
        assert_eq!(m, AccuracyMetrics::default());
    }

    #[test]
    fn test_constant_actuals_zero_only_r2() {
        let m = AccuracyMetrics::evaluate(&[2.0, 2.0], &[1.0, 4.0]);
        assert_eq!(m.r2_score, 0.0);
        assert!((m.mae - 1.5).abs() < 1e-12);
        assert!((m.rmse - 2.5_f64.sqrt()).abs() < 1e-12);
        assert!((m.mape - 75.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_degrades() {
        assert_eq!(AccuracyMetrics::evaluate(&[], &[]), AccuracyMetrics::default());
    }
}
