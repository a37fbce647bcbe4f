//! ARIMA(p, d, q) estimation without a constant term.
//!
//! The series is differenced `d` times. AR and MA coefficients are estimated
//! with the two-stage Hannan-Rissanen regression: a long autoregression
//! supplies innovation estimates, then the differenced series is regressed on
//! its own lags and the lagged innovations. The fitted model is scored with
//! the conditional sum of squares (CSS) Gaussian likelihood.

use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use thiserror::Error;

/// Pivot magnitude below which the normal equations are considered singular.
const SINGULAR_PIVOT: f64 = 1e-10;

/// Model order `(p, d, q)`. Serialized as a `[p, d, q]` triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "(usize, usize, usize)", into = "(usize, usize, usize)")]
pub struct ArimaOrder {
    pub p: usize,
    pub d: usize,
    pub q: usize,
}

impl ArimaOrder {
    pub const fn new(p: usize, d: usize, q: usize) -> Self {
        Self { p, d, q }
    }

    /// Number of estimated parameters, innovation variance included.
    pub fn num_params(&self) -> usize {
        self.p + self.q + 1
    }

    pub fn as_tuple(&self) -> (usize, usize, usize) {
        (self.p, self.d, self.q)
    }
}

impl fmt::Display for ArimaOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.p, self.d, self.q)
    }
}

impl From<(usize, usize, usize)> for ArimaOrder {
    fn from((p, d, q): (usize, usize, usize)) -> Self {
        Self::new(p, d, q)
    }
}

impl From<ArimaOrder> for (usize, usize, usize) {
    fn from(order: ArimaOrder) -> Self {
        order.as_tuple()
    }
}

/// Why a fit was rejected.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FitError {
    #[error("need {needed} observations for this order, have {available}")]
    TooFewObservations { needed: usize, available: usize },

    #[error("normal equations are singular")]
    Singular,

    #[error("series or estimates are not finite")]
    NonFinite,

    #[error("estimated MA polynomial is not invertible")]
    NonInvertible,

    #[error("innovation variance is zero")]
    ZeroVariance,
}

/// A fitted model, able to forecast one step past the end of its data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArimaFit {
    pub order: ArimaOrder,
    pub ar: Vec<f64>,
    pub ma: Vec<f64>,
    /// Innovation variance (CSS estimate).
    pub sigma2: f64,
    pub log_likelihood: f64,
    pub aic: f64,
    /// Number of residuals entering the likelihood.
    pub n_eff: usize,
    /// Last value of each differencing level, from the raw series (level 0)
    /// to `d - 1`.
    tails: Vec<f64>,
    /// Fully differenced series.
    diffed: Vec<f64>,
    residuals: Vec<f64>,
}

impl ArimaFit {
    /// Fit `order` to `series`.
    pub fn fit(series: &[f64], order: ArimaOrder) -> Result<Self, FitError> {
        Self::fit_with_burn_in(series, order, order.d + order.p)
    }

    /// Fit `order` to `series`, scoring only the residuals of observations
    /// `burn_in..`.
    ///
    /// Fits that share a `burn_in` are scored on the same observations, so
    /// their AICs stay comparable whatever the scale of the series. A
    /// `burn_in` below `d + p` is raised to it.
    pub fn fit_with_burn_in(series: &[f64], order: ArimaOrder, burn_in: usize) -> Result<Self, FitError> {
        if series.iter().any(|v| !v.is_finite()) {
            return Err(FitError::NonFinite);
        }
        let burn_in = burn_in.max(order.d + order.p);
        if series.len() <= burn_in {
            return Err(FitError::TooFewObservations {
                needed: burn_in + 1,
                available: series.len(),
            });
        }

        let mut tails = Vec::with_capacity(order.d);
        let mut diffed = series.to_vec();
        for _ in 0..order.d {
            tails.push(*diffed.last().ok_or(FitError::NonFinite)?);
            diffed = difference(&diffed);
        }

        let (ar, ma) = hannan_rissanen(&diffed, order.p, order.q)?;

        if ma.iter().map(|t| t.abs()).sum::<f64>() >= 1.0 {
            return Err(FitError::NonInvertible);
        }

        let residuals = css_residuals(&diffed, &ar, &ma);
        let scored = &residuals[burn_in - order.d..];
        let n_eff = scored.len();
        let sse: f64 = scored.iter().map(|e| e * e).sum();
        let sigma2 = sse / n_eff as f64;
        if !sigma2.is_finite() {
            return Err(FitError::NonFinite);
        }
        if sigma2 <= 0.0 {
            return Err(FitError::ZeroVariance);
        }

        let n = n_eff as f64;
        let log_likelihood = -0.5 * n * ((2.0 * PI * sigma2).ln() + 1.0);
        let aic = -2.0 * log_likelihood + 2.0 * order.num_params() as f64;

        Ok(Self {
            order,
            ar,
            ma,
            sigma2,
            log_likelihood,
            aic,
            n_eff,
            tails,
            diffed,
            residuals,
        })
    }

    /// Point forecast for the next period.
    pub fn forecast(&self) -> f64 {
        let m = self.diffed.len();
        let ar_part: f64 = self
            .ar
            .iter()
            .enumerate()
            .map(|(i, phi)| phi * self.diffed[m - 1 - i])
            .sum();
        let ma_part: f64 = self
            .ma
            .iter()
            .enumerate()
            .map(|(j, theta)| theta * self.residuals[m - 1 - j])
            .sum();

        // Undo differencing from the innermost level outwards.
        self.tails
            .iter()
            .rev()
            .fold(ar_part + ma_part, |next, last| last + next)
    }

    /// Point forecast with a symmetric `±z·σ` interval.
    pub fn forecast_interval(&self, z: f64) -> (f64, (f64, f64)) {
        let point = self.forecast();
        let half = z * self.sigma2.sqrt();
        (point, (point - half, point + half))
    }
}

fn difference(series: &[f64]) -> Vec<f64> {
    series.windows(2).map(|w| w[1] - w[0]).collect()
}

/// Two-stage AR/MA estimation on an already differenced series.
fn hannan_rissanen(z: &[f64], p: usize, q: usize) -> Result<(Vec<f64>, Vec<f64>), FitError> {
    let m = z.len();

    if q == 0 {
        if p == 0 {
            return Ok((Vec::new(), Vec::new()));
        }
        let (design, target) = lagged_design(z, None, p, 0, p);
        ensure_rows(design.len(), p, m)?;
        return Ok((least_squares(&design, &target)?, Vec::new()));
    }

    // Stage 1: long autoregression for innovation estimates.
    let k = (p + q + 3).min(m / 3).max(p + q);
    let (design, target) = lagged_design(z, None, k, 0, k);
    ensure_rows(design.len(), k, m)?;
    let long_ar = least_squares(&design, &target)?;

    let mut innovations = vec![0.0; m];
    for t in k..m {
        let fitted: f64 = (0..k).map(|i| long_ar[i] * z[t - 1 - i]).sum();
        innovations[t] = z[t] - fitted;
    }

    // Stage 2: regress on own lags and lagged innovations.
    let start = p.max(k + q);
    let (design, target) = lagged_design(z, Some(&innovations), p, q, start);
    ensure_rows(design.len(), p + q, m)?;
    let coefs = least_squares(&design, &target)?;

    let (ar, ma) = coefs.split_at(p);
    Ok((ar.to_vec(), ma.to_vec()))
}

/// Rows `t = start..len` of `[z[t-1..t-p], e[t-1..t-q]]` with target `z[t]`.
fn lagged_design(
    z: &[f64],
    innovations: Option<&[f64]>,
    p: usize,
    q: usize,
    start: usize,
) -> (Vec<Vec<f64>>, Vec<f64>) {
    let mut design = Vec::new();
    let mut target = Vec::new();
    for t in start..z.len() {
        let mut row: Vec<f64> = (1..=p).map(|i| z[t - i]).collect();
        if let Some(e) = innovations {
            row.extend((1..=q).map(|j| e[t - j]));
        }
        design.push(row);
        target.push(z[t]);
    }
    (design, target)
}

/// Require strictly more regression rows than unknowns.
fn ensure_rows(rows: usize, unknowns: usize, available: usize) -> Result<(), FitError> {
    if rows <= unknowns {
        return Err(FitError::TooFewObservations {
            needed: available + (unknowns + 1 - rows),
            available,
        });
    }
    Ok(())
}

/// Ordinary least squares via the normal equations.
fn least_squares(design: &[Vec<f64>], target: &[f64]) -> Result<Vec<f64>, FitError> {
    let k = design.first().map(Vec::len).unwrap_or(0);
    let mut xtx = vec![vec![0.0; k]; k];
    let mut xty = vec![0.0; k];

    for (row, y) in design.iter().zip(target) {
        for i in 0..k {
            xty[i] += row[i] * y;
            for j in 0..k {
                xtx[i][j] += row[i] * row[j];
            }
        }
    }

    let beta = solve(xtx, xty)?;
    if beta.iter().any(|b| !b.is_finite()) {
        return Err(FitError::NonFinite);
    }
    Ok(beta)
}

/// Solve `a·x = b` by Gaussian elimination with partial pivoting.
fn solve(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>, FitError> {
    let n = b.len();

    for col in 0..n {
        let mut max_row = col;
        for row in (col + 1)..n {
            if a[row][col].abs() > a[max_row][col].abs() {
                max_row = row;
            }
        }
        if max_row != col {
            a.swap(col, max_row);
            b.swap(col, max_row);
        }

        if a[col][col].abs() < SINGULAR_PIVOT {
            return Err(FitError::Singular);
        }

        for row in (col + 1)..n {
            let factor = a[row][col] / a[col][col];
            for j in col..n {
                a[row][j] -= factor * a[col][j];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = vec![0.0; n];
    for row in (0..n).rev() {
        let tail: f64 = ((row + 1)..n).map(|j| a[row][j] * x[j]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Ok(x)
}

/// Conditional residuals with pre-sample innovations set to zero.
fn css_residuals(z: &[f64], ar: &[f64], ma: &[f64]) -> Vec<f64> {
    let p = ar.len();
    let mut e = vec![0.0; z.len()];
    for t in p..z.len() {
        let ar_part: f64 = ar.iter().enumerate().map(|(i, phi)| phi * z[t - 1 - i]).sum();
        let ma_part: f64 = ma
            .iter()
            .enumerate()
            .filter(|(j, _)| t > *j)
            .map(|(j, theta)| theta * e[t - 1 - j])
            .sum();
        e[t] = z[t] - ar_part - ma_part;
    }
    e
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    /// Integrated AR(1) path: Δy_t = phi·Δy_{t-1} + ε_t.
    fn ar1_walk(phi: f64, n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let noise = Normal::new(0.0, 1.0).unwrap();
        let mut y = vec![100.0];
        let mut dz = 0.0;
        for _ in 1..n {
            dz = phi * dz + noise.sample(&mut rng);
            y.push(y[y.len() - 1] + dz);
        }
        y
    }

    #[test]
    fn test_solve_small_system() {
        let a = vec![vec![2.0, 1.0], vec![1.0, 3.0]];
        let x = solve(a, vec![3.0, 5.0]).unwrap();
        assert!((x[0] - 0.8).abs() < 1e-12);
        assert!((x[1] - 1.4).abs() < 1e-12);
    }

    #[test]
    fn test_solve_singular() {
        let a = vec![vec![1.0, 2.0], vec![2.0, 4.0]];
        assert_eq!(solve(a, vec![1.0, 2.0]), Err(FitError::Singular));
    }

    #[test]
    fn test_recovers_ar_coefficient() {
        let y = ar1_walk(0.6, 600, 11);
        let fit = ArimaFit::fit(&y, ArimaOrder::new(1, 1, 0)).unwrap();
        assert!((fit.ar[0] - 0.6).abs() < 0.1, "phi = {}", fit.ar[0]);
        assert!((fit.sigma2 - 1.0).abs() < 0.2, "sigma2 = {}", fit.sigma2);
        assert!(fit.aic.is_finite());
    }

    #[test]
    fn test_arma_fit_is_invertible() {
        let y = ar1_walk(0.4, 400, 5);
        let fit = ArimaFit::fit(&y, ArimaOrder::new(2, 1, 1)).unwrap();
        assert_eq!(fit.ar.len(), 2);
        assert_eq!(fit.ma.len(), 1);
        assert!(fit.ma[0].abs() < 1.0);
    }

    #[test]
    fn test_forecast_integrates_difference() {
        // A perfectly linear series has constant first differences; the AR
        // regression is exact but the residual variance is zero.
        let y: Vec<f64> = (0..40).map(|i| 10.0 + 2.0 * i as f64).collect();
        assert_eq!(
            ArimaFit::fit(&y, ArimaOrder::new(1, 1, 0)),
            Err(FitError::ZeroVariance)
        );

        let y = ar1_walk(0.5, 200, 3);
        let fit = ArimaFit::fit(&y, ArimaOrder::new(1, 1, 0)).unwrap();
        let m = y.len();
        let expected = y[m - 1] + fit.ar[0] * (y[m - 1] - y[m - 2]);
        assert!((fit.forecast() - expected).abs() < 1e-9);

        let (point, (lo, hi)) = fit.forecast_interval(1.96);
        assert!(lo < point && point < hi);
        assert!(((hi - lo) / 2.0 - 1.96 * fit.sigma2.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_constant_series_fails() {
        let y = vec![5.0; 40];
        assert!(ArimaFit::fit(&y, ArimaOrder::new(1, 1, 0)).is_err());
        assert!(ArimaFit::fit(&y, ArimaOrder::new(2, 1, 1)).is_err());
    }

    #[test]
    fn test_too_short_series_fails() {
        let y = [1.0, 2.0, 4.0, 3.0];
        assert!(matches!(
            ArimaFit::fit(&y, ArimaOrder::new(5, 1, 2)),
            Err(FitError::TooFewObservations { .. })
        ));
    }

    #[test]
    fn test_burn_in_fixes_the_scored_sample() {
        let y = ar1_walk(0.3, 120, 8);
        let short = ArimaFit::fit(&y, ArimaOrder::new(1, 1, 0)).unwrap();
        let long = ArimaFit::fit(&y, ArimaOrder::new(5, 1, 2)).unwrap();
        assert_eq!(short.n_eff, 118);
        assert_eq!(long.n_eff, 114);

        let shared = ArimaFit::fit_with_burn_in(&y, ArimaOrder::new(1, 1, 0), 6).unwrap();
        assert_eq!(shared.n_eff, long.n_eff);
        assert_eq!(shared.ar, short.ar);

        // Below d + p the burn-in is raised.
        let raised = ArimaFit::fit_with_burn_in(&y, ArimaOrder::new(3, 1, 0), 0).unwrap();
        assert_eq!(raised.n_eff, 116);
    }

    #[test]
    fn test_non_finite_rejected() {
        let y = [1.0, f64::NAN, 2.0];
        assert_eq!(ArimaFit::fit(&y, ArimaOrder::new(1, 1, 0)), Err(FitError::NonFinite));
    }
}
