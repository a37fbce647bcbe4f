//! Small statistical helpers shared across the engine.
//!
//! Functions return `None` whenever the statistic is undefined for the input
//! (empty slice, too few points, zero denominator) instead of a NaN or a zero.

/// Trading periods per year used for annualization.
pub const TRADING_DAYS: f64 = 252.0;

/// Standard deviations at or below this are treated as zero variance.
pub const ZERO_VARIANCE: f64 = 1e-12;

/// Arithmetic mean.
pub fn mean(data: &[f64]) -> Option<f64> {
    if data.is_empty() {
        return None;
    }
    Some(data.iter().sum::<f64>() / data.len() as f64)
}

/// Standard deviation with `ddof` delta degrees of freedom
/// (0 = population, 1 = sample).
pub fn std_dev(data: &[f64], ddof: usize) -> Option<f64> {
    if data.len() <= ddof {
        return None;
    }
    let m = mean(data)?;
    let ss: f64 = data.iter().map(|x| (x - m).powi(2)).sum();
    Some((ss / (data.len() - ddof) as f64).sqrt())
}

/// Sample standard deviation (n - 1 denominator).
pub fn sample_std(data: &[f64]) -> Option<f64> {
    std_dev(data, 1)
}

/// Population standard deviation (n denominator).
pub fn population_std(data: &[f64]) -> Option<f64> {
    std_dev(data, 0)
}

/// Sample covariance of two equally long series.
pub fn sample_covariance(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }
    let ma = mean(a)?;
    let mb = mean(b)?;
    let cross: f64 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
    Some(cross / (a.len() - 1) as f64)
}

/// Simple returns `p[t] / p[t-1] - 1`; length is `prices.len() - 1`.
pub fn simple_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] - w[0]) / w[0]).collect()
}

/// Log returns `ln(p[t] / p[t-1])`; length is `prices.len() - 1`.
pub fn log_returns(prices: &[f64]) -> Vec<f64> {
    prices.windows(2).map(|w| (w[1] / w[0]).ln()).collect()
}

/// `true` when a standard deviation is too small to divide by.
pub fn is_zero_variance(std: f64) -> bool {
    !std.is_finite() || std <= ZERO_VARIANCE
}

/// Trailing-window mean; `None` until `window` points are available.
pub fn rolling_mean(data: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(data, window, mean)
}

/// Trailing-window sample standard deviation.
pub fn rolling_std(data: &[f64], window: usize) -> Vec<Option<f64>> {
    rolling(data, window, sample_std)
}

fn rolling(data: &[f64], window: usize, f: fn(&[f64]) -> Option<f64>) -> Vec<Option<f64>> {
    (0..data.len())
        .map(|i| {
            if window == 0 || i + 1 < window {
                None
            } else {
                f(&data[i + 1 - window..=i])
            }
        })
        .collect()
}

/// Maximum drawdown of a return series, as a non-positive fraction.
///
/// Cumulative growth is compounded from the returns and compared with its
/// running peak. Returns `None` for an empty series.
pub fn max_drawdown(returns: &[f64]) -> Option<f64> {
    if returns.is_empty() {
        return None;
    }

    let mut cumulative = 1.0;
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;

    for r in returns {
        cumulative *= 1.0 + r;
        peak = peak.max(cumulative);
        if peak > 0.0 {
            worst = worst.min((cumulative - peak) / peak);
        }
    }

    Some(worst)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_and_std() {
        let data = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_eq!(mean(&data), Some(5.0));
        assert!((population_std(&data).unwrap() - 2.0).abs() < 1e-12);
        assert!((sample_std(&data).unwrap() - 2.138089935).abs() < 1e-6);
        assert_eq!(mean(&[]), None);
        assert_eq!(sample_std(&[1.0]), None);
    }

    #[test]
    fn test_covariance() {
        let a = [1.0, 2.0, 3.0];
        let b = [2.0, 4.0, 6.0];
        assert!((sample_covariance(&a, &b).unwrap() - 2.0).abs() < 1e-12);
        assert_eq!(sample_covariance(&a, &b[..2]), None);
    }

    #[test]
    fn test_returns() {
        let prices = [100.0, 110.0, 99.0];
        let simple = simple_returns(&prices);
        assert!((simple[0] - 0.1).abs() < 1e-12);
        assert!((simple[1] + 0.1).abs() < 1e-12);
        let logs = log_returns(&prices);
        assert!((logs[0] - 1.1_f64.ln()).abs() < 1e-12);
        assert!(simple_returns(&[1.0]).is_empty());
    }

    #[test]
    fn test_rolling() {
        let data = [1.0, 2.0, 3.0, 4.0];
        let m = rolling_mean(&data, 3);
        assert_eq!(m, vec![None, None, Some(2.0), Some(3.0)]);
        let s = rolling_std(&data, 2);
        assert!(s[0].is_none());
        assert!((s[1].unwrap() - 0.5_f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_max_drawdown() {
        assert_eq!(max_drawdown(&[]), None);
        assert_eq!(max_drawdown(&[0.01, 0.02]), Some(0.0));
        let dd = max_drawdown(&[0.10, -0.50, 0.20]).unwrap();
        assert!((dd + 0.5).abs() < 1e-12);
    }
}
