//! # Analytics kernel
//! Statistical primitives behind self-reflection: least-squares trend
//! fitting, z-score outlier flags, exponential-smoothing forecasts, and
//! summary statistics. Pure functions over `&[f64]`, replaceable as a unit.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Direction of a fitted trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    /// The series is rising.
    Increasing,
    /// The series is falling.
    Decreasing,
    /// No meaningful slope (including series shorter than two points).
    Flat,
}

/// Result of a least-squares trend fit over a time-ordered series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TrendAnalysis {
    /// Direction of the fitted slope.
    pub direction: TrendDirection,
    /// Fitted slope per step.
    pub slope: f64,
    /// Fitted intercept.
    pub intercept: f64,
    /// Coefficient of determination of the fit.
    pub r_squared: f64,
    /// Trend strength: the absolute correlation coefficient, in `[0, 1]`.
    pub strength: f64,
}

impl TrendAnalysis {
    fn flat() -> Self {
        Self {
            direction: TrendDirection::Flat,
            slope: 0.0,
            intercept: 0.0,
            r_squared: 0.0,
            strength: 0.0,
        }
    }
}

/// Summary statistics over a series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SummaryStats {
    /// Arithmetic mean.
    pub mean: f64,
    /// Median.
    pub median: f64,
    /// Population standard deviation.
    pub std_dev: f64,
    /// Smallest value.
    pub min: f64,
    /// Largest value.
    pub max: f64,
}

const SLOPE_EPSILON: f64 = 1e-12;

/// Fit a least-squares line over `series` indexed by position.
///
/// Fewer than two points, or a degenerate series, yields a flat result
/// with zeroed slope and strength — never an error.
pub fn linear_trend(series: &[f64]) -> TrendAnalysis {
    let n = series.len();
    if n < 2 {
        return TrendAnalysis::flat();
    }

    let nf = n as f64;
    let mean_x = (nf - 1.0) / 2.0;
    let mean_y = series.iter().sum::<f64>() / nf;

    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (i, &y) in series.iter().enumerate() {
        let dx = i as f64 - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }

    let slope = cov / var_x;
    let intercept = mean_y - slope * mean_x;
    let r = if var_y < SLOPE_EPSILON {
        0.0
    } else {
        cov / (var_x.sqrt() * var_y.sqrt())
    };

    let direction = if slope > SLOPE_EPSILON {
        TrendDirection::Increasing
    } else if slope < -SLOPE_EPSILON {
        TrendDirection::Decreasing
    } else {
        TrendDirection::Flat
    };

    TrendAnalysis {
        direction,
        slope,
        intercept,
        r_squared: r * r,
        strength: r.abs(),
    }
}

/// Flag statistical outliers: one bool per point, `true` when the point's
/// z-score against the series mean exceeds `z_threshold`.
///
/// Series with fewer than two points, or zero spread, flag nothing.
pub fn flag_outliers(series: &[f64], z_threshold: f64) -> Vec<bool> {
    let n = series.len();
    if n < 2 {
        return vec![false; n];
    }
    let (mean, std_dev) = mean_stddev(series);
    if std_dev < f64::EPSILON {
        return vec![false; n];
    }
    series
        .iter()
        .map(|&x| (x - mean).abs() / std_dev > z_threshold)
        .collect()
}

/// Forecast the next `steps` values via Holt-style exponential smoothing of
/// level and trend.
///
/// An empty series forecasts nothing; a single point repeats itself.
pub fn forecast(series: &[f64], steps: usize, alpha: f64) -> Vec<f64> {
    match series {
        [] => Vec::new(),
        [only] => vec![*only; steps],
        _ => {
            let mut level = series[0];
            let mut trend = series[1] - series[0];
            for &x in &series[1..] {
                let prev_level = level;
                level = alpha * x + (1.0 - alpha) * (level + trend);
                trend = alpha * (level - prev_level) + (1.0 - alpha) * trend;
            }
            (1..=steps).map(|k| level + trend * k as f64).collect()
        }
    }
}

/// Summary statistics for a series; an empty series yields all zeros.
pub fn summarize(series: &[f64]) -> SummaryStats {
    if series.is_empty() {
        return SummaryStats {
            mean: 0.0,
            median: 0.0,
            std_dev: 0.0,
            min: 0.0,
            max: 0.0,
        };
    }

    let (mean, std_dev) = mean_stddev(series);

    let mut sorted = series.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = sorted.len() / 2;
    let median = if sorted.len() % 2 == 0 {
        (sorted[mid - 1] + sorted[mid]) / 2.0
    } else {
        sorted[mid]
    };

    SummaryStats {
        mean,
        median,
        std_dev,
        min: sorted[0],
        max: sorted[sorted.len() - 1],
    }
}

/// Mean and population standard deviation; `(0, 0)` for an empty series.
fn mean_stddev(series: &[f64]) -> (f64, f64) {
    let n = series.len();
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = series.iter().sum::<f64>() / n as f64;
    let variance = series.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / n as f64;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trend_increasing_perfect_line() {
        let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let trend = linear_trend(&data);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!((trend.slope - 1.0).abs() < 1e-9);
        assert!((trend.strength - 1.0).abs() < 1e-9);
        assert!((trend.intercept - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_trend_decreasing() {
        let data: Vec<f64> = (0..10).map(|i| 10.0 - i as f64).collect();
        let trend = linear_trend(&data);
        assert_eq!(trend.direction, TrendDirection::Decreasing);
        assert!(trend.slope < 0.0);
        assert!(trend.strength > 0.99);
    }

    #[test]
    fn test_trend_flat_constant_series() {
        let trend = linear_trend(&[3.0, 3.0, 3.0, 3.0]);
        assert_eq!(trend.direction, TrendDirection::Flat);
        assert_eq!(trend.strength, 0.0);
    }

    #[test]
    fn test_trend_short_series_is_flat() {
        assert_eq!(linear_trend(&[]).direction, TrendDirection::Flat);
        assert_eq!(linear_trend(&[1.0]).direction, TrendDirection::Flat);
    }

    #[test]
    fn test_trend_noisy_has_partial_strength() {
        let data = [1.0, 3.0, 2.0, 5.0, 4.0, 7.0];
        let trend = linear_trend(&data);
        assert_eq!(trend.direction, TrendDirection::Increasing);
        assert!(trend.strength > 0.5 && trend.strength < 1.0);
    }

    #[test]
    fn test_outliers_flag_spike() {
        let mut data = vec![10.0; 30];
        data.extend([10.5, 9.5, 10.5, 9.5]);
        data.push(100.0);
        let flags = flag_outliers(&data, 3.0);
        assert_eq!(flags.len(), data.len());
        assert!(flags[data.len() - 1], "spike should be flagged");
        assert!(!flags[0], "baseline should not be flagged");
    }

    #[test]
    fn test_outliers_uniform_ramp_not_flagged() {
        let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        assert!(flag_outliers(&data, 3.0).iter().all(|&f| !f));
    }

    #[test]
    fn test_outliers_zero_spread_not_flagged() {
        assert!(flag_outliers(&[5.0; 8], 3.0).iter().all(|&f| !f));
    }

    #[test]
    fn test_outliers_short_series() {
        assert_eq!(flag_outliers(&[], 3.0), Vec::<bool>::new());
        assert_eq!(flag_outliers(&[42.0], 3.0), vec![false]);
    }

    #[test]
    fn test_forecast_continues_linear_trend() {
        let data: Vec<f64> = (1..=10).map(|i| i as f64).collect();
        let fc = forecast(&data, 3, 0.5);
        assert_eq!(fc.len(), 3);
        // A clean +1/step series should project above its last value.
        assert!(fc[0] > 10.0);
        assert!(fc[1] > fc[0]);
    }

    #[test]
    fn test_forecast_empty_and_single() {
        assert!(forecast(&[], 5, 0.5).is_empty());
        assert_eq!(forecast(&[2.0], 3, 0.5), vec![2.0, 2.0, 2.0]);
    }

    #[test]
    fn test_forecast_constant_series_stays_constant() {
        let fc = forecast(&[4.0; 12], 4, 0.3);
        for v in fc {
            assert!((v - 4.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_summarize_known_values() {
        let stats = summarize(&[10.0, 20.0, 30.0]);
        assert!((stats.mean - 20.0).abs() < 1e-9);
        assert!((stats.median - 20.0).abs() < 1e-9);
        assert!(stats.std_dev > 8.0 && stats.std_dev < 8.5);
        assert_eq!(stats.min, 10.0);
        assert_eq!(stats.max, 30.0);
    }

    #[test]
    fn test_summarize_even_length_median() {
        let stats = summarize(&[1.0, 2.0, 3.0, 4.0]);
        assert!((stats.median - 2.5).abs() < 1e-9);
    }

    #[test]
    fn test_summarize_empty_is_zeroed() {
        let stats = summarize(&[]);
        assert_eq!(stats.mean, 0.0);
        assert_eq!(stats.max, 0.0);
    }
}
