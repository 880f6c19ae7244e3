//! Rolling Pearson correlation between two return series
//!
//! Sample statistics (n-1 denominator) are used throughout. The denominator cancels in the
//! correlation itself but keeps the intermediate variances comparable with [`super::anomaly`].

use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::series::{CorrelationSeries, ReturnSeries, Series};
use super::{is_degenerate, sample_moments};
use crate::error::ConfigError;

/// Number of paired observations in a rolling window, always at least 2.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "usize", into = "usize")]
pub struct Window(usize);

impl Window {
    pub const MIN: usize = 2;

    pub fn new(size: usize) -> Result<Self, ConfigError> {
        if size < Self::MIN {
            return Err(ConfigError::invalid(
                "window",
                size,
                format!("rolling window must be at least {}", Self::MIN),
            ));
        }
        Ok(Self(size))
    }

    pub fn get(self) -> usize {
        self.0
    }
}

impl Default for Window {
    fn default() -> Self {
        Self(10)
    }
}

impl TryFrom<usize> for Window {
    type Error = ConfigError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

impl From<Window> for usize {
    fn from(window: Window) -> Self {
        window.0
    }
}

/// Pearson correlation coefficient of two equally long samples.
///
/// Returns `None` for fewer than two observations, mismatched lengths, or when either side has
/// zero variance. Result is within -1.0 to +1.0.
pub fn pearson(a: &[f64], b: &[f64]) -> Option<f64> {
    if a.len() != b.len() || a.len() < 2 {
        return None;
    }

    let (mean_a, var_a) = sample_moments(a)?;
    let (mean_b, var_b) = sample_moments(b)?;
    if is_degenerate(a, var_a) || is_degenerate(b, var_b) {
        return None;
    }

    let cov = a
        .iter()
        .zip(b)
        .map(|(x, y)| (x - mean_a) * (y - mean_b))
        .sum::<f64>()
        / (a.len() - 1) as f64;

    let corr = cov / (var_a.sqrt() * var_b.sqrt());
    corr.is_finite().then(|| corr.clamp(-1.0, 1.0))
}

/// Correlation over the trailing `window` pairs at every position.
///
/// Inputs are paired from the most recent end when their lengths differ, and the output has the
/// length of the shorter input. Positions before `window - 1`, and windows containing an
/// undefined value on either side, are undefined.
pub fn rolling_correlation(
    a: &[Option<f64>],
    b: &[Option<f64>],
    window: Window,
) -> Vec<Option<f64>> {
    let len = a.len().min(b.len());
    let a = &a[a.len() - len..];
    let b = &b[b.len() - len..];
    let size = window.get();

    (0..len)
        .map(|end| {
            let start = (end + 1).checked_sub(size)?;
            let (xs, ys): (Vec<f64>, Vec<f64>) = a[start..=end]
                .iter()
                .zip(&b[start..=end])
                .map(|(x, y)| Some(((*x)?, (*y)?)))
                .collect::<Option<Vec<_>>>()?
                .into_iter()
                .unzip();
            pearson(&xs, &ys)
        })
        .collect()
}

/// Rolling correlator with a fixed window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RollingCorrelator {
    window: Window,
}

impl RollingCorrelator {
    pub fn new(window: Window) -> Self {
        Self { window }
    }

    pub fn window(&self) -> Window {
        self.window
    }

    /// Correlate two return series. Timestamps are taken from `a`.
    pub fn correlate(&self, a: &ReturnSeries, b: &ReturnSeries) -> CorrelationSeries {
        let values = rolling_correlation(a.values(), b.values(), self.window);
        Series::new(a.timestamps().to_vec(), values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::returns::returns;

    fn defined(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    fn prices() -> Vec<Option<f64>> {
        defined(&[
            100.0, 102.0, 101.0, 105.0, 103.0, 104.0, 108.0, 107.0, 103.0, 106.0, 109.0, 104.0,
            110.0, 111.0, 107.0,
        ])
    }

    #[test]
    fn test_window_rejects_sizes_below_two() {
        assert!(Window::new(0).is_err());
        assert!(Window::new(1).is_err());
        assert_eq!(Window::new(2).unwrap().get(), 2);
        assert_eq!(Window::default().get(), 10);
    }

    #[test]
    fn test_correlation_perfect_positive() {
        let a = vec![0.01, 0.02, -0.01, 0.03, -0.02];
        let b = vec![0.01, 0.02, -0.01, 0.03, -0.02];
        let corr = pearson(&a, &b).unwrap();
        assert!((corr - 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_correlation_perfect_negative() {
        let a = vec![0.01, 0.02, -0.01, 0.03, -0.02];
        let b = vec![-0.01, -0.02, 0.01, -0.03, 0.02];
        let corr = pearson(&a, &b).unwrap();
        assert!((corr + 1.0).abs() < 0.0001);
    }

    #[test]
    fn test_correlation_insufficient_data() {
        assert!(pearson(&[0.01], &[0.01]).is_none());
        assert!(pearson(&[0.01, 0.02], &[0.01]).is_none());
    }

    #[test]
    fn test_correlation_zero_variance_is_undefined() {
        let flat = vec![0.0; 5];
        let moving = vec![0.01, 0.02, -0.01, 0.03, -0.02];
        assert!(pearson(&flat, &moving).is_none());
        assert!(pearson(&[0.01; 5], &moving).is_none());
    }

    #[test]
    fn test_identical_prices_correlate_at_one() {
        let window = Window::new(5).unwrap();
        let r = returns(&prices());
        let corr = rolling_correlation(&r, &r, window);

        assert_eq!(corr.len(), r.len());
        // Return 0 is undefined so the first full window ends at index `window`.
        for (index, value) in corr.iter().enumerate() {
            if index < window.get() {
                assert!(value.is_none(), "index {index} should be undefined");
            } else {
                assert!((value.unwrap() - 1.0).abs() < 1e-9, "index {index}: {value:?}");
            }
        }
    }

    #[test]
    fn test_negated_returns_correlate_at_minus_one() {
        let window = Window::new(4).unwrap();
        let a: Vec<Option<f64>> = returns(&prices()).into_iter().skip(1).collect();
        let b: Vec<Option<f64>> = a.iter().map(|r| r.map(|r| -r)).collect();

        let corr = rolling_correlation(&a, &b, window);
        for value in corr.iter().skip(window.get() - 1) {
            assert!((value.unwrap() + 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_undefined_before_window_and_defined_after() {
        let window = Window::new(3).unwrap();
        let a = defined(&[0.01, -0.02, 0.03, 0.01, -0.01, 0.02]);
        let b = defined(&[0.02, -0.01, 0.01, 0.03, -0.02, 0.00]);

        let corr = rolling_correlation(&a, &b, window);
        assert!(corr[..2].iter().all(Option::is_none));
        assert!(corr[2..].iter().all(Option::is_some));
    }

    #[test]
    fn test_fewer_than_window_observations_is_entirely_undefined() {
        let window = Window::new(10).unwrap();
        let r = returns(&defined(&[100.0, 101.0, 99.0, 102.0, 100.0]));
        let corr = rolling_correlation(&r, &r, window);
        assert_eq!(corr.len(), 5);
        assert!(corr.iter().all(Option::is_none));
    }

    #[test]
    fn test_undefined_value_inside_window_is_treated_as_missing() {
        let window = Window::new(3).unwrap();
        let a = vec![Some(0.01), Some(-0.02), None, Some(0.01), Some(-0.01), Some(0.02)];
        let b = defined(&[0.02, -0.01, 0.01, 0.03, -0.02, 0.00]);

        let corr = rolling_correlation(&a, &b, window);
        assert!(corr[2].is_none());
        assert!(corr[3].is_none());
        assert!(corr[4].is_none());
        assert!(corr[5].is_some());
    }

    #[test]
    fn test_mismatched_lengths_pair_from_latest() {
        let window = Window::new(3).unwrap();
        let a = defined(&[9.0, 0.01, -0.02, 0.03]);
        let b = defined(&[0.01, -0.02, 0.03]);

        let corr = rolling_correlation(&a, &b, window);
        assert_eq!(corr.len(), 3);
        assert!((corr[2].unwrap() - 1.0).abs() < 1e-9);
    }
}
