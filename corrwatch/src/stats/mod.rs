//! Streaming statistics for a symbol pair
//!
//! Provides:
//! - Percentage returns from raw prices
//! - Rolling-window Pearson correlation between two return series
//! - Z-score anomaly detection on the rolling correlation
//! - [`Pipeline`] tying the three together over a window of samples
//!
//! Undefined values ("insufficient data") are `None` at every stage and are never coerced to zero.

mod anomaly;
mod correlation;
mod pipeline;
mod returns;
mod series;

pub use anomaly::{detect, AnomalyDetector, AnomalyVerdict, DEFAULT_THRESHOLD};
pub use correlation::{pearson, rolling_correlation, RollingCorrelator, Window};
pub use pipeline::{Evaluation, Pipeline};
pub use returns::{return_series, returns};
pub use series::{CorrelationSeries, PriceSeries, ReturnSeries, Series};

/// Mean and sample variance (n-1 denominator), `None` below two observations.
fn sample_moments(values: &[f64]) -> Option<(f64, f64)> {
    if values.len() < 2 {
        return None;
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some((mean, variance))
}

/// Variance no larger than the rounding noise of summing `values` counts as zero.
fn is_degenerate(values: &[f64], variance: f64) -> bool {
    let scale = values.iter().fold(0.0_f64, |max, x| max.max(x.abs()));
    let noise = 2.0 * values.len() as f64 * f64::EPSILON * scale;
    !(variance > noise * noise)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_moments() {
        let (mean, variance) = sample_moments(&[1.0, 2.0, 3.0, 4.0]).unwrap();
        assert!((mean - 2.5).abs() < 1e-12);
        assert!((variance - 5.0 / 3.0).abs() < 1e-12);
        assert!(sample_moments(&[1.0]).is_none());
    }

    #[test]
    fn test_is_degenerate() {
        let constant = vec![0.1; 30];
        let (_, variance) = sample_moments(&constant).unwrap();
        assert!(is_degenerate(&constant, variance));

        assert!(is_degenerate(&[0.0, 0.0, 0.0], 0.0));
        assert!(is_degenerate(&[1.0, 2.0], f64::NAN));

        let small_moves = vec![0.0001, 0.0002, 0.0001, 0.00015];
        let (_, variance) = sample_moments(&small_moves).unwrap();
        assert!(!is_degenerate(&small_moves, variance));
    }
}
