//! Z-score anomaly detection on a rolling correlation series
//!
//! The latest defined correlation is scored against the mean and sample standard deviation of
//! every defined value in the same series. The baseline therefore includes the value being scored
//! and is dominated by early observations until the series grows.

use serde::{Deserialize, Serialize};

use super::series::CorrelationSeries;
use super::{is_degenerate, sample_moments};

/// Default |z| above which the latest correlation is flagged.
pub const DEFAULT_THRESHOLD: f64 = 2.0;

/// Outcome of scoring the latest correlation.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AnomalyVerdict {
    pub is_anomaly: bool,
    /// `None` when the series has fewer than two defined values or no spread.
    pub z_score: Option<f64>,
}

/// Score the latest defined value of `series` against all of its defined values.
pub fn detect(series: &[Option<f64>], threshold: f64) -> AnomalyVerdict {
    let values: Vec<f64> = series.iter().flatten().copied().collect();
    let Some(&latest) = values.last() else {
        return AnomalyVerdict::default();
    };
    let Some((mean, variance)) = sample_moments(&values) else {
        return AnomalyVerdict::default();
    };
    if is_degenerate(&values, variance) {
        return AnomalyVerdict::default();
    }

    let z = (latest - mean) / variance.sqrt();
    AnomalyVerdict {
        is_anomaly: z.abs() > threshold,
        z_score: Some(z),
    }
}

/// Anomaly detector with a fixed z-score threshold.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyDetector {
    threshold: f64,
}

impl AnomalyDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn detect(&self, series: &CorrelationSeries) -> AnomalyVerdict {
        detect(series.values(), self.threshold)
    }
}

impl Default for AnomalyDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stable_with(last: f64) -> Vec<Option<f64>> {
        let mut series: Vec<Option<f64>> = (0..20)
            .map(|i| Some(if i % 2 == 0 { 0.80 } else { 0.82 }))
            .collect();
        series.push(Some(last));
        series
    }

    #[test]
    fn test_extreme_latest_value_is_anomaly() {
        let verdict = detect(&stable_with(-0.5), DEFAULT_THRESHOLD);
        assert!(verdict.is_anomaly);
        assert!(verdict.z_score.unwrap().abs() > 2.0);
        assert!(verdict.z_score.unwrap() < 0.0);
    }

    #[test]
    fn test_ordinary_latest_value_is_not_anomaly() {
        let verdict = detect(&stable_with(0.81), DEFAULT_THRESHOLD);
        assert!(!verdict.is_anomaly);
        assert!(verdict.z_score.unwrap().abs() < 1.0);
    }

    #[test]
    fn test_constant_series_is_never_anomaly() {
        let series = vec![Some(0.42); 50];
        for threshold in [0.0, 1e-12, 2.0, 100.0] {
            let verdict = detect(&series, threshold);
            assert!(!verdict.is_anomaly, "threshold {threshold}");
            assert_eq!(verdict.z_score, None);
        }
    }

    #[test]
    fn test_insufficient_defined_values() {
        assert_eq!(detect(&[], 2.0), AnomalyVerdict::default());
        assert_eq!(detect(&[None, None, None], 2.0), AnomalyVerdict::default());
        assert_eq!(detect(&[None, Some(0.9), None], 2.0), AnomalyVerdict::default());
    }

    #[test]
    fn test_latest_defined_value_is_scored_when_tail_is_undefined() {
        let mut series = stable_with(-0.5);
        series.push(None);
        series.push(None);
        let verdict = detect(&series, DEFAULT_THRESHOLD);
        assert!(verdict.is_anomaly);
    }

    #[test]
    fn test_detect_is_idempotent() {
        let series = stable_with(0.1);
        let first = detect(&series, DEFAULT_THRESHOLD);
        let second = detect(&series, DEFAULT_THRESHOLD);
        assert_eq!(first, second);
    }

    #[test]
    fn test_early_values_dominate_the_baseline() {
        // A regime shift looks anomalous at first and fades as it fills the history.
        let mut series: Vec<Option<f64>> = (0..30)
            .map(|i| Some(0.9 + if i % 2 == 0 { 0.01 } else { -0.01 }))
            .collect();
        series.push(Some(-0.2));
        assert!(detect(&series, DEFAULT_THRESHOLD).is_anomaly);

        series.extend((0..30).map(|_| Some(-0.2)));
        assert!(!detect(&series, DEFAULT_THRESHOLD).is_anomaly);
    }

    #[test]
    fn test_detector_default_threshold() {
        let detector = AnomalyDetector::default();
        assert_eq!(detector.threshold(), DEFAULT_THRESHOLD);
    }
}
