//! Samples → returns → rolling correlation → anomaly verdict

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::anomaly::{AnomalyDetector, AnomalyVerdict};
use super::correlation::{RollingCorrelator, Window};
use super::returns::return_series;
use super::series::{CorrelationSeries, Series};
use crate::sample::{Sample, SymbolPair};

/// Computed signals for one window of samples.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evaluation {
    pub pair: SymbolPair,
    pub window: Window,
    pub sample_count: usize,
    /// Timestamp of the newest sample evaluated.
    pub as_of: Option<DateTime<Utc>>,
    /// Latest prices of `pair.a` and `pair.b` (None = missing).
    pub latest_prices: (Option<f64>, Option<f64>),
    /// Latest defined rolling correlation (None = insufficient data).
    pub latest_correlation: Option<f64>,
    pub verdict: AnomalyVerdict,
    pub correlation: CorrelationSeries,
}

impl Evaluation {
    /// True when at least one rolling correlation value could be computed.
    pub fn has_signal(&self) -> bool {
        self.latest_correlation.is_some()
    }
}

/// Stateless evaluation of the full statistics chain.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Pipeline {
    correlator: RollingCorrelator,
    detector: AnomalyDetector,
}

impl Pipeline {
    pub fn new(window: Window, threshold: f64) -> Self {
        Self {
            correlator: RollingCorrelator::new(window),
            detector: AnomalyDetector::new(threshold),
        }
    }

    pub fn window(&self) -> Window {
        self.correlator.window()
    }

    pub fn threshold(&self) -> f64 {
        self.detector.threshold()
    }

    /// Minimum number of samples before any correlation can be defined.
    ///
    /// The first return is undefined, so one sample more than the window is needed.
    pub fn min_samples_for_signal(&self) -> usize {
        self.window().get() + 1
    }

    /// Evaluate `samples`, which must be in ascending timestamp order.
    pub fn evaluate<'a>(
        &self,
        pair: &SymbolPair,
        samples: impl IntoIterator<Item = &'a Sample>,
    ) -> Evaluation {
        let samples: Vec<&Sample> = samples.into_iter().collect();

        let returns_a = return_series(&Series::project(samples.iter().copied(), &pair.a));
        let returns_b = return_series(&Series::project(samples.iter().copied(), &pair.b));
        let correlation = self.correlator.correlate(&returns_a, &returns_b);
        let verdict = self.detector.detect(&correlation);
        let latest = samples.last();

        Evaluation {
            pair: pair.clone(),
            window: self.window(),
            sample_count: samples.len(),
            as_of: latest.map(|sample| sample.timestamp),
            latest_prices: (
                latest.and_then(|sample| sample.price(&pair.a)),
                latest.and_then(|sample| sample.price(&pair.b)),
            ),
            latest_correlation: correlation.latest_defined().map(|(_, value)| value),
            verdict,
            correlation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn pair() -> SymbolPair {
        SymbolPair::parse("AAPL,MSFT").unwrap()
    }

    fn samples(prices_a: &[f64], prices_b: &[f64]) -> Vec<Sample> {
        let start = Utc.timestamp_opt(1_700_000_000, 0).unwrap();
        prices_a
            .iter()
            .zip(prices_b)
            .enumerate()
            .map(|(i, (a, b))| {
                Sample::from_pair(start + Duration::seconds(i as i64), &pair(), *a, *b)
            })
            .collect()
    }

    const PRICES: [f64; 12] = [
        100.0, 102.0, 101.0, 105.0, 103.0, 104.0, 108.0, 107.0, 103.0, 106.0, 109.0, 104.0,
    ];

    #[test]
    fn test_identical_series_evaluate_to_unit_correlation() {
        let pipeline = Pipeline::new(Window::new(5).unwrap(), 2.0);
        let samples = samples(&PRICES, &PRICES);

        let evaluation = pipeline.evaluate(&pair(), &samples);

        assert_eq!(evaluation.sample_count, 12);
        assert_eq!(evaluation.correlation.len(), 12);
        assert_eq!(evaluation.correlation.defined_count(), 12 - 5);
        assert!((evaluation.latest_correlation.unwrap() - 1.0).abs() < 1e-9);
        assert!(!evaluation.verdict.is_anomaly);
        assert_eq!(evaluation.latest_prices, (Some(104.0), Some(104.0)));
        assert_eq!(evaluation.as_of, samples.last().map(|s| s.timestamp));
    }

    #[test]
    fn test_fewer_samples_than_window_has_no_signal() {
        let pipeline = Pipeline::new(Window::new(10).unwrap(), 2.0);
        let samples = samples(&PRICES[..8], &PRICES[..8]);

        let evaluation = pipeline.evaluate(&pair(), &samples);

        assert!(!evaluation.has_signal());
        assert_eq!(evaluation.correlation.defined_count(), 0);
        assert!(!evaluation.verdict.is_anomaly);
        assert_eq!(evaluation.verdict.z_score, None);
    }

    #[test]
    fn test_min_samples_for_signal() {
        let pipeline = Pipeline::new(Window::new(10).unwrap(), 2.0);
        assert_eq!(pipeline.min_samples_for_signal(), 11);

        let samples = samples(&PRICES[..11], &PRICES[..11]);
        assert!(!pipeline.evaluate(&pair(), &samples[..10]).has_signal());
        assert!(pipeline.evaluate(&pair(), &samples).has_signal());
    }

    #[test]
    fn test_empty_window() {
        let evaluation = Pipeline::default().evaluate(&pair(), &Vec::<Sample>::new());
        assert_eq!(evaluation.sample_count, 0);
        assert_eq!(evaluation.as_of, None);
        assert_eq!(evaluation.latest_prices, (None, None));
        assert!(!evaluation.has_signal());
    }
}
