//! Text readout of the stored samples
//!
//! Reads the recent window from a [`SampleStore`] independently of the poll loop and renders either
//! the latest signals or an explicit no-data / insufficient-data state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::{
    config::PollConfig,
    error::PersistenceError,
    sample::SymbolPair,
    stats::{Evaluation, Pipeline},
    store::SampleStore,
};

/// Number of trailing correlation values listed under the headline.
const RECENT_CORRELATIONS: usize = 5;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum DashboardView {
    /// Store is empty.
    NoData { pair: SymbolPair },
    /// Samples exist but no rolling correlation is defined yet.
    InsufficientData {
        pair: SymbolPair,
        as_of: Option<DateTime<Utc>>,
        latest_prices: (Option<f64>, Option<f64>),
        sample_count: usize,
        required: usize,
    },
    Ready(Box<Evaluation>),
}

impl DashboardView {
    pub fn is_ready(&self) -> bool {
        matches!(self, Self::Ready(_))
    }
}

impl fmt::Display for DashboardView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoData { pair } => write!(f, "{pair}: no data yet"),
            Self::InsufficientData {
                pair,
                as_of,
                latest_prices,
                sample_count,
                required,
            } => {
                render_prices(f, pair, *as_of, *latest_prices)?;
                write!(
                    f,
                    "  insufficient data for rolling correlation \
                     ({sample_count}/{required} samples)"
                )
            }
            Self::Ready(evaluation) => render_evaluation(f, evaluation),
        }
    }
}

fn render_prices(
    f: &mut fmt::Formatter<'_>,
    pair: &SymbolPair,
    as_of: Option<DateTime<Utc>>,
    (price_a, price_b): (Option<f64>, Option<f64>),
) -> fmt::Result {
    let price = |price: Option<f64>| price.map_or_else(|| "-".to_string(), |p| format!("{p:.2}"));

    match as_of {
        Some(as_of) => writeln!(f, "{pair} as of {}", as_of.format("%Y-%m-%d %H:%M:%S UTC"))?,
        None => writeln!(f, "{pair}")?,
    }
    writeln!(f, "  {:<8} {:>12}", pair.a.as_str(), price(price_a))?;
    writeln!(f, "  {:<8} {:>12}", pair.b.as_str(), price(price_b))
}

fn render_evaluation(f: &mut fmt::Formatter<'_>, evaluation: &Evaluation) -> fmt::Result {
    render_prices(
        f,
        &evaluation.pair,
        evaluation.as_of,
        evaluation.latest_prices,
    )?;

    if let Some(correlation) = evaluation.latest_correlation {
        writeln!(
            f,
            "  correlation ({}-sample window): {correlation:+.4}",
            evaluation.window.get()
        )?;
    }

    let defined: Vec<f64> = evaluation.correlation.defined().collect();
    let recent: Vec<String> = defined[defined.len().saturating_sub(RECENT_CORRELATIONS)..]
        .iter()
        .map(|value| format!("{value:+.3}"))
        .collect();
    writeln!(f, "  recent: [{}]", recent.join(", "))?;

    match evaluation.verdict.z_score {
        Some(z_score) if evaluation.verdict.is_anomaly => {
            write!(f, "  ANOMALY: z-score {z_score:+.2}")
        }
        Some(z_score) => write!(f, "  normal: z-score {z_score:+.2}"),
        None => write!(f, "  normal: z-score undefined"),
    }
}

/// Builds [`DashboardView`]s from a store.
#[derive(Debug)]
pub struct Dashboard<S> {
    store: S,
    pair: SymbolPair,
    pipeline: Pipeline,
    lookback: usize,
}

impl<S> Dashboard<S>
where
    S: SampleStore,
{
    pub fn new(store: S, config: &PollConfig) -> Self {
        Self {
            store,
            pair: config.pair.clone(),
            pipeline: Pipeline::new(config.window, config.threshold),
            lookback: config.lookback,
        }
    }

    /// Read the recent window and evaluate it. An empty store is a view, not an error.
    pub fn view(&self) -> Result<DashboardView, PersistenceError> {
        let samples = self.store.read_recent(self.lookback)?;
        if samples.is_empty() {
            return Ok(DashboardView::NoData {
                pair: self.pair.clone(),
            });
        }

        let evaluation = self.pipeline.evaluate(&self.pair, &samples);
        if evaluation.has_signal() {
            Ok(DashboardView::Ready(Box::new(evaluation)))
        } else {
            Ok(DashboardView::InsufficientData {
                pair: self.pair.clone(),
                as_of: evaluation.as_of,
                latest_prices: evaluation.latest_prices,
                sample_count: samples.len(),
                required: self.pipeline.min_samples_for_signal(),
            })
        }
    }
}
