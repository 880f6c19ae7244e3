//! Timestamp-aligned series with explicit missing values

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::sample::{Sample, Symbol};

/// Ordered `(timestamp, value)` pairs where `None` marks an undefined value.
///
/// Undefined values are never dropped, so series projected from the same samples share index
/// positions.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Series {
    timestamps: Vec<DateTime<Utc>>,
    values: Vec<Option<f64>>,
}

/// Raw prices of one symbol.
pub type PriceSeries = Series;

/// Percentage change of a [`PriceSeries`], same length, first element undefined.
pub type ReturnSeries = Series;

/// Rolling correlation of two [`ReturnSeries`].
pub type CorrelationSeries = Series;

impl Series {
    /// Pairs timestamps with values. Extra entries on the longer side are dropped from the front
    /// so the most recent observations stay paired.
    pub fn new(mut timestamps: Vec<DateTime<Utc>>, mut values: Vec<Option<f64>>) -> Self {
        let len = timestamps.len().min(values.len());
        timestamps.drain(..timestamps.len() - len);
        values.drain(..values.len() - len);
        Self { timestamps, values }
    }

    /// Price series of `symbol`, one entry per sample.
    pub fn project<'a>(samples: impl IntoIterator<Item = &'a Sample>, symbol: &Symbol) -> Self {
        let (timestamps, values) = samples
            .into_iter()
            .map(|sample| (sample.timestamp, sample.price(symbol)))
            .unzip();
        Self { timestamps, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn values(&self) -> &[Option<f64>] {
        &self.values
    }

    pub fn get(&self, index: usize) -> Option<(DateTime<Utc>, Option<f64>)> {
        Some((*self.timestamps.get(index)?, *self.values.get(index)?))
    }

    /// Iterator over defined values only.
    pub fn defined(&self) -> impl Iterator<Item = f64> + '_ {
        self.values.iter().flatten().copied()
    }

    pub fn defined_count(&self) -> usize {
        self.values.iter().filter(|value| value.is_some()).count()
    }

    /// Most recent defined value and its timestamp.
    pub fn latest_defined(&self) -> Option<(DateTime<Utc>, f64)> {
        self.timestamps
            .iter()
            .zip(&self.values)
            .rev()
            .find_map(|(timestamp, value)| value.map(|value| (*timestamp, value)))
    }
}
