//! Timestamped price samples for a symbol pair
//!
//! A [`Sample`] holds one observation of both tracked symbols. Samples are immutable once
//! recorded and are kept in memory only inside a bounded [`SampleWindow`].

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use smol_str::SmolStr;

use crate::error::ConfigError;

/// Ticker symbol, eg/ "AAPL".
///
/// Restricted to ASCII alphanumerics plus `.`, `-`, `_` and `:` so it can double as a storage
/// column name.
#[derive(Debug, Display, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Symbol(SmolStr);

impl Symbol {
    pub fn new(symbol: &str) -> Result<Self, ConfigError> {
        let symbol = symbol.trim();
        if symbol.is_empty() {
            return Err(ConfigError::invalid("symbol", symbol, "empty symbol"));
        }
        if !symbol
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_' | ':'))
        {
            return Err(ConfigError::invalid(
                "symbol",
                symbol,
                "only ASCII alphanumerics and . - _ : are allowed",
            ));
        }
        Ok(Self(SmolStr::new(symbol.to_ascii_uppercase())))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::str::FromStr for Symbol {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// The two symbols whose returns are correlated.
#[derive(Debug, Display, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[display("{a}/{b}")]
pub struct SymbolPair {
    pub a: Symbol,
    pub b: Symbol,
}

impl SymbolPair {
    pub fn new(a: Symbol, b: Symbol) -> Result<Self, ConfigError> {
        if a == b {
            return Err(ConfigError::invalid(
                "symbols",
                format!("{a},{b}"),
                "pair needs two distinct symbols",
            ));
        }
        Ok(Self { a, b })
    }

    /// Parse a comma separated pair, eg/ "AAPL,MSFT".
    pub fn parse(input: &str) -> Result<Self, ConfigError> {
        let parts: Vec<&str> = input.split(',').collect();
        match parts.as_slice() {
            [a, b] => Self::new(a.parse()?, b.parse()?),
            _ => Err(ConfigError::invalid(
                "symbols",
                input,
                "expected exactly two comma separated symbols",
            )),
        }
    }

    pub fn symbols(&self) -> [&Symbol; 2] {
        [&self.a, &self.b]
    }
}

/// One timestamped observation of prices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<Symbol, f64>,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, values: BTreeMap<Symbol, f64>) -> Self {
        Self { timestamp, values }
    }

    /// Sample carrying both prices of a pair.
    pub fn from_pair(
        timestamp: DateTime<Utc>,
        pair: &SymbolPair,
        price_a: f64,
        price_b: f64,
    ) -> Self {
        let values = BTreeMap::from([(pair.a.clone(), price_a), (pair.b.clone(), price_b)]);
        Self { timestamp, values }
    }

    /// Price recorded for `symbol`, `None` if the sample has no value for it.
    pub fn price(&self, symbol: &Symbol) -> Option<f64> {
        self.values.get(symbol).copied()
    }

    /// True when every symbol of the pair has a price.
    pub fn is_complete(&self, pair: &SymbolPair) -> bool {
        pair.symbols().iter().all(|symbol| self.values.contains_key(*symbol))
    }
}

/// Error returned when a sample would break timestamp ordering.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("sample at {attempted} does not follow latest sample at {latest}")]
pub struct OutOfOrder {
    pub latest: DateTime<Utc>,
    pub attempted: DateTime<Utc>,
}

/// Ring buffer holding the N most recent samples in ascending timestamp order.
#[derive(Debug, Clone)]
pub struct SampleWindow {
    samples: VecDeque<Sample>,
    max_size: usize,
}

impl SampleWindow {
    pub fn new(max_size: usize) -> Self {
        let max_size = max_size.max(1);
        Self {
            samples: VecDeque::with_capacity(max_size),
            max_size,
        }
    }

    /// Seed from a snapshot, eg/ the output of `read_recent`. The snapshot is sorted first and
    /// samples that repeat a timestamp are dropped.
    pub fn from_snapshot(max_size: usize, mut snapshot: Vec<Sample>) -> Self {
        snapshot.sort_by_key(|sample| sample.timestamp);
        let mut window = Self::new(max_size);
        for sample in snapshot {
            let _ = window.push(sample);
        }
        window
    }

    /// Append a sample, evicting the oldest when full.
    pub fn push(&mut self, sample: Sample) -> Result<(), OutOfOrder> {
        if let Some(latest) = self.latest_timestamp() {
            if sample.timestamp <= latest {
                return Err(OutOfOrder {
                    latest,
                    attempted: sample.timestamp,
                });
            }
        }

        if self.samples.len() >= self.max_size {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.max_size
    }

    pub fn latest(&self) -> Option<&Sample> {
        self.samples.back()
    }

    pub fn latest_timestamp(&self) -> Option<DateTime<Utc>> {
        self.samples.back().map(|sample| sample.timestamp)
    }

    /// Last N samples, oldest first.
    pub fn last_n(&self, n: usize) -> Vec<&Sample> {
        let start = self.samples.len().saturating_sub(n);
        self.samples.range(start..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Sample> {
        self.samples.iter()
    }
}
