//! Runtime configuration
//!
//! Every setting comes from the environment. Secrets have no default; everything else falls back
//! to the defaults below when unset, and is rejected when set to something unparseable.
//!
//! | Variable                 | Default              |
//! |--------------------------|----------------------|
//! | `FINNHUB_API_KEY`        | required (collector) |
//! | `FINNHUB_BASE_URL`       | Finnhub v1 API       |
//! | `SYMBOLS`                | `AAPL,MSFT`          |
//! | `POLL_INTERVAL_SECS`     | `1`                  |
//! | `REQUEST_TIMEOUT_SECS`   | `60`                 |
//! | `ROLLING_WINDOW`         | `10`                 |
//! | `MIN_SAMPLES`            | `100`                |
//! | `LOOKBACK`               | see below            |
//! | `ZSCORE_THRESHOLD`       | `2.0`                |
//! | `EVALUATION_MODE`        | `continuous`         |
//! | `DATABASE_PATH`          | `market_data.db`     |
//! | `DASHBOARD_REFRESH_SECS` | `5` (`0` = once)     |
//!
//! An unset `LOOKBACK` is the larger of `MIN_SAMPLES` and `ROLLING_WINDOW + 1`. An explicit
//! `LOOKBACK` below `ROLLING_WINDOW + 1` is rejected.

use std::{path::PathBuf, str::FromStr, time::Duration};

use derive_more::Display;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    error::ConfigError,
    quote::{FinnhubConfig, DEFAULT_REQUEST_TIMEOUT},
    sample::SymbolPair,
    stats::{Window, DEFAULT_THRESHOLD},
};

pub const DEFAULT_SYMBOLS: &str = "AAPL,MSFT";
pub const DEFAULT_DATABASE_PATH: &str = "market_data.db";

/// Whether the poll loop keeps evaluating once it has enough samples.
#[derive(Debug, Display, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EvaluationMode {
    /// Evaluate on every cycle once ready, forever.
    #[default]
    #[display("continuous")]
    Continuous,
    /// Stop the loop after the first evaluation.
    #[display("one-shot")]
    OneShot,
}

impl FromStr for EvaluationMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "continuous" => Ok(Self::Continuous),
            "one-shot" | "oneshot" | "one_shot" => Ok(Self::OneShot),
            other => Err(ConfigError::invalid(
                "EVALUATION_MODE",
                other,
                "expected continuous or one-shot",
            )),
        }
    }
}

/// Poll loop and statistics configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct PollConfig {
    /// Symbols whose returns are correlated
    pub pair: SymbolPair,
    /// Delay between cycles
    pub poll_interval: Duration,
    /// Rolling correlation window
    pub window: Window,
    /// Samples required before the loop starts evaluating
    pub min_samples: usize,
    /// Samples kept in memory and evaluated per cycle
    pub lookback: usize,
    /// |z| above which the latest correlation is an anomaly
    pub threshold: f64,
    pub mode: EvaluationMode,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            pair: SymbolPair::parse(DEFAULT_SYMBOLS).expect("default symbols are valid"),
            poll_interval: Duration::from_secs(1),
            window: Window::default(),
            min_samples: 100,
            lookback: 100,
            threshold: DEFAULT_THRESHOLD,
            mode: EvaluationMode::Continuous,
        }
    }
}

impl PollConfig {
    pub fn new(pair: SymbolPair) -> Self {
        Self {
            pair,
            ..Default::default()
        }
    }

    /// Set poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Set rolling window
    pub fn with_window(mut self, window: Window) -> Self {
        self.window = window;
        self
    }

    /// Set minimum sample count before evaluation; raises lookback to match
    pub fn with_min_samples(mut self, min_samples: usize) -> Self {
        self.min_samples = min_samples;
        self.lookback = self.lookback.max(min_samples);
        self
    }

    /// Set in-memory lookback
    pub fn with_lookback(mut self, lookback: usize) -> Self {
        self.lookback = lookback;
        self
    }

    /// Set anomaly z-score threshold
    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    /// Set evaluation mode
    pub fn with_mode(mut self, mode: EvaluationMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval.is_zero() {
            return Err(ConfigError::invalid(
                "POLL_INTERVAL_SECS",
                self.poll_interval.as_secs_f64(),
                "must be positive",
            ));
        }
        if self.min_samples == 0 {
            return Err(ConfigError::invalid("MIN_SAMPLES", 0, "must be positive"));
        }
        let min_lookback = self.window.get() + 1;
        if self.lookback < min_lookback {
            return Err(ConfigError::invalid(
                "LOOKBACK",
                self.lookback,
                format!("must hold at least window + 1 = {min_lookback} samples"),
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::invalid(
                "ZSCORE_THRESHOLD",
                self.threshold,
                "must be a non-negative number",
            ));
        }
        Ok(())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let pair = SymbolPair::parse(
            &lookup("SYMBOLS").unwrap_or_else(|| DEFAULT_SYMBOLS.to_string()),
        )?;
        let window = Window::new(setting(lookup, "ROLLING_WINDOW", Window::default().get())?)?;
        let min_samples = setting(lookup, "MIN_SAMPLES", 100)?;

        let config = Self {
            pair,
            poll_interval: seconds(lookup, "POLL_INTERVAL_SECS", 1.0)?,
            window,
            min_samples,
            lookback: setting(lookup, "LOOKBACK", min_samples.max(window.get() + 1))?,
            threshold: setting(lookup, "ZSCORE_THRESHOLD", DEFAULT_THRESHOLD)?,
            mode: setting(lookup, "EVALUATION_MODE", EvaluationMode::Continuous)?,
        };
        config.validate()?;
        Ok(config)
    }
}

/// Configuration of the `corrwatch-collector` binary.
#[derive(Debug, Clone)]
pub struct CollectorConfig {
    pub poll: PollConfig,
    pub finnhub: FinnhubConfig,
    pub database_path: PathBuf,
}

impl CollectorConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = lookup("FINNHUB_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::Missing("FINNHUB_API_KEY".to_string()))?;

        let mut finnhub = FinnhubConfig::new(api_key.trim());
        if let Some(base_url) = lookup("FINNHUB_BASE_URL") {
            let mut url = Url::parse(&base_url).map_err(|error| {
                ConfigError::invalid("FINNHUB_BASE_URL", &base_url, error.to_string())
            })?;
            if !url.path().ends_with('/') {
                url.set_path(&format!("{}/", url.path()));
            }
            finnhub = finnhub.with_base_url(url);
        }
        let timeout = seconds(
            lookup,
            "REQUEST_TIMEOUT_SECS",
            DEFAULT_REQUEST_TIMEOUT.as_secs_f64(),
        )?;
        if timeout.is_zero() {
            return Err(ConfigError::invalid("REQUEST_TIMEOUT_SECS", 0, "must be positive"));
        }
        finnhub = finnhub.with_request_timeout(timeout);

        Ok(Self {
            poll: PollConfig::from_lookup(lookup)?,
            finnhub,
            database_path: database_path(lookup),
        })
    }
}

/// Configuration of the `corrwatch-dashboard` binary.
#[derive(Debug, Clone)]
pub struct DashboardConfig {
    pub poll: PollConfig,
    pub database_path: PathBuf,
    /// Delay between refreshes, `None` renders once and exits
    pub refresh: Option<Duration>,
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: &impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let refresh = seconds(lookup, "DASHBOARD_REFRESH_SECS", 5.0)?;

        Ok(Self {
            poll: PollConfig::from_lookup(lookup)?,
            database_path: database_path(lookup),
            refresh: (!refresh.is_zero()).then_some(refresh),
        })
    }
}

fn database_path(lookup: &impl Fn(&str) -> Option<String>) -> PathBuf {
    lookup("DATABASE_PATH")
        .filter(|path| !path.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_DATABASE_PATH.to_string())
        .into()
}

/// Parse a non-negative number of seconds.
fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default_secs: f64,
) -> Result<Duration, ConfigError> {
    let secs: f64 = setting(lookup, key, default_secs)?;
    Duration::try_from_secs_f64(secs)
        .map_err(|error| ConfigError::invalid(key, secs, error.to_string()))
}

/// Parse `key` if set, otherwise use `default`.
fn setting<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) if raw.trim().is_empty() => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|error: T::Err| ConfigError::invalid(key, &raw, error.to_string())),
    }
}
