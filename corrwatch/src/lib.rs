/// Corrwatch - Pair Correlation Monitor
///
/// Polls current prices for two symbols on a fixed cadence, records each pair of prices as a
/// timestamped sample, and flags when the rolling correlation of their returns drifts unusually
/// far from its own history.
///
/// The library is shared by two binaries:
/// - corrwatch-collector: runs the poll loop against the Finnhub quote API
/// - corrwatch-dashboard: periodic text readout of the stored samples
///
/// Statistics flow: samples → percentage returns → rolling Pearson correlation → z-score
/// verdict. Undefined values (no previous price, too few observations, zero variance) are
/// carried as `None` all the way through and are never coerced to zero.
pub mod config;
pub mod dashboard;
pub mod error;
pub mod poll;
pub mod quote;
pub mod sample;
pub mod stats;
pub mod store;

// Re-export commonly used types for convenience
pub use config::{CollectorConfig, DashboardConfig, EvaluationMode, PollConfig};
pub use dashboard::{Dashboard, DashboardView};
pub use error::{ConfigError, CorrwatchError, FetchError, PersistenceError};
pub use poll::{CycleOutcome, PollLoop, PollState, PollStatus};
pub use quote::{FinnhubClient, FinnhubConfig, Quote, QuoteSource};
pub use sample::{Sample, SampleWindow, Symbol, SymbolPair};
pub use stats::{AnomalyDetector, AnomalyVerdict, Evaluation, Pipeline, RollingCorrelator, Window};
pub use store::{InMemorySampleStore, SampleStore, SqliteSampleStore};
