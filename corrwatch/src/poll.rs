//! Fetch → append → evaluate loop
//!
//! A [`PollLoop`] starts in [`PollState::Collecting`] and moves to [`PollState::Ready`] once the
//! store holds `min_samples` samples. Every cycle fetches both symbols concurrently and only
//! appends a [`Sample`] when both quotes arrived. Failures are logged and end the cycle, they
//! never end the loop.

use std::{future::Future, sync::Arc};

use chrono::{DateTime, SubsecRound, Utc};
use serde::Serialize;
use tokio::{sync::watch, time::MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{
    config::{EvaluationMode, PollConfig},
    error::{CorrwatchError, FetchError, PersistenceError},
    quote::{Quote, QuoteSource},
    sample::{OutOfOrder, Sample, SampleWindow},
    stats::{Evaluation, Pipeline},
    store::SampleStore,
};

/// Source of sample timestamps.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// Wall clock truncated to microseconds, the precision the store keeps.
pub fn system_clock() -> Clock {
    Arc::new(|| Utc::now().trunc_subsecs(6))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PollState {
    Collecting { collected: usize, required: usize },
    Ready,
}

/// Result of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Sample recorded, not enough samples to evaluate yet.
    Collected { collected: usize, required: usize },
    /// Sample recorded and the pipeline evaluated.
    Evaluated(Box<Evaluation>),
    /// At least one quote failed, nothing was recorded.
    FetchFailed(FetchError),
    /// Quotes arrived but the store rejected the sample.
    PersistFailed(PersistenceError),
    /// The clock went backwards relative to the newest recorded sample.
    OutOfOrder(OutOfOrder),
}

impl CycleOutcome {
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::FetchFailed(_) | Self::PersistFailed(_) | Self::OutOfOrder(_)
        )
    }
}

/// Latest loop status, published after every cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PollStatus {
    pub cycle: u64,
    pub sample_count: usize,
    pub state: PollState,
    pub consecutive_failures: u32,
    pub last_evaluation: Option<Evaluation>,
}

pub struct PollLoop<Q, S> {
    config: PollConfig,
    source: Q,
    store: S,
    pipeline: Pipeline,
    window: SampleWindow,
    sample_count: usize,
    clock: Clock,
    status_tx: watch::Sender<PollStatus>,
}

impl<Q, S> std::fmt::Debug for PollLoop<Q, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PollLoop")
            .field("config", &self.config)
            .field("sample_count", &self.sample_count)
            .field("window", &self.window.len())
            .finish_non_exhaustive()
    }
}

impl<Q, S> PollLoop<Q, S>
where
    Q: QuoteSource,
    S: SampleStore,
{
    /// Validate `config`, initialise the store and resume from the samples it already holds.
    pub fn new(config: PollConfig, source: Q, store: S) -> Result<Self, CorrwatchError> {
        config.validate()?;
        store.ensure_schema()?;

        let sample_count = store.len()?;
        let window =
            SampleWindow::from_snapshot(config.lookback, store.read_recent(config.lookback)?);
        if sample_count > 0 {
            info!(
                pair = %config.pair,
                sample_count,
                since = ?window.iter().next().map(|sample| sample.timestamp),
                "resuming from stored samples"
            );
        }

        let pipeline = Pipeline::new(config.window, config.threshold);
        let (status_tx, _) = watch::channel(PollStatus {
            cycle: 0,
            sample_count,
            state: state_for(sample_count, config.min_samples),
            consecutive_failures: 0,
            last_evaluation: None,
        });

        Ok(Self {
            config,
            source,
            store,
            pipeline,
            window,
            sample_count,
            clock: system_clock(),
            status_tx,
        })
    }

    /// Replace the timestamp source.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PollConfig {
        &self.config
    }

    pub fn state(&self) -> PollState {
        state_for(self.sample_count, self.config.min_samples)
    }

    pub fn sample_count(&self) -> usize {
        self.sample_count
    }

    /// In-memory trailing window the pipeline evaluates.
    pub fn window(&self) -> &SampleWindow {
        &self.window
    }

    pub fn subscribe(&self) -> watch::Receiver<PollStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> PollStatus {
        self.status_tx.borrow().clone()
    }

    /// Run one full cycle.
    pub async fn poll_once(&mut self) -> CycleOutcome {
        let fetched = self.fetch_pair().await;
        self.record(fetched)
    }

    /// Run cycles on the configured interval until `shutdown` resolves, or until the first
    /// evaluation in [`EvaluationMode::OneShot`]. Returns the final status.
    ///
    /// Shutdown is honoured between cycles and while quotes are in flight; an append that has
    /// started always completes.
    pub async fn run<F>(mut self, shutdown: F) -> PollStatus
    where
        F: Future<Output = ()>,
    {
        let mut ticker = tokio::time::interval(self.config.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        futures::pin_mut!(shutdown);

        info!(
            pair = %self.config.pair,
            interval = ?self.config.poll_interval,
            window = self.config.window.get(),
            min_samples = self.config.min_samples,
            mode = %self.config.mode,
            "poll loop started"
        );

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {}
            }

            let fetched = tokio::select! {
                _ = &mut shutdown => break,
                fetched = self.fetch_pair() => fetched,
            };

            let outcome = self.record(fetched);
            if self.config.mode == EvaluationMode::OneShot
                && matches!(outcome, CycleOutcome::Evaluated(_))
            {
                info!("one-shot evaluation complete");
                break;
            }
        }

        let status = self.status();
        info!(
            cycles = status.cycle,
            sample_count = status.sample_count,
            "poll loop stopped"
        );
        status
    }

    /// Fetch both quotes concurrently; either both arrive or the cycle fails.
    async fn fetch_pair(&self) -> Result<(Quote, Quote), FetchError> {
        let [a, b] = self.config.pair.symbols();
        tokio::try_join!(self.source.fetch_quote(a), self.source.fetch_quote(b))
    }

    fn record(&mut self, fetched: Result<(Quote, Quote), FetchError>) -> CycleOutcome {
        let outcome = match fetched {
            Ok((quote_a, quote_b)) => self.append(quote_a, quote_b),
            Err(error) => {
                warn!(
                    pair = %self.config.pair,
                    transient = error.is_transient(),
                    %error,
                    "quote fetch failed, skipping cycle"
                );
                CycleOutcome::FetchFailed(error)
            }
        };
        self.publish(&outcome);
        outcome
    }

    fn append(&mut self, quote_a: Quote, quote_b: Quote) -> CycleOutcome {
        let timestamp = (self.clock)();
        if let Some(latest) = self.window.latest_timestamp() {
            if timestamp <= latest {
                let error = OutOfOrder {
                    latest,
                    attempted: timestamp,
                };
                error!(%error, "clock did not advance, sample dropped");
                return CycleOutcome::OutOfOrder(error);
            }
        }

        let sample = Sample::from_pair(
            timestamp,
            &self.config.pair,
            quote_a.current_price,
            quote_b.current_price,
        );

        if let Err(error) = self.store.append(&sample) {
            error!(
                pair = %self.config.pair,
                transient = error.is_transient(),
                %error,
                "failed to persist sample"
            );
            return CycleOutcome::PersistFailed(error);
        }

        self.sample_count += 1;
        debug!(
            %timestamp,
            a = quote_a.current_price,
            b = quote_b.current_price,
            sample_count = self.sample_count,
            "sample recorded"
        );
        if let Err(error) = self.window.push(sample) {
            // Unreachable while the timestamp check above holds
            warn!(%error, "window rejected recorded sample");
        }

        match self.state() {
            PollState::Collecting {
                collected,
                required,
            } => CycleOutcome::Collected {
                collected,
                required,
            },
            PollState::Ready => {
                let evaluation = self.pipeline.evaluate(&self.config.pair, self.window.iter());
                log_evaluation(&evaluation, self.config.threshold);
                CycleOutcome::Evaluated(Box::new(evaluation))
            }
        }
    }

    fn publish(&self, outcome: &CycleOutcome) {
        let state = self.state();
        let sample_count = self.sample_count;

        self.status_tx.send_modify(|status| {
            status.cycle += 1;
            status.sample_count = sample_count;
            status.state = state;
            if outcome.is_failure() {
                status.consecutive_failures += 1;
            } else {
                status.consecutive_failures = 0;
            }
            if let CycleOutcome::Evaluated(evaluation) = outcome {
                status.last_evaluation = Some((**evaluation).clone());
            }
        });
    }
}

fn state_for(sample_count: usize, min_samples: usize) -> PollState {
    if sample_count >= min_samples {
        PollState::Ready
    } else {
        PollState::Collecting {
            collected: sample_count,
            required: min_samples,
        }
    }
}

fn log_evaluation(evaluation: &Evaluation, threshold: f64) {
    let Some(correlation) = evaluation.latest_correlation else {
        info!(
            pair = %evaluation.pair,
            sample_count = evaluation.sample_count,
            "insufficient data for rolling correlation"
        );
        return;
    };

    if evaluation.verdict.is_anomaly {
        warn!(
            pair = %evaluation.pair,
            correlation,
            z_score = evaluation.verdict.z_score,
            threshold,
            "correlation anomaly detected"
        );
    } else {
        info!(
            pair = %evaluation.pair,
            correlation,
            z_score = evaluation.verdict.z_score,
            "correlation normal"
        );
    }
}
