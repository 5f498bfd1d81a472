//! Decision Loop
//!
//! Timer-driven orchestrator: once per interval it pulls features for every
//! configured trading pair, evaluates each snapshot and commits the
//! resulting signals to the shared buffer.
//!
//! Ticks from the timer and from manual triggers may overlap. Evaluation
//! inside a tick runs concurrently, but commits are serialized by tick id:
//! tick `n` only pushes after tick `n - 1` has committed, and pushes its own
//! signals in configured-pair order. A tick that fails, panics or is
//! cancelled still gives up its turn, so later ticks are never held back.

use futures_util::future::join_all;
use parking_lot::Mutex;
use signal_core::{Signal, Symbol};
use signal_ports::FeatureProvider;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use super::evaluator::RuleEvaluator;
use crate::domain::{LoopState, PushOutcome, SignalBuffer, TickReport, TickSource};

/// Default tick interval
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone)]
pub struct DecisionLoopConfig {
    /// Pairs fetched and evaluated on every tick, in commit order
    pub trading_pairs: Vec<Symbol>,
    /// Time between timer ticks; the first tick fires one interval after start
    pub interval: Duration,
}

impl Default for DecisionLoopConfig {
    fn default() -> Self {
        Self {
            trading_pairs: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            interval: DEFAULT_UPDATE_INTERVAL,
        }
    }
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("decision loop cannot start: already {0}")]
    CannotStart(LoopState),
}

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerError {
    #[error("decision loop is {0}, not running")]
    NotRunning(LoopState),
}

struct LoopInner {
    config: DecisionLoopConfig,
    provider: Arc<dyn FeatureProvider>,
    evaluator: RuleEvaluator,
    buffer: Arc<SignalBuffer>,
    state: AtomicU8,
    last_tick: AtomicU64,
    committed: watch::Sender<CommitOrder>,
}

/// Owns the pipeline state: buffer, lifecycle and the timer task
pub struct DecisionLoop {
    inner: Arc<LoopInner>,
    timer: Mutex<Option<JoinHandle<()>>>,
}

impl DecisionLoop {
    /// A zero interval falls back to `DEFAULT_UPDATE_INTERVAL`.
    pub fn new(
        mut config: DecisionLoopConfig,
        provider: Arc<dyn FeatureProvider>,
        evaluator: RuleEvaluator,
        buffer: Arc<SignalBuffer>,
    ) -> Self {
        if config.interval.is_zero() {
            tracing::warn!(
                default_secs = DEFAULT_UPDATE_INTERVAL.as_secs(),
                "Zero tick interval, using default"
            );
            config.interval = DEFAULT_UPDATE_INTERVAL;
        }

        let (committed, _) = watch::channel(CommitOrder::default());
        Self {
            inner: Arc::new(LoopInner {
                config,
                provider,
                evaluator,
                buffer,
                state: AtomicU8::new(LoopState::IDLE),
                last_tick: AtomicU64::new(0),
                committed,
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn state(&self) -> LoopState {
        self.inner.state()
    }

    pub fn buffer(&self) -> &Arc<SignalBuffer> {
        &self.inner.buffer
    }

    pub fn provider(&self) -> &Arc<dyn FeatureProvider> {
        &self.inner.provider
    }

    pub fn config(&self) -> &DecisionLoopConfig {
        &self.inner.config
    }

    /// Ticks started so far, timer and manual
    pub fn ticks_started(&self) -> u64 {
        self.inner.last_tick.load(Ordering::Acquire)
    }

    /// Arm the repeating timer. Must be called inside a tokio runtime.
    pub fn start(&self) -> Result<(), LifecycleError> {
        self.inner
            .state
            .compare_exchange(
                LoopState::IDLE,
                LoopState::RUNNING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|current| LifecycleError::CannotStart(LoopState::from_u8(current)))?;

        let inner = Arc::clone(&self.inner);
        let handle = tokio::spawn(async move { inner.run_timer().await });
        *self.timer.lock() = Some(handle);

        tracing::info!(
            pairs = ?self.inner.config.trading_pairs,
            interval_secs = self.inner.config.interval.as_secs_f64(),
            provider = self.inner.provider.name(),
            "Decision loop started"
        );
        Ok(())
    }

    /// Disarm the timer and close the buffer to writes.
    ///
    /// Ticks already in flight finish their evaluations, but their signals
    /// are discarded. Stopping is terminal and idempotent.
    pub fn stop(&self) {
        let previous = self.inner.state.swap(LoopState::STOPPED, Ordering::AcqRel);
        if let Some(timer) = self.timer.lock().take() {
            timer.abort();
        }
        self.inner.buffer.close();

        if previous != LoopState::STOPPED {
            tracing::info!(
                ticks = self.ticks_started(),
                buffered = self.inner.buffer.len(),
                "Decision loop stopped"
            );
        }
    }

    /// Start one out-of-cycle tick and return without waiting for it.
    ///
    /// The returned handle may be dropped; the tick still runs to completion.
    pub fn trigger(&self) -> Result<JoinHandle<TickReport>, TriggerError> {
        let state = self.state();
        if state != LoopState::Running {
            return Err(TriggerError::NotRunning(state));
        }

        let inner = Arc::clone(&self.inner);
        Ok(tokio::spawn(async move {
            inner.run_tick(TickSource::Manual).await
        }))
    }

    /// Run one tick on the calling task and wait for it to commit
    pub async fn run_tick(&self, source: TickSource) -> TickReport {
        self.inner.run_tick(source).await
    }
}

impl Drop for DecisionLoop {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().take() {
            timer.abort();
        }
    }
}

impl LoopInner {
    fn state(&self) -> LoopState {
        LoopState::from_u8(self.state.load(Ordering::Acquire))
    }

    async fn run_timer(self: Arc<Self>) {
        let period = self.config.interval;
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if self.state() != LoopState::Running {
                break;
            }

            // Each tick runs on its own task so a slow fetch never delays the
            // next timer fire.
            let inner = Arc::clone(&self);
            tokio::spawn(async move { inner.run_tick(TickSource::Timer).await });
        }
    }

    async fn run_tick(&self, source: TickSource) -> TickReport {
        let tick_id = self.last_tick.fetch_add(1, Ordering::AcqRel) + 1;
        let turn = CommitTurn {
            committed: &self.committed,
            tick_id,
        };
        let mut report = TickReport::new(tick_id, source, self.config.trading_pairs.len());

        let signals = self.collect(&mut report).await;
        self.commit(signals, turn, &mut report).await;

        if report.fetch_failed || report.failed > 0 || report.malformed > 0 {
            tracing::warn!(
                tick_id,
                %source,
                requested = report.requested,
                received = report.received,
                malformed = report.malformed,
                evaluated = report.evaluated,
                failed = report.failed,
                pushed = report.pushed,
                dropped = report.dropped,
                discarded = report.discarded,
                fetch_failed = report.fetch_failed,
                "Tick completed with errors"
            );
        } else {
            tracing::info!(
                tick_id,
                %source,
                evaluated = report.evaluated,
                pushed = report.pushed,
                dropped = report.dropped,
                discarded = report.discarded,
                "Tick completed"
            );
        }

        report
    }

    /// Fetch and evaluate. Signals come back in configured-pair order.
    async fn collect(&self, report: &mut TickReport) -> Vec<Signal> {
        let pairs = &self.config.trading_pairs;

        let features = match self.provider.fetch(pairs).await {
            Ok(features) => features,
            Err(e) => {
                report.fetch_failed = true;
                tracing::error!(
                    tick_id = report.tick_id,
                    provider = self.provider.name(),
                    error = %e,
                    "Feature fetch failed, skipping tick"
                );
                return Vec::new();
            }
        };
        report.received = features.len();

        let mut snapshots = Vec::with_capacity(pairs.len());
        for pair in pairs {
            let Some(snapshot) = features.get(pair) else {
                tracing::debug!(tick_id = report.tick_id, trading_pair = %pair, "No features returned");
                continue;
            };
            if let Err(e) = snapshot.validate(pair) {
                report.malformed += 1;
                tracing::warn!(tick_id = report.tick_id, error = %e, "Skipping malformed snapshot");
                continue;
            }
            snapshots.push(snapshot);
        }

        let results = join_all(snapshots.into_iter().map(|s| self.evaluator.evaluate(s))).await;

        let mut signals = Vec::with_capacity(results.len());
        for result in results {
            match result {
                Ok(signal) => {
                    report.evaluated += 1;
                    signals.push(signal);
                }
                Err(e) => {
                    report.failed += 1;
                    tracing::warn!(tick_id = report.tick_id, error = %e, "Evaluation failed");
                }
            }
        }
        signals
    }

    async fn commit(&self, signals: Vec<Signal>, turn: CommitTurn<'_>, report: &mut TickReport) {
        let tick_id = report.tick_id;

        let mut committed = self.committed.subscribe();
        // The sender lives as long as `self`, so this only returns once it
        // is this tick's turn.
        let _ = committed.wait_for(|order| order.next >= tick_id).await;

        for signal in signals {
            if self.state() == LoopState::Stopped {
                report.discarded += 1;
                continue;
            }
            match self.buffer.push(signal) {
                PushOutcome::Accepted => report.pushed += 1,
                PushOutcome::DroppedFull => report.dropped += 1,
                PushOutcome::Closed => report.discarded += 1,
            }
        }

        drop(turn);
    }
}

/// Tick ids released so far. `next` only advances over a contiguous run,
/// so a tick released early never lets a later one overtake an earlier one.
#[derive(Debug)]
struct CommitOrder {
    /// Lowest tick id not yet released
    next: u64,
    released: BTreeSet<u64>,
}

impl Default for CommitOrder {
    fn default() -> Self {
        Self {
            next: 1,
            released: BTreeSet::new(),
        }
    }
}

impl CommitOrder {
    fn release(&mut self, tick_id: u64) {
        self.released.insert(tick_id);
        while self.released.remove(&self.next) {
            self.next += 1;
        }
    }
}

/// A tick's place in the commit order.
///
/// Dropping it hands the turn on, including when the tick panics or its
/// future is cancelled before committing.
struct CommitTurn<'a> {
    committed: &'a watch::Sender<CommitOrder>,
    tick_id: u64,
}

impl Drop for CommitTurn<'_> {
    fn drop(&mut self) {
        let tick_id = self.tick_id;
        self.committed.send_modify(|order| order.release(tick_id));
    }
}
