//! Signal queries
//!
//! Every read drains the buffer. A signal returned to one caller is never
//! seen by another, and `recent_for_symbol` also consumes the non-matching
//! signals it had to look through.

use signal_core::Signal;
use std::sync::Arc;
use tokio::task::JoinHandle;

use super::decision_loop::{DecisionLoop, TriggerError};
use crate::domain::{LoopState, SignalBuffer, TickReport};

/// How many signals `recent_for_symbol` drains per requested match
pub const DEFAULT_OVER_FETCH_FACTOR: usize = 5;

/// Read side of the pipeline, shared by the HTTP handlers
pub struct SignalQueryService {
    decision_loop: Arc<DecisionLoop>,
    over_fetch_factor: usize,
}

impl SignalQueryService {
    pub fn new(decision_loop: Arc<DecisionLoop>) -> Self {
        Self::with_over_fetch_factor(decision_loop, DEFAULT_OVER_FETCH_FACTOR)
    }

    pub fn with_over_fetch_factor(decision_loop: Arc<DecisionLoop>, over_fetch_factor: usize) -> Self {
        Self {
            decision_loop,
            over_fetch_factor: over_fetch_factor.max(1),
        }
    }

    fn buffer(&self) -> &SignalBuffer {
        self.decision_loop.buffer()
    }

    /// Up to `n` oldest buffered signals, removed from the buffer
    pub fn recent(&self, n: usize) -> Vec<Signal> {
        self.buffer().drain(n)
    }

    /// Up to `n` signals for `trading_pair`, oldest first.
    ///
    /// Drains `min(factor * n, capacity)` signals and filters them; the
    /// drained signals for other pairs are dropped.
    pub fn recent_for_symbol(&self, trading_pair: &str, n: usize) -> Vec<Signal> {
        let buffer = self.buffer();
        let window = n.saturating_mul(self.over_fetch_factor).min(buffer.capacity());
        let drained = buffer.drain(window);
        let scanned = drained.len();

        let matches: Vec<Signal> = drained
            .into_iter()
            .filter(|s| s.trading_pair == trading_pair)
            .take(n)
            .collect();

        if scanned > matches.len() {
            tracing::debug!(
                trading_pair,
                scanned,
                returned = matches.len(),
                "Discarded drained signals for other pairs"
            );
        }

        matches
    }

    /// Fire one out-of-cycle tick
    pub fn trigger(&self) -> Result<JoinHandle<TickReport>, TriggerError> {
        self.decision_loop.trigger()
    }

    pub fn state(&self) -> LoopState {
        self.decision_loop.state()
    }

    pub fn buffered(&self) -> usize {
        self.buffer().len()
    }
}
