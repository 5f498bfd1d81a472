//! Signal Buffer
//!
//! Bounded FIFO shared between the decision loop (producer) and query
//! handlers (consumers).
//!
//! - `push` never blocks. When the buffer is full the *incoming* signal is
//!   dropped, so under bursty production the buffer holds the oldest `C`
//!   signals produced since it was last below capacity, not the newest.
//! - `drain` is destructive. Whatever a call returns is gone for every other
//!   reader: repeated queries against a quiet buffer see a shrinking, then
//!   empty, result until the next tick refills it.

use parking_lot::Mutex;
use signal_core::Signal;
use std::collections::VecDeque;

/// Default buffer capacity
pub const DEFAULT_CAPACITY: usize = 100;

/// Result of a push attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    Accepted,
    /// Buffer was at capacity; the signal was discarded
    DroppedFull,
    /// Buffer no longer accepts writes; the signal was discarded
    Closed,
}

struct Inner {
    signals: VecDeque<Signal>,
    closed: bool,
}

/// Fixed-capacity signal queue with destructive reads
pub struct SignalBuffer {
    capacity: usize,
    inner: Mutex<Inner>,
}

impl SignalBuffer {
    /// Create a buffer holding at most `capacity` signals (minimum 1)
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            inner: Mutex::new(Inner {
                signals: VecDeque::with_capacity(capacity),
                closed: false,
            }),
        }
    }

    /// Enqueue a signal without blocking
    pub fn push(&self, signal: Signal) -> PushOutcome {
        let mut inner = self.inner.lock();

        if inner.closed {
            return PushOutcome::Closed;
        }

        if inner.signals.len() >= self.capacity {
            drop(inner);
            tracing::warn!(
                trading_pair = %signal.trading_pair,
                capacity = self.capacity,
                "Signal buffer full, dropping signal"
            );
            return PushOutcome::DroppedFull;
        }

        inner.signals.push_back(signal);
        PushOutcome::Accepted
    }

    /// Remove and return up to `n` signals, oldest first
    pub fn drain(&self, n: usize) -> Vec<Signal> {
        let mut inner = self.inner.lock();
        let take = n.min(inner.signals.len());
        inner.signals.drain(..take).collect()
    }

    /// Stop accepting writes. Buffered signals stay readable.
    pub fn close(&self) {
        self.inner.lock().closed = true;
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }

    pub fn len(&self) -> usize {
        self.inner.lock().signals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl Default for SignalBuffer {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
