use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle of the decision loop. Stopped is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoopState {
    Idle,
    Running,
    Stopped,
}

impl LoopState {
    pub(crate) const IDLE: u8 = 0;
    pub(crate) const RUNNING: u8 = 1;
    pub(crate) const STOPPED: u8 = 2;

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            Self::IDLE => LoopState::Idle,
            Self::RUNNING => LoopState::Running,
            _ => LoopState::Stopped,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::Running => "running",
            LoopState::Stopped => "stopped",
        }
    }
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What started a tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TickSource {
    Timer,
    Manual,
}

impl fmt::Display for TickSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TickSource::Timer => f.write_str("timer"),
            TickSource::Manual => f.write_str("manual"),
        }
    }
}

/// Outcome counters for one execution of the decision procedure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick_id: u64,
    pub source: TickSource,
    /// Pairs requested from the feature provider
    pub requested: usize,
    /// Snapshots returned by the provider
    pub received: usize,
    /// Snapshots skipped as malformed
    pub malformed: usize,
    /// Successful evaluations
    pub evaluated: usize,
    /// Evaluations that failed or timed out
    pub failed: usize,
    /// Signals accepted by the buffer
    pub pushed: usize,
    /// Signals dropped because the buffer was full
    pub dropped: usize,
    /// Signals discarded because the loop stopped first
    pub discarded: usize,
    /// Whether the feature fetch failed wholesale
    pub fetch_failed: bool,
}

impl TickReport {
    pub fn new(tick_id: u64, source: TickSource, requested: usize) -> Self {
        Self {
            tick_id,
            source,
            requested,
            received: 0,
            malformed: 0,
            evaluated: 0,
            failed: 0,
            pushed: 0,
            dropped: 0,
            discarded: 0,
            fetch_failed: false,
        }
    }
}
