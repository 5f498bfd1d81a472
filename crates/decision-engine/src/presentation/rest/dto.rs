use serde::{Deserialize, Serialize};
use signal_core::Signal;

use crate::domain::LoopState;

/// Optional `?limit=` on the signal endpoints
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<usize>,
}

/// GET /health
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    /// RFC 3339
    pub timestamp: String,
    pub state: LoopState,
}

/// GET /signals
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalsResponse {
    pub signals: Vec<Signal>,
    pub count: usize,
}

impl SignalsResponse {
    pub fn new(signals: Vec<Signal>) -> Self {
        Self {
            count: signals.len(),
            signals,
        }
    }
}

/// GET /signals/{pair}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PairSignalsResponse {
    pub trading_pair: String,
    pub signals: Vec<Signal>,
    pub count: usize,
}

impl PairSignalsResponse {
    pub fn new(trading_pair: String, signals: Vec<Signal>) -> Self {
        Self {
            trading_pair,
            count: signals.len(),
            signals,
        }
    }
}

/// POST /trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub message: String,
}

/// Error response body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: i32,
    pub msg: String,
}

impl ErrorResponse {
    pub fn new(code: i32, msg: impl Into<String>) -> Self {
        ErrorResponse {
            code,
            msg: msg.into(),
        }
    }
}
