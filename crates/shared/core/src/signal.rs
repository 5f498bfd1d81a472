use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::feature::FeatureSnapshot;
use crate::values::{Symbol, Timestamp};

/// Classified trading action.
///
/// The rule chain may emit labels beyond BUY/SELL/HOLD (for instance
/// `STRONG_BUY`); those are kept verbatim in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Action {
    Buy,
    Sell,
    Hold,
    Other(String),
}

impl Action {
    pub fn as_str(&self) -> &str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
            Action::Other(label) => label,
        }
    }

    /// True for BUY and any bullish richer label (e.g. STRONG_BUY)
    pub fn is_bullish(&self) -> bool {
        match self {
            Action::Buy => true,
            Action::Other(label) => label.ends_with("BUY"),
            _ => false,
        }
    }

    /// True for SELL and any bearish richer label (e.g. STRONG_SELL)
    pub fn is_bearish(&self) -> bool {
        match self {
            Action::Sell => true,
            Action::Other(label) => label.ends_with("SELL"),
            _ => false,
        }
    }
}

impl From<String> for Action {
    fn from(value: String) -> Self {
        match value.as_str() {
            "BUY" => Action::Buy,
            "SELL" => Action::Sell,
            "HOLD" => Action::Hold,
            _ => Action::Other(value),
        }
    }
}

impl From<&str> for Action {
    fn from(value: &str) -> Self {
        Action::from(value.to_string())
    }
}

impl From<Action> for String {
    fn from(action: Action) -> Self {
        match action {
            Action::Other(label) => label,
            other => other.as_str().to_string(),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Trading signal produced by one rule-chain evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    pub trading_pair: Symbol,
    #[serde(rename = "signal")]
    pub action: Action,
    pub price: f64,
    pub buy_score: i32,
    pub sell_score: i32,
    /// Labels set by the chain's nodes (trend, momentum_signal, ...)
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    pub risk_level: String,
    pub position_size: f64,
    pub timestamp: Timestamp,
    /// Feature values the signal was derived from
    pub features: FeatureSnapshot,
}

impl Signal {
    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}
