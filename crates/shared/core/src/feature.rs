//! Feature snapshots pulled from the online feature store.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::values::{Symbol, Timestamp};

/// Number of numeric features every snapshot must carry
pub const FEATURE_COUNT: usize = 7;

/// Snapshot rejected before evaluation
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MalformedSnapshot {
    #[error("{symbol}: only {usable} of {FEATURE_COUNT} numeric features are usable")]
    MissingFeatures { symbol: Symbol, usable: usize },

    #[error("snapshot keyed as {expected} carries trading pair {actual}")]
    SymbolMismatch { expected: Symbol, actual: Symbol },
}

/// One trading pair's feature vector at a point in time.
///
/// Values missing from the remote store are carried as NaN so that the
/// decision loop can reject the snapshot instead of evaluating garbage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureSnapshot {
    pub trading_pair: Symbol,
    pub price: f64,
    pub ma_5: f64,
    pub ma_10: f64,
    pub rsi_14: f64,
    pub volatility: f64,
    pub volume_ratio: f64,
    pub momentum_5d: f64,
    pub timestamp: Timestamp,
}

impl FeatureSnapshot {
    /// Build a snapshot from the feature store's positional value order:
    /// price, ma_5, ma_10, rsi_14, volatility, volume_ratio, momentum_5d.
    pub fn from_values(
        trading_pair: impl Into<Symbol>,
        values: [f64; FEATURE_COUNT],
        timestamp: Timestamp,
    ) -> Self {
        let [price, ma_5, ma_10, rsi_14, volatility, volume_ratio, momentum_5d] = values;
        Self {
            trading_pair: trading_pair.into(),
            price,
            ma_5,
            ma_10,
            rsi_14,
            volatility,
            volume_ratio,
            momentum_5d,
            timestamp,
        }
    }

    /// Numeric features in feature-store order
    pub fn values(&self) -> [f64; FEATURE_COUNT] {
        [
            self.price,
            self.ma_5,
            self.ma_10,
            self.rsi_14,
            self.volatility,
            self.volume_ratio,
            self.momentum_5d,
        ]
    }

    /// Count of finite numeric features
    pub fn usable_fields(&self) -> usize {
        self.values().iter().filter(|v| v.is_finite()).count()
    }

    /// Check the snapshot is fit for evaluation under the given key
    pub fn validate(&self, key: &str) -> Result<(), MalformedSnapshot> {
        if self.trading_pair != key {
            return Err(MalformedSnapshot::SymbolMismatch {
                expected: key.to_string(),
                actual: self.trading_pair.clone(),
            });
        }

        let usable = self.usable_fields();
        if usable < FEATURE_COUNT {
            return Err(MalformedSnapshot::MissingFeatures {
                symbol: self.trading_pair.clone(),
                usable,
            });
        }

        Ok(())
    }
}
