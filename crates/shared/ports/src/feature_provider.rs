use async_trait::async_trait;
use signal_core::{FeatureSnapshot, Symbol};
use std::collections::HashMap;

use crate::error::FetchResult;

/// Snapshots keyed by trading pair
pub type FeatureMap = HashMap<Symbol, FeatureSnapshot>;

/// Port for pulling the latest feature vectors.
///
/// A provider may fail wholesale or return fewer pairs than requested;
/// callers skip whatever is missing.
#[async_trait]
pub trait FeatureProvider: Send + Sync {
    /// Fetch the latest snapshot for each requested trading pair
    async fn fetch(&self, symbols: &[Symbol]) -> FetchResult<FeatureMap>;

    /// Check that the backing store is reachable
    async fn health_check(&self) -> FetchResult<()> {
        Ok(())
    }

    /// Provider name for logging
    fn name(&self) -> &str;
}
