mod config;
mod feast_client;
mod mock_provider;

pub use config::{
    ConfigError, EngineConfig, FeatureStoreConfig, QueryConfig, ServerConfig, TradingConfig,
};
pub use feast_client::{
    EntityRow, FeastClient, FeastError, FeatureResult, OnlineFeaturesRequest,
    OnlineFeaturesResponse, snapshots_from_response,
};
pub use mock_provider::MockFeatureProvider;

use signal_ports::{Clock, FeatureProvider};
use std::sync::Arc;

/// Choose the feature source once, at startup
pub fn build_provider(
    config: &FeatureStoreConfig,
    clock: Arc<dyn Clock>,
) -> Result<Arc<dyn FeatureProvider>, FeastError> {
    if config.use_mock {
        tracing::info!("Using mock feature provider");
        Ok(Arc::new(MockFeatureProvider::new(clock)))
    } else {
        tracing::info!(base_url = %config.base_url, "Using Feast feature provider");
        Ok(Arc::new(FeastClient::new(config, clock)?))
    }
}
