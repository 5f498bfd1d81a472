use async_trait::async_trait;
use signal_core::{FeatureSnapshot, Symbol};
use signal_ports::{Clock, FeatureMap, FeatureProvider, FetchResult};
use std::sync::Arc;

/// Synthetic feature source for running without a feature store.
///
/// Output depends only on the clock: BTCUSDT wobbles around 45000, ETHUSDT
/// around 2500 and every other pair sits flat at 1000.
pub struct MockFeatureProvider {
    clock: Arc<dyn Clock>,
}

impl MockFeatureProvider {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    pub fn snapshot(&self, trading_pair: &str) -> FeatureSnapshot {
        let now = self.clock.now();
        let secs = now.timestamp();

        let values = match trading_pair {
            "BTCUSDT" => {
                let price = 45000.0 + (secs.rem_euclid(1000) - 500) as f64;
                let rsi = 50.0 + (secs.rem_euclid(40) - 20) as f64;
                [price, price * 0.998, price * 0.995, rsi, 0.02, 1.2, 0.01]
            }
            "ETHUSDT" => {
                let price = 2500.0 + (secs.rem_euclid(100) - 50) as f64;
                let rsi = 50.0 + (secs.rem_euclid(30) - 15) as f64;
                [price, price * 0.999, price * 0.997, rsi, 0.03, 1.1, -0.005]
            }
            _ => [1000.0, 1000.0, 1000.0, 50.0, 0.01, 1.0, 0.0],
        };

        FeatureSnapshot::from_values(trading_pair, values, now)
    }
}

#[async_trait]
impl FeatureProvider for MockFeatureProvider {
    async fn fetch(&self, symbols: &[Symbol]) -> FetchResult<FeatureMap> {
        Ok(symbols
            .iter()
            .map(|symbol| (symbol.clone(), self.snapshot(symbol)))
            .collect())
    }

    fn name(&self) -> &str {
        "mock"
    }
}
