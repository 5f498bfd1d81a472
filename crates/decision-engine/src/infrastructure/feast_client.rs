use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use signal_core::{FEATURE_COUNT, FeatureSnapshot, Symbol, Timestamp};
use signal_ports::{Clock, FeatureMap, FeatureProvider, FetchError, FetchResult};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use super::config::FeatureStoreConfig;

/// Feature view the online features are read from
const FEATURE_VIEW: &str = "realtime_features";

/// Feature names in the positional order the snapshot expects
const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "price",
    "ma_5",
    "ma_10",
    "rsi_14",
    "volatility",
    "volume_ratio",
    "momentum_5d",
];

#[derive(Error, Debug)]
pub enum FeastError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Feature store returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("Parse error: {0}")]
    Parse(String),
}

impl FeastError {
    /// Transport failures and server errors are worth another attempt
    fn is_retryable(&self) -> bool {
        match self {
            FeastError::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            FeastError::Status { status, .. } => status.is_server_error(),
            FeastError::Parse(_) => false,
        }
    }
}

/// Convert infrastructure FeastError to port FetchError
impl From<FeastError> for FetchError {
    fn from(err: FeastError) -> Self {
        match err {
            FeastError::Http(e) if e.is_timeout() => FetchError::Timeout,
            FeastError::Http(e) => FetchError::Network(e.to_string()),
            FeastError::Status { status, body } => FetchError::Api {
                status: status.as_u16(),
                body,
            },
            FeastError::Parse(msg) => FetchError::Parse(msg),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct OnlineFeaturesRequest {
    pub features: Vec<String>,
    pub entity_rows: Vec<EntityRow>,
    pub full_feature_names: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct EntityRow {
    pub trading_pair: String,
}

impl OnlineFeaturesRequest {
    pub fn for_pairs(pairs: &[Symbol]) -> Self {
        Self {
            features: FEATURE_NAMES
                .iter()
                .map(|name| format!("{}:{}", FEATURE_VIEW, name))
                .collect(),
            entity_rows: pairs
                .iter()
                .map(|pair| EntityRow {
                    trading_pair: pair.clone(),
                })
                .collect(),
            full_feature_names: false,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OnlineFeaturesResponse {
    #[serde(default)]
    pub feature_names: Vec<String>,
    #[serde(default)]
    pub results: Vec<FeatureResult>,
}

/// One row of the response, positionally matching a requested pair
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeatureResult {
    #[serde(default)]
    pub values: Vec<Value>,
    #[serde(default)]
    pub statuses: Vec<String>,
    #[serde(default)]
    pub event_timestamps: Vec<String>,
}

/// Map a response onto the requested pairs.
///
/// Rows beyond the response are missing; rows with fewer than
/// `FEATURE_COUNT` values are skipped. Non-numeric values become NaN so the
/// decision loop rejects the snapshot as malformed.
pub fn snapshots_from_response(
    pairs: &[Symbol],
    response: OnlineFeaturesResponse,
    fetched_at: Timestamp,
) -> FeatureMap {
    let mut snapshots = FeatureMap::with_capacity(pairs.len());

    for (pair, row) in pairs.iter().zip(response.results) {
        if row.values.len() < FEATURE_COUNT {
            tracing::warn!(
                trading_pair = %pair,
                values = row.values.len(),
                "Incomplete feature row, skipping"
            );
            continue;
        }

        let mut values = [f64::NAN; FEATURE_COUNT];
        for (slot, value) in values.iter_mut().zip(&row.values) {
            *slot = value.as_f64().unwrap_or(f64::NAN);
        }

        let timestamp = row
            .event_timestamps
            .iter()
            .filter_map(|ts| DateTime::parse_from_rfc3339(ts).ok())
            .map(|ts| ts.with_timezone(&Utc))
            .max()
            .unwrap_or(fetched_at);

        snapshots.insert(
            pair.clone(),
            FeatureSnapshot::from_values(pair.clone(), values, timestamp),
        );
    }

    snapshots
}

/// Client for a Feast online feature server
pub struct FeastClient {
    client: Client,
    base_url: String,
    retry_count: u32,
    retry_wait: Duration,
    clock: Arc<dyn Clock>,
}

impl FeastClient {
    pub fn new(config: &FeatureStoreConfig, clock: Arc<dyn Clock>) -> Result<Self, FeastError> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            retry_count: config.retry_count,
            retry_wait: config.retry_wait(),
            clock,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /get-online-features, retried on transport and server errors
    pub async fn get_online_features(
        &self,
        pairs: &[Symbol],
    ) -> Result<OnlineFeaturesResponse, FeastError> {
        let request = OnlineFeaturesRequest::for_pairs(pairs);
        let mut attempt = 0;

        loop {
            match self.post_online_features(&request).await {
                Ok(response) => return Ok(response),
                Err(e) if e.is_retryable() && attempt < self.retry_count => {
                    attempt += 1;
                    tracing::warn!(
                        attempt,
                        max_retries = self.retry_count,
                        error = %e,
                        "Feature store request failed, retrying"
                    );
                    tokio::time::sleep(self.retry_wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn post_online_features(
        &self,
        request: &OnlineFeaturesRequest,
    ) -> Result<OnlineFeaturesResponse, FeastError> {
        let url = format!("{}/get-online-features", self.base_url);
        let resp = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        let status = resp.status();
        let text = resp.text().await?;

        if status != StatusCode::OK {
            return Err(FeastError::Status { status, body: text });
        }

        serde_json::from_str(&text).map_err(|e| FeastError::Parse(e.to_string()))
    }
}

#[async_trait]
impl FeatureProvider for FeastClient {
    async fn fetch(&self, symbols: &[Symbol]) -> FetchResult<FeatureMap> {
        let response = self.get_online_features(symbols).await?;
        Ok(snapshots_from_response(symbols, response, self.clock.now()))
    }

    async fn health_check(&self) -> FetchResult<()> {
        let url = format!("{}/health", self.base_url);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(FeastError::from)?;

        let status = resp.status();
        if status != StatusCode::OK {
            return Err(FetchError::Api {
                status: status.as_u16(),
                body: resp.text().await.unwrap_or_default(),
            });
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "feast"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use signal_ports::FixedClock;

    fn pairs(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn response(value: serde_json::Value) -> OnlineFeaturesResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let request = OnlineFeaturesRequest::for_pairs(&pairs(&["BTCUSDT", "ETHUSDT"]));
        let body = serde_json::to_value(&request).unwrap();

        assert_eq!(
            body,
            json!({
                "features": [
                    "realtime_features:price",
                    "realtime_features:ma_5",
                    "realtime_features:ma_10",
                    "realtime_features:rsi_14",
                    "realtime_features:volatility",
                    "realtime_features:volume_ratio",
                    "realtime_features:momentum_5d"
                ],
                "entity_rows": [
                    { "trading_pair": "BTCUSDT" },
                    { "trading_pair": "ETHUSDT" }
                ],
                "full_feature_names": false
            })
        );
    }

    #[test]
    fn test_rows_map_positionally() {
        let fetched_at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let resp = response(json!({
            "feature_names": ["price"],
            "results": [
                { "values": [45000.0, 44900.0, 44800.0, 55.0, 0.02, 1.2, 0.01] },
                { "values": [2500.0, 2490.0, 2480.0, 45.0, 0.03, 1.1, -0.005] }
            ]
        }));

        let map = snapshots_from_response(&pairs(&["BTCUSDT", "ETHUSDT"]), resp, fetched_at);

        let btc = &map["BTCUSDT"];
        assert_eq!(btc.trading_pair, "BTCUSDT");
        assert_eq!(btc.price, 45000.0);
        assert_eq!(btc.rsi_14, 55.0);
        assert_eq!(btc.timestamp, fetched_at);
        assert_eq!(map["ETHUSDT"].momentum_5d, -0.005);
    }

    #[test]
    fn test_short_rows_and_missing_rows_are_skipped() {
        let resp = response(json!({
            "results": [
                { "values": [45000.0, 44900.0] }
            ]
        }));

        let map = snapshots_from_response(&pairs(&["BTCUSDT", "ETHUSDT"]), resp, Utc::now());
        assert!(map.is_empty());
    }

    #[test]
    fn test_non_numeric_values_become_nan() {
        let resp = response(json!({
            "results": [
                { "values": [45000.0, null, 44800.0, "n/a", 0.02, 1.2, 0.01] }
            ]
        }));

        let map = snapshots_from_response(&pairs(&["BTCUSDT"]), resp, Utc::now());
        let btc = &map["BTCUSDT"];
        assert!(btc.ma_5.is_nan());
        assert!(btc.rsi_14.is_nan());
        assert_eq!(btc.usable_fields(), 5);
        assert!(btc.validate("BTCUSDT").is_err());
    }

    #[test]
    fn test_event_timestamp_preferred() {
        let resp = response(json!({
            "results": [{
                "values": [1.0, 1.0, 1.0, 50.0, 0.01, 1.0, 0.0],
                "event_timestamps": ["2024-03-01T10:00:00Z", "garbage", "2024-03-01T10:05:00Z"]
            }]
        }));

        let map = snapshots_from_response(&pairs(&["BTCUSDT"]), resp, Utc::now());
        assert_eq!(
            map["BTCUSDT"].timestamp,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap()
        );
    }

    #[test]
    fn test_error_conversion() {
        let err: FetchError = FeastError::Status {
            status: StatusCode::BAD_GATEWAY,
            body: "upstream".to_string(),
        }
        .into();
        assert_eq!(
            err,
            FetchError::Api {
                status: 502,
                body: "upstream".to_string()
            }
        );

        let err: FetchError = FeastError::Parse("eof".to_string()).into();
        assert_eq!(err, FetchError::Parse("eof".to_string()));
    }

    #[test]
    fn test_server_errors_are_retryable() {
        let server = FeastError::Status {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: String::new(),
        };
        let client = FeastError::Status {
            status: StatusCode::BAD_REQUEST,
            body: String::new(),
        };
        assert!(server.is_retryable());
        assert!(!client.is_retryable());
        assert!(!FeastError::Parse(String::new()).is_retryable());
    }

    #[tokio::test]
    async fn test_unreachable_store_fails_after_retries() {
        let config = FeatureStoreConfig {
            // nothing listens on the discard port
            base_url: "http://127.0.0.1:9".to_string(),
            request_timeout_secs: 1,
            retry_count: 2,
            retry_wait_ms: 10,
            ..Default::default()
        };
        let clock = Arc::new(FixedClock::new(Utc::now()));
        let client = FeastClient::new(&config, clock).unwrap();

        let err = client.fetch(&pairs(&["BTCUSDT"])).await.unwrap_err();
        assert!(matches!(err, FetchError::Network(_) | FetchError::Timeout));
        assert!(client.health_check().await.is_err());
    }
}
