use chrono::{DateTime, Utc};

/// Timestamp in UTC
pub type Timestamp = DateTime<Utc>;

/// Trading pair identifier (e.g. "BTCUSDT")
pub type Symbol = String;
