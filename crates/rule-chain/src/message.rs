use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Message type carrying one feature snapshot
pub const FEATURE_DATA: &str = "FEATURE_DATA";

/// Message type emitted by a chain that classified a snapshot
pub const TRADING_SIGNAL: &str = "TRADING_SIGNAL";

/// Metadata key carrying the emission timestamp stamped on the signal
pub const EMITTED_AT: &str = "emitted_at";

/// Payload encoding
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DataType {
    Json,
    Text,
}

/// Message flowing through a rule chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleMsg {
    pub id: Uuid,
    pub msg_type: String,
    pub data_type: DataType,
    pub data: String,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl RuleMsg {
    /// Create a new message with a fresh id
    pub fn new(msg_type: impl Into<String>, data_type: DataType, data: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            msg_type: msg_type.into(),
            data_type,
            data: data.into(),
            metadata: HashMap::new(),
        }
    }

    /// Create a JSON message
    pub fn json(msg_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self::new(msg_type, DataType::Json, data)
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata.get(key).map(String::as_str)
    }

    /// Derive a reply that keeps id and metadata
    pub fn reply(&self, msg_type: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: self.id,
            msg_type: msg_type.into(),
            data_type: DataType::Json,
            data: data.into(),
            metadata: self.metadata.clone(),
        }
    }
}
