use thiserror::Error;

/// Errors raised while loading or validating a rule chain
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleChainError {
    #[error("Failed to read rule chain {path}: {error}")]
    Io { path: String, error: String },

    #[error("Failed to parse rule chain: {0}")]
    Parse(String),

    #[error("Rule chain id must not be empty")]
    EmptyId,

    #[error("Rule chain must accept at least one message type")]
    NoAcceptedTypes,

    #[error("Duplicate node id: {0}")]
    DuplicateNode(String),

    #[error("Label '{0}' is produced by more than one node")]
    DuplicateLabel(String),

    #[error("Node '{node}' references label '{label}' before it is produced")]
    UnknownLabel { node: String, label: String },

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),

    #[error("Risk bands must be sorted by descending 'above'")]
    UnsortedRiskBands,
}

/// Errors raised while executing a chain against one message
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuleError {
    #[error("Unsupported message type: {0}")]
    UnsupportedMessageType(String),

    #[error("Invalid message payload: {0}")]
    InvalidInput(String),

    #[error("Missing numeric field: {0}")]
    MissingField(String),

    #[error("Failed to encode result: {0}")]
    Serialization(String),

    #[error("Rule engine queue is full")]
    Busy,

    #[error("Rule engine is shut down")]
    EngineShutdown,

    #[error("Rule chain panicked: {0}")]
    Panicked(String),
}
