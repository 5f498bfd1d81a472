use thiserror::Error;

/// Errors raised when pulling features from the feature store.
///
/// Infrastructure clients convert their specific errors to this type so the
/// decision loop never sees transport details.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Feature store returned status {status}: {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse feature store response: {0}")]
    Parse(String),

    #[error("Feature store request timed out")]
    Timeout,
}

pub type FetchResult<T> = std::result::Result<T, FetchError>;
