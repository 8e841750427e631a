//! Error types for the trading desk pipeline

use thiserror::Error;

/// Pipeline-specific errors
#[derive(Debug, Error)]
pub enum DeskError {
    /// Upstream data API request failed
    #[error("Data API error: {0}")]
    ApiError(String),

    /// Invalid ticker symbol provided
    #[error("Invalid ticker: {0}")]
    InvalidTicker(String),

    /// Data not available for the requested ticker
    #[error("Data not available for {ticker}: {reason}")]
    DataUnavailable { ticker: String, reason: String },

    /// LLM verdict producer failed
    #[error("Verdict producer error: {0}")]
    LlmError(String),

    /// A structured verdict failed to parse
    #[error("Verdict parse error for {stage}: {reason}")]
    VerdictParse { stage: String, reason: String },

    /// Network or HTTP error
    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Configuration error (fatal, surfaced before any stage is scheduled)
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, DeskError>;

impl From<anyhow::Error> for DeskError {
    fn from(err: anyhow::Error) -> Self {
        DeskError::Other(err.to_string())
    }
}
