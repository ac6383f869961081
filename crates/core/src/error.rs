//! Error types for report operations.

use thiserror::Error;

/// Errors that can occur while building or delivering a report.
#[derive(Debug, Error)]
pub enum ReportError {
    /// The report cannot be completed safely: a provider returned an
    /// unexpected shape, a required total was missing or non-positive, a
    /// query failed, or persisted history is corrupt.
    #[error("{0}")]
    DataUnavailable(String),

    #[error("HTTP {status} from {endpoint}")]
    HttpStatus { status: u16, endpoint: String },

    #[error("Connection failed ({endpoint}): {message}")]
    Connection { endpoint: String, message: String },

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Config(String),

    #[error("History I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Returns true for HTTP statuses worth retrying: 429 and every 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

impl ReportError {
    pub fn data_unavailable(message: impl Into<String>) -> Self {
        ReportError::DataUnavailable(message.into())
    }

    /// Error for a required setting that is absent or blank.
    pub fn missing_env(name: &str) -> Self {
        ReportError::Config(format!("Missing required environment variable: {}", name))
    }

    /// Returns true if this error is transient and likely to succeed on retry.
    /// Rate limiting, server errors, connection failures and timeouts are
    /// transient; other 4xx statuses and all data errors are terminal.
    pub fn is_transient(&self) -> bool {
        match self {
            ReportError::HttpStatus { status, .. } => is_retryable_status(*status),
            ReportError::Connection { .. } | ReportError::Timeout(_) => true,
            ReportError::DataUnavailable(_)
            | ReportError::Config(_)
            | ReportError::Io(_)
            | ReportError::Serialize(_) => false,
        }
    }

    pub fn is_data_unavailable(&self) -> bool {
        matches!(self, ReportError::DataUnavailable(_))
    }
}
