//! Error types for azure-devops-mcp.

use thiserror::Error;

/// Main error type for Azure DevOps operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Network-level failure (DNS, timeout, connection reset)
    #[error("Request failed: {0}")]
    Http(String),

    /// No usable credential when signing a request
    #[error("Authentication error: {0}")]
    Auth(String),

    /// Azure DevOps returned a non-success status
    #[error("Azure DevOps API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// A referenced upstream object does not exist
    #[error("{0}")]
    NotFound(String),

    /// Caller supplied nothing usable
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream returned a success status with a body we could not read
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Serialization/deserialization failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// Build an API error from a non-success response.
    ///
    /// Uses the upstream JSON `message` field when the body carries one,
    /// otherwise the raw body text.
    pub fn from_response(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<serde_json::Value>(body)
            .ok()
            .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
            .unwrap_or_else(|| body.to_string());

        Error::Api { status, message }
    }

    /// HTTP status code, when the error came from an upstream response.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for Azure DevOps operations.
pub type Result<T> = std::result::Result<T, Error>;
