//! Error types for the tracker client.

use thiserror::Error;

/// Errors returned by tracker API calls.
#[derive(Error, Debug)]
pub enum TrackerError {
    /// Configuration error (missing slug, empty key, bad URL).
    #[error("Configuration error: {0}")]
    Config(String),

    /// Network/HTTP transport error.
    #[error("Network error: {0}")]
    Network(String),

    /// Request exceeded the configured timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// The tracker answered with a non-success status.
    #[error("Tracker returned {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (possibly empty).
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("Failed to decode tracker response: {0}")]
    Decode(String),

    /// A looked-up entity does not exist.
    #[error("Not found: {0}")]
    NotFound(String),
}

impl TrackerError {
    /// Whether the error came from the transport rather than the payload.
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            TrackerError::Network(_) | TrackerError::Timeout(_) | TrackerError::Status { .. }
        )
    }
}

impl From<reqwest::Error> for TrackerError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            TrackerError::Timeout(err.to_string())
        } else if err.is_connect() {
            TrackerError::Network(format!("Connection failed: {}", err))
        } else if err.is_decode() {
            TrackerError::Decode(err.to_string())
        } else {
            TrackerError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for TrackerError {
    fn from(err: serde_json::Error) -> Self {
        TrackerError::Decode(err.to_string())
    }
}

/// Result type for tracker operations.
pub type TrackerResult<T> = std::result::Result<T, TrackerError>;
