//! Error types for the notification bridge.

use std::path::PathBuf;

use planebot_slack::SlackError;
use planebot_tracker::TrackerError;
use thiserror::Error;

/// Result type for bridge operations.
pub type BridgeResult<T> = Result<T, BridgeError>;

/// Errors raised by the user mapping store.
#[derive(Debug, Error)]
pub enum MappingError {
    /// Reading or rewriting the mapping file failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The key to delete has no row.
    #[error("no mapping found for {0}")]
    NotFound(String),

    /// A key or value that cannot be stored.
    #[error("invalid mapping entry: {0}")]
    Invalid(String),
}

impl MappingError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Errors raised by the bridge.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// Missing or malformed configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Tracker call failed.
    #[error(transparent)]
    Tracker(#[from] TrackerError),

    /// Slack call failed.
    #[error(transparent)]
    Slack(#[from] SlackError),

    /// Mapping store failed.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// A project, issue or state that does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Malformed command input.
    #[error("{0}")]
    InvalidInput(String),
}
