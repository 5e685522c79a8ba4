//! Top-level error type for toolgate
//!
//! Flattens the broker, store and tool errors into the categories callers
//! act on:
//!
//! - [`Error::Conflict`] - A request or decision already exists; do not retry
//! - [`Error::NotFound`] - No live request for the session (never filed, expired, or consumed)
//! - [`Error::Unavailable`] - Broker or store unreachable; retry later
//! - [`Error::Timeout`] - No decision before the deadline
//! - [`Error::Tool`] - Tool execution failed
//! - [`Error::Config`] - Bad configuration or input

use thiserror::Error;

use crate::authorization::{BrokerError, StoreError};
use crate::tool::ToolError;

/// Top-level error type for toolgate operations
#[derive(Debug, Error)]
pub enum Error {
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("tool error: {0}")]
    Tool(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Returns true if retrying later may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Timeout(_))
    }

    pub fn is_tool(&self) -> bool {
        matches!(self, Self::Tool(_))
    }

    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<BrokerError> for Error {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Conflict(msg) => Error::Conflict(msg),
            BrokerError::NotFound(session) => {
                Error::NotFound(format!("no authorization request for session '{}'", session))
            }
            BrokerError::Transport(msg) => Error::Unavailable(msg),
            BrokerError::Timeout(after) => Error::Timeout(format!("{}s", after.as_secs())),
        }
    }
}

impl From<StoreError> for Error {
    fn from(err: StoreError) -> Self {
        BrokerError::from(err).into()
    }
}

impl From<ToolError> for Error {
    fn from(err: ToolError) -> Self {
        Error::Tool(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Config(err.to_string())
    }
}

/// Result type alias using the top-level [`enum@Error`]
pub type Result<T> = std::result::Result<T, Error>;
