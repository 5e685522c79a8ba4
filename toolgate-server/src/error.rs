//! Error types for the toolgate server.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use toolgate_core::authorization::BrokerError;

/// Errors that can occur when building a router.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// A configured path is not absolute.
    #[error("Invalid path '{0}': paths must start with '/'")]
    InvalidPath(String),

    /// Two transports were mounted at the same path.
    #[error("Path '{0}' is used by more than one endpoint")]
    DuplicatePath(String),
}

/// Errors that can occur in the toolgate server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// A request is already pending, or a decision was already recorded.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// No live request for the session.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid request from client.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The backing store could not be reached.
    #[error("Unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<BrokerError> for ServerError {
    fn from(err: BrokerError) -> Self {
        match err {
            BrokerError::Conflict(msg) => ServerError::Conflict(msg),
            BrokerError::NotFound(session) => ServerError::NotFound(format!(
                "no authorization request for session '{}'",
                session
            )),
            BrokerError::Transport(msg) => ServerError::Unavailable(msg),
            e @ BrokerError::Timeout(_) => ServerError::Unavailable(e.to_string()),
        }
    }
}

impl ServerError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            ServerError::Conflict(_) => StatusCode::CONFLICT,
            ServerError::NotFound(_) => StatusCode::NOT_FOUND,
            ServerError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            ServerError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The `{"error", "code"}` body sent to clients, over HTTP or WebSocket.
    pub fn body(&self) -> serde_json::Value {
        let message = match self {
            ServerError::Conflict(e)
            | ServerError::NotFound(e)
            | ServerError::InvalidRequest(e)
            | ServerError::Unavailable(e)
            | ServerError::Internal(e) => e,
        };

        serde_json::json!({
            "error": message,
            "code": self.status().as_u16(),
        })
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.body())).into_response()
    }
}

/// Result type alias for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
