//! Router builder for toolgate HTTP endpoints.

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use toolgate_core::authorization::AuthorizationBroker;
use tower_http::trace::TraceLayer;

use crate::error::BuildError;
use crate::handlers::{
    health_handler, request_handler, respond_handler, snapshot_handler, status_handler,
};
use crate::push::{events_handler, ws_handler};
use crate::state::AppState;

/// Default mount point of the WebSocket push channel.
pub const DEFAULT_WS_PATH: &str = "/ws";

/// Default mount point of the SSE push channel.
pub const DEFAULT_EVENTS_PATH: &str = "/events";

/// Builder for configuring toolgate HTTP endpoints.
///
/// The broker endpoints (`/auth/...`) and `/health` are always mounted.
/// The push transports are mounted at `<path>/:session_id` and can be
/// moved or turned off.
///
/// # Example
///
/// ```rust
/// use toolgate_core::authorization::AuthorizationBroker;
/// use toolgate_server::BrokerRouter;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let app = BrokerRouter::new(AuthorizationBroker::new())
///     .websocket_path("/push")
///     .without_sse()
///     .build()?;
/// # let _ = app;
/// # Ok(())
/// # }
/// # example().unwrap();
/// ```
pub struct BrokerRouter {
    broker: Arc<AuthorizationBroker>,
    ws_path: Option<String>,
    events_path: Option<String>,
    trace: bool,
}

impl BrokerRouter {
    /// Create a new router builder with the given broker.
    pub fn new(broker: AuthorizationBroker) -> Self {
        Self::from_arc(Arc::new(broker))
    }

    /// Create a new router builder from an existing `Arc<AuthorizationBroker>`.
    ///
    /// Use this when the sweeper or an in-process gate shares the broker.
    pub fn from_arc(broker: Arc<AuthorizationBroker>) -> Self {
        Self {
            broker,
            ws_path: Some(DEFAULT_WS_PATH.to_string()),
            events_path: Some(DEFAULT_EVENTS_PATH.to_string()),
            trace: true,
        }
    }

    /// Mount the WebSocket channel at `{path}/:session_id`.
    pub fn websocket_path(mut self, path: impl Into<String>) -> Self {
        self.ws_path = Some(path.into());
        self
    }

    /// Mount the SSE channel at `{path}/:session_id`.
    pub fn events_path(mut self, path: impl Into<String>) -> Self {
        self.events_path = Some(path.into());
        self
    }

    pub fn without_websocket(mut self) -> Self {
        self.ws_path = None;
        self
    }

    pub fn without_sse(mut self) -> Self {
        self.events_path = None;
        self
    }

    /// Skip the request tracing layer.
    pub fn without_trace(mut self) -> Self {
        self.trace = false;
        self
    }

    /// Build the router with all configured endpoints.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::InvalidPath`] for a transport path that does not
    /// start with `/`, and [`BuildError::DuplicatePath`] if both transports
    /// share a path or collide with the broker endpoints.
    pub fn build(self) -> Result<Router, BuildError> {
        let mut mounted: Vec<String> = vec!["/auth".to_string(), "/health".to_string()];
        for path in [&self.ws_path, &self.events_path].into_iter().flatten() {
            if !path.starts_with('/') {
                return Err(BuildError::InvalidPath(path.clone()));
            }
            let path = path.trim_end_matches('/').to_string();
            if mounted.contains(&path) {
                return Err(BuildError::DuplicatePath(path));
            }
            mounted.push(path);
        }

        let state = AppState::from_arc(self.broker);
        let mut router = Router::new()
            .route("/auth/request", post(request_handler))
            .route("/auth/respond", post(respond_handler))
            .route("/auth/status/:session_id", get(status_handler))
            .route("/auth/:session_id", get(snapshot_handler))
            .route("/health", get(health_handler));

        if let Some(path) = self.ws_path {
            router = router.route(&session_route(&path), get(ws_handler));
        }
        if let Some(path) = self.events_path {
            router = router.route(&session_route(&path), get(events_handler));
        }

        let router = router.with_state(state);
        Ok(if self.trace {
            router.layer(TraceLayer::new_for_http())
        } else {
            router
        })
    }

    /// Build the router and nest it under a prefix path.
    ///
    /// # Example
    ///
    /// ```rust
    /// # use toolgate_core::authorization::AuthorizationBroker;
    /// # use toolgate_server::BrokerRouter;
    /// # use axum::Router;
    /// # fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// // Broker endpoints at /broker/auth/..., push at /broker/ws/:session_id
    /// let broker = BrokerRouter::new(AuthorizationBroker::new()).build_nested("/broker")?;
    ///
    /// let app = Router::new().merge(broker);
    /// # let _ = app;
    /// # Ok(())
    /// # }
    /// # example().unwrap();
    /// ```
    pub fn build_nested(self, prefix: impl Into<String>) -> Result<Router, BuildError> {
        Ok(Router::new().nest(&prefix.into(), self.build()?))
    }
}

fn session_route(path: &str) -> String {
    format!("{}/:session_id", path.trim_end_matches('/'))
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
