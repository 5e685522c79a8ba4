//! Application state for the toolgate server.

use std::sync::Arc;

use toolgate_core::authorization::AuthorizationBroker;

/// Shared application state containing the broker.
///
/// Cloned for each request handler.
#[derive(Clone)]
pub struct AppState {
    pub broker: Arc<AuthorizationBroker>,
}

impl AppState {
    pub fn from_arc(broker: Arc<AuthorizationBroker>) -> Self {
        Self { broker }
    }
}
