//! HTTP server for the toolgate authorization broker.
//!
//! Exposes an [`AuthorizationBroker`](toolgate_core::authorization::AuthorizationBroker)
//! to agents (request, status) and to the human-facing client (respond,
//! snapshot, and a push channel over WebSocket or Server-Sent Events).
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | POST | `/auth/request` | file a request (202, or 409 if one is pending) |
//! | POST | `/auth/respond` | record a decision (200, 404, 409) |
//! | GET | `/auth/status/:session_id` | consuming status poll (200, 404) |
//! | GET | `/auth/:session_id` | non-consuming snapshot, `null` if none |
//! | GET | `/ws/:session_id` | WebSocket push channel, also accepts decisions |
//! | GET | `/events/:session_id` | SSE push channel |
//! | GET | `/health` | liveness and counts |
//!
//! # Example
//!
//! ```rust,no_run
//! use toolgate_core::authorization::AuthorizationBroker;
//! use toolgate_server::BrokerRouter;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let app = BrokerRouter::new(AuthorizationBroker::new()).build()?;
//!
//! let listener = tokio::net::TcpListener::bind("127.0.0.1:8000").await?;
//! axum::serve(listener, app).await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod error;
pub(crate) mod handlers;
pub(crate) mod push;
pub mod router;
pub mod serve;
pub(crate) mod state;
pub mod sweeper;

// Re-exports
pub use error::{BuildError, ServerError, ServerResult};
pub use push::AUTHORIZATION_EVENT;
pub use router::{BrokerRouter, DEFAULT_EVENTS_PATH, DEFAULT_WS_PATH};
pub use serve::{serve, ServeConfig};
pub use sweeper::{spawn_sweeper, DEFAULT_SWEEP_INTERVAL};
