//! # Toolgate
//!
//! Human-in-the-loop authorization for sensitive agent tool calls.
//!
//! When an agent asks to run a tool listed in its [`CapabilityTable`], the
//! call is held until a human approves it, approves it with edited
//! arguments, or denies it. Unrestricted tools run immediately.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use toolgate_core::authorization::AuthorizationBroker;
//! use toolgate_core::{AuthorizationGate, CapabilityTable, MixedToolExecutor, ToolRegistry};
//!
//! let broker = Arc::new(AuthorizationBroker::new());
//! let capabilities = CapabilityTable::new()
//!     .with_sensitive("send_email", "This will send an email on your behalf.");
//!
//! let gate = AuthorizationGate::new(broker.clone(), capabilities);
//! let executor = MixedToolExecutor::new(gate, Arc::new(ToolRegistry::new()));
//! # let _ = executor;
//! ```
//!
//! The human side talks to the same broker: it subscribes to push
//! notifications for its session and answers with
//! [`AuthorizationBroker::submit_decision`](authorization::AuthorizationBroker::submit_decision).
//! The `toolgate-server` crate exposes this over HTTP, WebSocket and SSE.
//!
//! ## Guarantees
//!
//! - At most one pending request per session.
//! - A decision is consumed by exactly one poller.
//! - The gate fails closed: conflicts, an unreachable broker, expiry and the
//!   deadline all deny the call.
//! - Approved-with-edits arguments replace the original arguments wholesale.
//!
//! ## Feature Flags
//!
//! - `remote` - [`HttpBrokerClient`](authorization::HttpBrokerClient) for a broker in another process (enabled by default)
//! - `test-utils` - Fakes for tests in downstream crates

pub mod authorization;
pub mod capability;
pub mod error;
pub mod executor;
pub mod gate;
pub mod tool;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use capability::CapabilityTable;
pub use error::{Error, Result};
pub use executor::{MixedToolExecutor, DEFAULT_MAX_CONCURRENT_TOOLS};
pub use gate::{
    AuthorizationGate, DenialReason, GateConfig, GateOutcome, DEFAULT_AUTHORIZATION_DEADLINE,
    DEFAULT_POLL_INTERVAL,
};
pub use tool::{
    ToolArgs, ToolCall, ToolCallResult, ToolCallStatus, ToolError, ToolExecutor, ToolHandler,
    ToolRegistry,
};
