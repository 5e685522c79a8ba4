//! Test fakes for code built on toolgate-core.
//!
//! Enable with the `test-utils` feature:
//!
//! ```toml
//! [dev-dependencies]
//! toolgate-core = { version = "...", features = ["test-utils"] }
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::authorization::{AuthorizationRequest, Broker, BrokerError, NewAuthorization, PollStatus};
use crate::tool::{ToolArgs, ToolError, ToolExecutor};

/// A [`ToolExecutor`] that records every call and returns canned output.
///
/// Unknown tools succeed with `"<name> ok"` unless an output or failure was
/// configured for them.
///
/// ```rust,ignore
/// use toolgate_core::test_utils::RecordingExecutor;
/// use toolgate_core::{ToolArgs, ToolExecutor};
///
/// # tokio_test::block_on(async {
/// let executor = RecordingExecutor::new()
///     .with_output("get_weather", "sunny")
///     .with_failure("send_email", "smtp down");
///
/// assert_eq!(executor.execute("get_weather", &ToolArgs::new()).await.unwrap(), "sunny");
/// assert!(executor.execute("send_email", &ToolArgs::new()).await.is_err());
/// assert_eq!(executor.call_count(), 2);
/// # });
/// ```
#[derive(Default)]
pub struct RecordingExecutor {
    outputs: HashMap<String, String>,
    failures: HashMap<String, String>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(String, ToolArgs)>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return `output` for `tool`.
    pub fn with_output(mut self, tool: impl Into<String>, output: impl Into<String>) -> Self {
        self.outputs.insert(tool.into(), output.into());
        self
    }

    /// Fail `tool` with a custom error message.
    pub fn with_failure(mut self, tool: impl Into<String>, message: impl Into<String>) -> Self {
        self.failures.insert(tool.into(), message.into());
        self
    }

    /// Sleep before answering each call.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Every call so far, in the order received.
    pub fn calls(&self) -> Vec<(String, ToolArgs)> {
        self.calls.lock().clone()
    }

    /// Arguments of every call to `tool`.
    pub fn calls_for(&self, tool: &str) -> Vec<ToolArgs> {
        self.calls
            .lock()
            .iter()
            .filter(|(name, _)| name == tool)
            .map(|(_, args)| args.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl ToolExecutor for RecordingExecutor {
    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        self.calls.lock().push((name.to_string(), args.clone()));

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(message) = self.failures.get(name) {
            return Err(ToolError::Custom(message.clone()));
        }
        Ok(self
            .outputs
            .get(name)
            .cloned()
            .unwrap_or_else(|| format!("{} ok", name)))
    }
}

/// A [`Broker`] whose every call fails with [`BrokerError::Transport`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UnreachableBroker;

#[async_trait]
impl Broker for UnreachableBroker {
    async fn request_authorization(&self, _request: NewAuthorization) -> Result<(), BrokerError> {
        Err(BrokerError::Transport("connection refused".to_string()))
    }

    async fn poll_status(&self, _session_id: &str) -> Result<PollStatus, BrokerError> {
        Err(BrokerError::Transport("connection refused".to_string()))
    }

    async fn get_request_snapshot(
        &self,
        _session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, BrokerError> {
        Err(BrokerError::Transport("connection refused".to_string()))
    }
}
