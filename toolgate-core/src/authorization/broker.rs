//! The broker service: request, respond, status and snapshot operations.
//!
//! Per-session state machine:
//!
//! ```text
//! NONE --request--> PENDING --decision--> RESOLVED --poll--> NONE
//!                      |
//!                      +------ttl expiry------------------> NONE
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

use super::channel::{ChannelManager, PushOutcome};
use super::request::{AuthorizationRequest, Decision, PollStatus};
use super::store::{AuthorizationStore, MemoryAuthorizationStore, StoreError, DEFAULT_REQUEST_TTL};
use crate::tool::ToolArgs;

/// Errors surfaced by broker operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BrokerError {
    /// A request is already pending (or already decided) for the session.
    #[error("conflict: {0}")]
    Conflict(String),

    /// No live request exists for the session.
    #[error("not found: no authorization request for session '{0}'")]
    NotFound(String),

    /// The broker or its store could not be reached.
    #[error("broker unreachable: {0}")]
    Transport(String),

    /// No terminal decision arrived before the deadline.
    #[error("authorization timed out after {}s", .0.as_secs())]
    Timeout(Duration),
}

impl BrokerError {
    /// True if retrying the same call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, BrokerError::Transport(_))
    }
}

impl From<StoreError> for BrokerError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Conflict(session) => BrokerError::Conflict(format!(
                "authorization already pending for session '{}'",
                session
            )),
            StoreError::AlreadyDecided(session) => BrokerError::Conflict(format!(
                "authorization for session '{}' was already decided",
                session
            )),
            StoreError::NotFound(session) => BrokerError::NotFound(session),
            StoreError::Backend(msg) => BrokerError::Transport(msg),
        }
    }
}

/// A request to authorize one sensitive tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAuthorization {
    pub session_id: String,
    pub tool_name: String,
    #[serde(default)]
    pub tool_args: ToolArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

impl NewAuthorization {
    pub fn new(session_id: impl Into<String>, tool_name: impl Into<String>, tool_args: ToolArgs) -> Self {
        Self {
            session_id: session_id.into(),
            tool_name: tool_name.into(),
            tool_args,
            justification: None,
        }
    }

    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }
}

/// The broker operations the authorization gate depends on.
///
/// Implemented in-process by [`AuthorizationBroker`] and over HTTP by
/// `HttpBrokerClient` (feature `remote`).
#[async_trait]
pub trait Broker: Send + Sync {
    /// File a pending request and return without waiting for a decision.
    async fn request_authorization(&self, request: NewAuthorization) -> Result<(), BrokerError>;

    /// Consuming status read.
    ///
    /// Returns [`BrokerError::NotFound`] if no live request exists, which
    /// includes a request that expired or was already consumed.
    async fn poll_status(&self, session_id: &str) -> Result<PollStatus, BrokerError>;

    /// Non-consuming read of the session's live record, if any.
    async fn get_request_snapshot(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, BrokerError>;

    /// Wait until the session's status may have changed, at most `max_wait`.
    ///
    /// The default sleeps the full interval, which is the right thing across
    /// a network boundary.
    async fn wait_for_update(&self, session_id: &str, max_wait: Duration) {
        let _ = session_id;
        tokio::time::sleep(max_wait).await;
    }
}

/// Counts reported by the health endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokerHealth {
    /// Live authorization records (pending or decided but unconsumed).
    pub pending: usize,
    /// Connected push channels.
    pub channels: usize,
}

/// Coordinates the store and the push channels.
///
/// # Example
///
/// ```rust
/// use toolgate_core::authorization::{AuthorizationBroker, Decision, NewAuthorization, PollStatus};
///
/// # tokio_test::block_on(async {
/// let broker = AuthorizationBroker::new();
/// let args = serde_json::json!({"to": "x@y.com"}).as_object().cloned().unwrap();
///
/// broker
///     .request_authorization(NewAuthorization::new("s1", "send_email", args))
///     .await
///     .unwrap();
/// assert_eq!(broker.poll_status("s1").await.unwrap(), PollStatus::Pending);
///
/// broker.submit_decision("s1", Decision::Approved).await.unwrap();
/// assert_eq!(
///     broker.poll_status("s1").await.unwrap(),
///     PollStatus::Resolved(Decision::Approved)
/// );
///
/// // Consumed: a second poll finds nothing
/// assert!(broker.poll_status("s1").await.is_err());
/// # });
/// ```
pub struct AuthorizationBroker {
    store: Arc<dyn AuthorizationStore>,
    channels: Arc<ChannelManager>,
    ttl: Duration,
    waiters: DashMap<String, Arc<Notify>>,
}

impl AuthorizationBroker {
    /// Create a broker with an in-memory store, its own channel manager,
    /// and the default ttl.
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryAuthorizationStore::new()),
            channels: Arc::new(ChannelManager::new()),
            ttl: DEFAULT_REQUEST_TTL,
            waiters: DashMap::new(),
        }
    }

    /// Use a custom store.
    pub fn with_store(mut self, store: impl AuthorizationStore + 'static) -> Self {
        self.store = Arc::new(store);
        self
    }

    /// Use a shared channel manager.
    pub fn with_channels(mut self, channels: Arc<ChannelManager>) -> Self {
        self.channels = channels;
        self
    }

    /// Set how long a request may stay undecided.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    /// The ttl applied to new requests.
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The channel manager used for pushes.
    pub fn channels(&self) -> &Arc<ChannelManager> {
        &self.channels
    }

    /// File a pending request, push it to the session's client, and return.
    ///
    /// Fails with [`BrokerError::Conflict`] if a request is already pending
    /// for the session.
    pub async fn request_authorization(
        &self,
        request: NewAuthorization,
    ) -> Result<AuthorizationRequest, BrokerError> {
        let mut record = AuthorizationRequest::new(
            request.session_id,
            request.tool_name,
            request.tool_args,
            self.ttl,
        );
        record.justification = request.justification;

        if let Err(e) = self.store.put(record.clone()).await {
            tracing::warn!(
                session_id = %record.session_id,
                tool = %record.tool_name,
                error = %e,
                "authorization request rejected"
            );
            return Err(e.into());
        }
        tracing::info!(
            session_id = %record.session_id,
            tool = %record.tool_name,
            ttl_secs = self.ttl.as_secs(),
            "authorization requested"
        );

        let outcome = self.channels.push(&record.session_id, record.to_push());
        if outcome != PushOutcome::Delivered {
            tracing::debug!(session_id = %record.session_id, ?outcome, "authorization push not delivered");
        }
        Ok(record)
    }

    /// Record the human decision.
    ///
    /// Fails with [`BrokerError::NotFound`] if no live request exists and
    /// with [`BrokerError::Conflict`] if one was already decided (the first
    /// decision wins).
    pub async fn submit_decision(
        &self,
        session_id: &str,
        decision: Decision,
    ) -> Result<(), BrokerError> {
        let verdict = decision.verdict();
        let modified = decision.modified_args().is_some();
        self.store.resolve(session_id, decision).await?;

        tracing::info!(session_id, %verdict, modified, "authorization decided");
        self.waiter(session_id).notify_one();
        Ok(())
    }

    /// Consuming status read; see [`Broker::poll_status`].
    pub async fn poll_status(&self, session_id: &str) -> Result<PollStatus, BrokerError> {
        if let Some(record) = self.store.take_if_resolved(session_id).await? {
            self.waiters.remove(session_id);
            return match record.decision {
                Some(decision) => {
                    tracing::info!(session_id, verdict = %decision.verdict(), "authorization consumed");
                    Ok(PollStatus::Resolved(decision))
                }
                None => Err(BrokerError::Transport(format!(
                    "store returned an undecided record for session '{}'",
                    session_id
                ))),
            };
        }

        match self.store.get(session_id).await? {
            Some(_) => Ok(PollStatus::Pending),
            None => Err(BrokerError::NotFound(session_id.to_string())),
        }
    }

    /// Non-consuming read for a reconnecting client.
    pub async fn get_request_snapshot(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, BrokerError> {
        Ok(self.store.get(session_id).await?)
    }

    /// Reclaim expired records and idle waiters.
    pub async fn purge_expired(&self) -> Result<usize, BrokerError> {
        let removed = self.store.purge_expired().await?;
        self.waiters.retain(|_, notify| Arc::strong_count(notify) > 1);
        if removed > 0 {
            tracing::info!(removed, "expired authorization requests purged");
        }
        Ok(removed)
    }

    /// Live record and channel counts.
    pub async fn health(&self) -> Result<BrokerHealth, BrokerError> {
        Ok(BrokerHealth {
            pending: self.store.len().await?,
            channels: self.channels.len(),
        })
    }

    fn waiter(&self, session_id: &str) -> Arc<Notify> {
        self.waiters
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Notify::new()))
            .clone()
    }
}

impl Default for AuthorizationBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Broker for AuthorizationBroker {
    async fn request_authorization(&self, request: NewAuthorization) -> Result<(), BrokerError> {
        AuthorizationBroker::request_authorization(self, request)
            .await
            .map(|_| ())
    }

    async fn poll_status(&self, session_id: &str) -> Result<PollStatus, BrokerError> {
        AuthorizationBroker::poll_status(self, session_id).await
    }

    async fn get_request_snapshot(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, BrokerError> {
        AuthorizationBroker::get_request_snapshot(self, session_id).await
    }

    /// Wakes as soon as a decision is submitted, instead of sleeping blind.
    async fn wait_for_update(&self, session_id: &str, max_wait: Duration) {
        let notify = self.waiter(session_id);
        let _ = tokio::time::timeout(max_wait, notify.notified()).await;
    }
}
