//! Agent-side enforcement of the authorization protocol.
//!
//! For each sensitive call the gate files a request, then polls until a
//! terminal decision or the deadline. Every failure path resolves to a
//! denial: the gate never runs a sensitive tool without an approval.

use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;

use crate::authorization::{Broker, BrokerError, Decision, NewAuthorization, PollStatus};
use crate::capability::CapabilityTable;
use crate::tool::{ToolArgs, ToolCall, ToolCallResult, ToolExecutor};

/// Interval between status polls.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// How long the gate waits for a decision on a single call.
pub const DEFAULT_AUTHORIZATION_DEADLINE: Duration = Duration::from_secs(120);

/// Polling configuration for [`AuthorizationGate`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateConfig {
    pub poll_interval: Duration,
    pub deadline: Duration,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            deadline: DEFAULT_AUTHORIZATION_DEADLINE,
        }
    }
}

/// Why a sensitive call was not run.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DenialReason {
    #[error("Authorization denied by user.")]
    Denied,

    #[error("Authorization timed out after {}s.", .0.as_secs())]
    TimedOut(Duration),

    /// The record expired or was consumed elsewhere.
    #[error("Authorization request expired.")]
    Expired,

    #[error("Authorization unavailable: {0}")]
    Unavailable(String),
}

/// Result of authorizing one call.
#[derive(Debug, Clone, PartialEq)]
pub enum GateOutcome {
    /// Run the call with these arguments.
    Approved { arguments: ToolArgs, modified: bool },
    /// Do not run the call.
    Denied(DenialReason),
}

impl GateOutcome {
    pub fn is_approved(&self) -> bool {
        matches!(self, GateOutcome::Approved { .. })
    }
}

/// Blocks each sensitive call on a human decision.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use toolgate_core::authorization::{AuthorizationBroker, Decision};
/// use toolgate_core::{AuthorizationGate, CapabilityTable, GateOutcome, ToolCall};
///
/// # tokio_test::block_on(async {
/// let broker = Arc::new(AuthorizationBroker::new());
/// let gate = AuthorizationGate::new(
///     broker.clone(),
///     CapabilityTable::new().with_sensitive("send_email", "Sends mail"),
/// );
///
/// let args = serde_json::json!({"to": "x@y.com"}).as_object().cloned().unwrap();
/// let call = ToolCall::new("send_email", args.clone());
///
/// // A human approves from another task
/// let responder = broker.clone();
/// tokio::spawn(async move {
///     while responder.get_request_snapshot("s1").await.unwrap().is_none() {
///         tokio::task::yield_now().await;
///     }
///     responder.submit_decision("s1", Decision::Approved).await.unwrap();
/// });
///
/// let outcome = gate.authorize("s1", &call).await;
/// assert_eq!(outcome, GateOutcome::Approved { arguments: args, modified: false });
/// # });
/// ```
pub struct AuthorizationGate {
    broker: Arc<dyn Broker>,
    capabilities: CapabilityTable,
    config: GateConfig,
}

impl AuthorizationGate {
    pub fn new(broker: Arc<dyn Broker>, capabilities: CapabilityTable) -> Self {
        Self {
            broker,
            capabilities,
            config: GateConfig::default(),
        }
    }

    pub fn with_config(mut self, config: GateConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.config.poll_interval = interval;
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.config.deadline = deadline;
        self
    }

    pub fn config(&self) -> GateConfig {
        self.config
    }

    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    /// File a request for `call` and wait for a terminal outcome.
    ///
    /// Never fails: conflicts, an unreachable broker, expiry and the
    /// deadline all resolve to [`GateOutcome::Denied`].
    pub async fn authorize(&self, session_id: &str, call: &ToolCall) -> GateOutcome {
        let deadline = Instant::now() + self.config.deadline;

        let mut request = NewAuthorization::new(session_id, &call.name, call.arguments.clone());
        if let Some(justification) = self.capabilities.justification(&call.name) {
            request = request.with_justification(justification);
        }

        let outcome = match self.file(request, deadline).await {
            Ok(()) => self.wait_for_decision(session_id, call, deadline).await,
            Err(reason) => GateOutcome::Denied(reason),
        };

        match &outcome {
            GateOutcome::Approved { modified, .. } => {
                tracing::info!(session_id, tool = %call.name, call_id = %call.id, modified, "tool call approved");
            }
            GateOutcome::Denied(reason) => {
                tracing::info!(session_id, tool = %call.name, call_id = %call.id, %reason, "tool call denied");
            }
        }
        outcome
    }

    /// Authorize and run `calls` strictly one at a time, in order.
    ///
    /// Returns one result per call.
    pub async fn run(
        &self,
        session_id: &str,
        calls: &[ToolCall],
        executor: &dyn ToolExecutor,
    ) -> Vec<ToolCallResult> {
        let mut results = Vec::with_capacity(calls.len());
        for call in calls {
            let result = match self.authorize(session_id, call).await {
                GateOutcome::Approved { arguments, .. } => {
                    match executor.execute(&call.name, &arguments).await {
                        Ok(output) => ToolCallResult::success(call, output),
                        Err(e) => {
                            tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "approved tool call failed");
                            ToolCallResult::error(call, &e)
                        }
                    }
                }
                GateOutcome::Denied(reason) => ToolCallResult::denied(call, reason.to_string()),
            };
            results.push(result);
        }
        results
    }

    /// File `request`, retrying transport failures until the deadline.
    ///
    /// A failed attempt may still have reached the broker (only the reply
    /// was lost), so every retry first looks for the record it would create.
    /// Re-filing over it would discard a decision the human already made.
    async fn file(&self, request: NewAuthorization, deadline: Instant) -> Result<(), DenialReason> {
        let mut in_doubt = false;
        loop {
            let attempt = if in_doubt {
                match self.is_filed(&request).await {
                    Ok(true) => return Ok(()),
                    Ok(false) => self.broker.request_authorization(request.clone()).await,
                    Err(e) => Err(e),
                }
            } else {
                self.broker.request_authorization(request.clone()).await
            };

            match attempt {
                Ok(()) => return Ok(()),
                Err(e) if e.is_transient() => {
                    tracing::warn!(session_id = %request.session_id, error = %e, "broker unreachable while filing; retrying");
                    in_doubt = true;
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(DenialReason::Unavailable(e.to_string()));
                    }
                    tokio::time::sleep(self.config.poll_interval.min(deadline - now)).await;
                }
                Err(e @ BrokerError::Conflict(_)) if in_doubt => {
                    // The earlier attempt may have landed after the lookup
                    return match self.is_filed(&request).await {
                        Ok(true) => Ok(()),
                        _ => Err(DenialReason::Unavailable(e.to_string())),
                    };
                }
                Err(e) => return Err(DenialReason::Unavailable(e.to_string())),
            }
        }
    }

    /// Whether the session's live record is the one `request` describes.
    async fn is_filed(&self, request: &NewAuthorization) -> Result<bool, BrokerError> {
        Ok(self
            .broker
            .get_request_snapshot(&request.session_id)
            .await?
            .is_some_and(|record| {
                record.tool_name == request.tool_name && record.tool_args == request.tool_args
            }))
    }

    async fn wait_for_decision(&self, session_id: &str, call: &ToolCall, deadline: Instant) -> GateOutcome {
        loop {
            let last_error = match self.broker.poll_status(session_id).await {
                Ok(PollStatus::Resolved(decision)) => return apply(decision, call),
                Ok(PollStatus::Pending) => None,
                Err(BrokerError::NotFound(_)) => return GateOutcome::Denied(DenialReason::Expired),
                Err(e) if e.is_transient() => {
                    tracing::warn!(session_id, error = %e, "broker unreachable while polling; retrying");
                    Some(e)
                }
                Err(e) => return GateOutcome::Denied(DenialReason::Unavailable(e.to_string())),
            };

            let now = Instant::now();
            if now >= deadline {
                let reason = match last_error {
                    Some(e) => DenialReason::Unavailable(e.to_string()),
                    None => DenialReason::TimedOut(self.config.deadline),
                };
                return GateOutcome::Denied(reason);
            }
            self.broker
                .wait_for_update(session_id, self.config.poll_interval.min(deadline - now))
                .await;
        }
    }
}

fn apply(decision: Decision, call: &ToolCall) -> GateOutcome {
    match decision {
        Decision::Approved => GateOutcome::Approved {
            arguments: call.arguments.clone(),
            modified: false,
        },
        Decision::ApprovedModified(arguments) => GateOutcome::Approved {
            arguments,
            modified: true,
        },
        Decision::Denied => GateOutcome::Denied(DenialReason::Denied),
    }
}
