//! Shared fixtures for toolgate-core integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use toolgate_core::authorization::{
    AuthorizationBroker, AuthorizationRequest, Broker, BrokerError, Decision, NewAuthorization,
    PollStatus,
};
use toolgate_core::{ToolArgs, ToolError, ToolHandler};

pub fn args(value: Value) -> ToolArgs {
    value.as_object().cloned().expect("test args must be an object")
}

/// Echoes its arguments back as JSON and remembers them.
#[derive(Default)]
pub struct EchoTool {
    pub seen: Mutex<Vec<ToolArgs>>,
}

#[async_trait]
impl ToolHandler for EchoTool {
    async fn call(&self, args: &ToolArgs) -> Result<String, ToolError> {
        self.seen.lock().push(args.clone());
        Ok(Value::Object(args.clone()).to_string())
    }
}

/// Shared-ownership handle so a test can keep inspecting a registered tool.
pub struct Shared<T>(pub Arc<T>);

#[async_trait]
impl<T: ToolHandler> ToolHandler for Shared<T> {
    async fn call(&self, args: &ToolArgs) -> Result<String, ToolError> {
        self.0.call(args).await
    }
}

/// Always fails.
pub struct FailingTool(pub &'static str);

#[async_trait]
impl ToolHandler for FailingTool {
    async fn call(&self, _args: &ToolArgs) -> Result<String, ToolError> {
        Err(ToolError::Custom(self.0.to_string()))
    }
}

/// A broker that is unreachable for its first `failures` calls, then
/// delegates to an in-process broker.
pub struct FlakyBroker {
    pub inner: Arc<AuthorizationBroker>,
    failures: AtomicUsize,
    pub attempts: AtomicUsize,
}

impl FlakyBroker {
    pub fn new(inner: Arc<AuthorizationBroker>, failures: usize) -> Self {
        Self {
            inner,
            failures: AtomicUsize::new(failures),
            attempts: AtomicUsize::new(0),
        }
    }

    fn fail(&self) -> bool {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        self.failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl Broker for FlakyBroker {
    async fn request_authorization(&self, request: NewAuthorization) -> Result<(), BrokerError> {
        if self.fail() {
            return Err(BrokerError::Transport("connection reset".into()));
        }
        Broker::request_authorization(&*self.inner, request).await
    }

    async fn poll_status(&self, session_id: &str) -> Result<PollStatus, BrokerError> {
        if self.fail() {
            return Err(BrokerError::Transport("connection reset".into()));
        }
        self.inner.poll_status(session_id).await
    }

    async fn get_request_snapshot(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, BrokerError> {
        if self.fail() {
            return Err(BrokerError::Transport("connection reset".into()));
        }
        self.inner.get_request_snapshot(session_id).await
    }
}

/// Answer each pending request for `session` with the next scripted decision.
///
/// Returns the tool names in the order they were presented.
pub fn spawn_responder(
    broker: Arc<AuthorizationBroker>,
    session: &'static str,
    decisions: Vec<Decision>,
) -> tokio::task::JoinHandle<Vec<String>> {
    tokio::spawn(async move {
        let mut presented = Vec::new();
        for decision in decisions {
            let request = loop {
                if let Ok(Some(request)) = broker.get_request_snapshot(session).await {
                    if request.is_pending() {
                        break request;
                    }
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            };
            presented.push(request.tool_name.clone());
            broker
                .submit_decision(session, decision)
                .await
                .expect("decision should be recorded");
        }
        presented
    })
}

pub fn justifications() -> HashMap<&'static str, &'static str> {
    HashMap::from([
        ("send_gmail_message", "This will send an email from your account."),
        ("create_calendar_event", "This will create an event on your calendar."),
    ])
}
