//! Splits a turn's tool calls between immediate execution and the gate.

use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::gate::AuthorizationGate;
use crate::tool::{ToolCall, ToolCallResult, ToolExecutor};

/// Default number of unrestricted calls run concurrently.
pub const DEFAULT_MAX_CONCURRENT_TOOLS: usize = 8;

/// Runs one agent turn's tool calls.
///
/// Unrestricted calls run immediately, up to `max_concurrent_tools` at a
/// time. Sensitive calls (those in the gate's capability table) go through
/// the [`AuthorizationGate`] one at a time, in the order requested. Both
/// groups proceed concurrently and every input call yields exactly one
/// result. Results are not returned in input order.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use toolgate_core::authorization::AuthorizationBroker;
/// use toolgate_core::{
///     AuthorizationGate, CapabilityTable, MixedToolExecutor, ToolArgs, ToolCall, ToolError,
///     ToolHandler, ToolRegistry,
/// };
///
/// struct Weather;
///
/// #[async_trait::async_trait]
/// impl ToolHandler for Weather {
///     async fn call(&self, _args: &ToolArgs) -> Result<String, ToolError> {
///         Ok("sunny".into())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let registry = Arc::new(ToolRegistry::new());
/// registry.register("get_weather", Weather);
///
/// let gate = AuthorizationGate::new(
///     Arc::new(AuthorizationBroker::new()),
///     CapabilityTable::new().with_sensitive("send_email", "Sends mail"),
/// );
/// let executor = MixedToolExecutor::new(gate, registry);
///
/// let results = executor
///     .execute_turn("s1", vec![ToolCall::new("get_weather", ToolArgs::new())])
///     .await;
/// assert_eq!(results[0].output, "sunny");
/// # });
/// ```
pub struct MixedToolExecutor {
    gate: AuthorizationGate,
    executor: Arc<dyn ToolExecutor>,
    max_concurrent_tools: usize,
}

impl MixedToolExecutor {
    pub fn new(gate: AuthorizationGate, executor: Arc<dyn ToolExecutor>) -> Self {
        Self {
            gate,
            executor,
            max_concurrent_tools: DEFAULT_MAX_CONCURRENT_TOOLS,
        }
    }

    /// Limit how many unrestricted calls run at once.
    pub fn with_max_concurrent_tools(mut self, max: usize) -> Self {
        self.max_concurrent_tools = max.max(1);
        self
    }

    pub fn gate(&self) -> &AuthorizationGate {
        &self.gate
    }

    /// Split `calls` into `(unrestricted, gated)`, preserving relative order.
    pub fn classify(&self, calls: Vec<ToolCall>) -> (Vec<ToolCall>, Vec<ToolCall>) {
        let capabilities = self.gate.capabilities();
        calls
            .into_iter()
            .partition(|call| !capabilities.is_sensitive(&call.name))
    }

    /// Execute every call of one turn and collect one result per call.
    pub async fn execute_turn(&self, session_id: &str, calls: Vec<ToolCall>) -> Vec<ToolCallResult> {
        let (unrestricted, gated) = self.classify(calls);
        tracing::debug!(
            session_id,
            unrestricted = unrestricted.len(),
            gated = gated.len(),
            "executing tool calls"
        );

        let immediate = stream::iter(unrestricted.iter().map(|call| self.execute_unrestricted(call)))
            .buffer_unordered(self.max_concurrent_tools)
            .collect::<Vec<_>>();
        let authorized = self.gate.run(session_id, &gated, self.executor.as_ref());

        let (mut results, gated_results) = futures::join!(immediate, authorized);
        results.extend(gated_results);
        results
    }

    async fn execute_unrestricted(&self, call: &ToolCall) -> ToolCallResult {
        match self.executor.execute(&call.name, &call.arguments).await {
            Ok(output) => ToolCallResult::success(call, output),
            Err(e) => {
                tracing::warn!(tool = %call.name, call_id = %call.id, error = %e, "tool call failed");
                ToolCallResult::error(call, &e)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorization::{AuthorizationBroker, Decision};
    use crate::capability::CapabilityTable;
    use crate::test_utils::{RecordingExecutor, UnreachableBroker};
    use crate::tool::{ToolArgs, ToolCallStatus};
    use serde_json::json;
    use std::collections::HashSet;
    use std::time::Duration;

    fn args(value: serde_json::Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    fn capabilities() -> CapabilityTable {
        CapabilityTable::new().with_sensitive("send_email", "This will send an email.")
    }

    #[tokio::test]
    async fn test_classify_by_name_only() {
        let gate = AuthorizationGate::new(Arc::new(AuthorizationBroker::new()), capabilities());
        let executor = MixedToolExecutor::new(gate, Arc::new(RecordingExecutor::new()));

        let (unrestricted, gated) = executor.classify(vec![
            ToolCall::new("get_weather", ToolArgs::new()),
            ToolCall::new("send_email", args(json!({"to": "x@y.com"}))),
            ToolCall::new("get_time", ToolArgs::new()),
        ]);
        assert_eq!(unrestricted.len(), 2);
        assert_eq!(gated.len(), 1);
        assert_eq!(gated[0].name, "send_email");
    }

    #[tokio::test]
    async fn test_unrestricted_failure_does_not_abort_siblings() {
        let recorder = Arc::new(RecordingExecutor::new().with_failure("flaky", "disk full"));
        let gate = AuthorizationGate::new(Arc::new(AuthorizationBroker::new()), capabilities());
        let executor = MixedToolExecutor::new(gate, recorder.clone());

        let calls = vec![
            ToolCall::with_id("c1", "get_weather", ToolArgs::new()),
            ToolCall::with_id("c2", "flaky", ToolArgs::new()),
            ToolCall::with_id("c3", "get_time", ToolArgs::new()),
        ];
        let results = executor.execute_turn("s1", calls).await;

        assert_eq!(results.len(), 3);
        let failed = results.iter().find(|r| r.call_id == "c2").unwrap();
        assert_eq!(failed.status, ToolCallStatus::Error);
        assert_eq!(failed.output, "Error executing flaky: disk full");
        assert_eq!(results.iter().filter(|r| r.is_success()).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrestricted_calls_overlap_with_pending_gate() {
        let broker = Arc::new(AuthorizationBroker::new());
        let recorder = Arc::new(RecordingExecutor::new().with_delay(Duration::from_secs(5)));
        let gate = AuthorizationGate::new(broker.clone(), capabilities());
        let executor = MixedToolExecutor::new(gate, recorder.clone());

        // Approve two seconds after the request shows up
        let responder = broker.clone();
        tokio::spawn(async move {
            while responder.get_request_snapshot("s1").await.unwrap().is_none() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(Duration::from_secs(2)).await;
            responder.submit_decision("s1", Decision::Approved).await.unwrap();
        });

        let start = tokio::time::Instant::now();
        let results = executor
            .execute_turn(
                "s1",
                vec![
                    ToolCall::with_id("u1", "get_weather", ToolArgs::new()),
                    ToolCall::with_id("g1", "send_email", args(json!({"to": "x@y.com"}))),
                    ToolCall::with_id("u2", "get_time", ToolArgs::new()),
                    ToolCall::with_id("u3", "get_news", ToolArgs::new()),
                ],
            )
            .await;

        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.is_success()));
        // Run one after another this would take 20s; the gated call's wait
        // and execution overlap the unrestricted batch
        assert!(start.elapsed() < Duration::from_secs(8));
        assert_eq!(recorder.call_count(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_mixed_turn_with_unreachable_broker() {
        let recorder = Arc::new(RecordingExecutor::new());
        let gate = AuthorizationGate::new(Arc::new(UnreachableBroker), capabilities())
            .with_deadline(Duration::from_secs(3));
        let executor = MixedToolExecutor::new(gate, recorder.clone());

        let results = executor
            .execute_turn(
                "s1",
                vec![
                    ToolCall::with_id("u1", "get_weather", ToolArgs::new()),
                    ToolCall::with_id("g1", "send_email", args(json!({"to": "x@y.com"}))),
                ],
            )
            .await;

        let ids: HashSet<_> = results.iter().map(|r| r.call_id.as_str()).collect();
        assert_eq!(ids, HashSet::from(["u1", "g1"]));

        let gated = results.iter().find(|r| r.call_id == "g1").unwrap();
        assert!(gated.is_denied());
        assert!(gated.output.starts_with("Authorization unavailable:"));

        // Fail closed: the sensitive tool never ran
        assert_eq!(recorder.calls_for("send_email").len(), 0);
        assert_eq!(recorder.calls_for("get_weather").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_gated_calls_run_in_order_with_decided_args() {
        let broker = Arc::new(AuthorizationBroker::new());
        let recorder = Arc::new(RecordingExecutor::new());
        let gate = AuthorizationGate::new(broker.clone(), capabilities());
        let executor = MixedToolExecutor::new(gate, recorder.clone());

        let responder = {
            let broker = broker.clone();
            tokio::spawn(async move {
                let decisions = [
                    Decision::ApprovedModified(args(json!({"to": "z@y.com"}))),
                    Decision::Denied,
                ];
                for decision in decisions {
                    loop {
                        if let Ok(Some(request)) = broker.get_request_snapshot("s1").await {
                            if request.is_pending() {
                                break;
                            }
                        }
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                    broker.submit_decision("s1", decision).await.unwrap();
                }
            })
        };

        let results = executor
            .execute_turn(
                "s1",
                vec![
                    ToolCall::with_id("g1", "send_email", args(json!({"to": "x@y.com"}))),
                    ToolCall::with_id("g2", "send_email", args(json!({"to": "w@y.com"}))),
                ],
            )
            .await;
        responder.await.unwrap();

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].call_id, "g1");
        assert!(results[0].is_success());
        assert_eq!(results[1].call_id, "g2");
        assert_eq!(results[1].output, "Authorization denied by user.");

        assert_eq!(
            recorder.calls_for("send_email"),
            vec![args(json!({"to": "z@y.com"}))]
        );
    }
}
