//! Tool call types and the executor contract.
//!
//! The broker never implements tools itself. It consumes a single
//! collaborator, [`ToolExecutor`], which runs a named tool with a JSON
//! argument object and returns text or an error.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Arguments for a tool call: a JSON object.
pub type ToolArgs = Map<String, Value>;

/// A tool call requested by the model.
///
/// Sensitivity is not stored on the call; it is looked up in a
/// [`CapabilityTable`](crate::CapabilityTable) by name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Unique ID for this call (used to match with its result)
    pub id: String,
    /// Tool name
    pub name: String,
    /// Arguments as a JSON object
    #[serde(default)]
    pub arguments: ToolArgs,
}

impl ToolCall {
    /// Create a call with a freshly generated ID.
    pub fn new(name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self::with_id(uuid::Uuid::new_v4().to_string(), name, arguments)
    }

    /// Create a call with an explicit ID.
    pub fn with_id(id: impl Into<String>, name: impl Into<String>, arguments: ToolArgs) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Build a call from a JSON value, rejecting anything that is not an object.
    pub fn from_value(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Result<Self, ToolError> {
        match arguments {
            Value::Object(map) => Ok(Self::with_id(id, name, map)),
            other => Err(ToolError::InvalidArguments(format!(
                "tool arguments must be a JSON object, got: {}",
                json_type_name(&other)
            ))),
        }
    }
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Status of a tool call result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolCallStatus {
    /// The tool ran and returned output.
    Success,
    /// The tool ran (or was looked up) and failed.
    Error,
    /// The tool was never run because authorization was not granted.
    Denied,
}

/// The outcome of one requested tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallResult {
    /// ID of the call this is a result for
    pub call_id: String,
    /// Tool name
    pub name: String,
    /// Text reported back to the model
    pub output: String,
    /// How the call ended
    pub status: ToolCallStatus,
}

impl ToolCallResult {
    /// Successful execution.
    pub fn success(call: &ToolCall, output: impl Into<String>) -> Self {
        Self::new(call, output, ToolCallStatus::Success)
    }

    /// Failed execution, formatted as `Error executing <name>: <error>`.
    pub fn error(call: &ToolCall, error: &ToolError) -> Self {
        Self::new(
            call,
            format!("Error executing {}: {}", call.name, error),
            ToolCallStatus::Error,
        )
    }

    /// Call that was not executed because authorization was refused.
    pub fn denied(call: &ToolCall, reason: impl Into<String>) -> Self {
        Self::new(call, reason, ToolCallStatus::Denied)
    }

    fn new(call: &ToolCall, output: impl Into<String>, status: ToolCallStatus) -> Self {
        Self {
            call_id: call.id.clone(),
            name: call.name.clone(),
            output: output.into(),
            status,
        }
    }

    /// True if the tool ran successfully.
    pub fn is_success(&self) -> bool {
        self.status == ToolCallStatus::Success
    }

    /// True if authorization was refused.
    pub fn is_denied(&self) -> bool {
        self.status == ToolCallStatus::Denied
    }
}

/// Errors that can occur during tool execution
#[derive(Debug, thiserror::Error)]
pub enum ToolError {
    #[error("tool not found: {0}")]
    NotFound(String),

    #[error("invalid arguments: {0}")]
    InvalidArguments(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("{0}")]
    Custom(String),
}

impl From<String> for ToolError {
    fn from(s: String) -> Self {
        Self::Custom(s)
    }
}

impl From<&str> for ToolError {
    fn from(s: &str) -> Self {
        Self::Custom(s.to_string())
    }
}

/// Runs tools by name.
///
/// This is the only contract the broker has with concrete tool
/// implementations (email, calendar, shell, ...).
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Execute `name` with `args`, returning text output.
    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError>;
}

#[async_trait]
impl<T: ToolExecutor + ?Sized> ToolExecutor for Arc<T> {
    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        (**self).execute(name, args).await
    }
}

/// A single named tool implementation registered with a [`ToolRegistry`].
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Run the tool.
    async fn call(&self, args: &ToolArgs) -> Result<String, ToolError>;
}

/// A [`ToolExecutor`] backed by a map of named handlers.
///
/// # Example
///
/// ```rust
/// use toolgate_core::{ToolArgs, ToolError, ToolExecutor, ToolHandler, ToolRegistry};
///
/// struct Echo;
///
/// #[async_trait::async_trait]
/// impl ToolHandler for Echo {
///     async fn call(&self, args: &ToolArgs) -> Result<String, ToolError> {
///         Ok(serde_json::Value::Object(args.clone()).to_string())
///     }
/// }
///
/// # tokio_test::block_on(async {
/// let registry = ToolRegistry::new();
/// registry.register("echo", Echo);
///
/// let out = registry.execute("echo", &ToolArgs::new()).await.unwrap();
/// assert_eq!(out, "{}");
/// assert!(registry.execute("missing", &ToolArgs::new()).await.is_err());
/// # });
/// ```
#[derive(Default)]
pub struct ToolRegistry {
    handlers: RwLock<HashMap<String, Arc<dyn ToolHandler>>>,
}

impl ToolRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler, replacing any existing handler with the same name.
    pub fn register(&self, name: impl Into<String>, handler: impl ToolHandler + 'static) {
        let name = name.into();
        if self
            .handlers
            .write()
            .insert(name.clone(), Arc::new(handler))
            .is_some()
        {
            tracing::warn!(tool = %name, "replaced existing tool handler");
        }
    }

    /// Names of all registered tools.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.handlers.read().keys().cloned().collect();
        names.sort();
        names
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, name: &str, args: &ToolArgs) -> Result<String, ToolError> {
        // Clone the handler out so the lock is not held across the await
        let handler = self
            .handlers
            .read()
            .get(name)
            .cloned()
            .ok_or_else(|| ToolError::NotFound(name.to_string()))?;
        handler.call(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    struct Upper;

    #[async_trait]
    impl ToolHandler for Upper {
        async fn call(&self, args: &ToolArgs) -> Result<String, ToolError> {
            let text = args
                .get("text")
                .and_then(Value::as_str)
                .ok_or_else(|| ToolError::InvalidArguments("missing text".into()))?;
            Ok(text.to_uppercase())
        }
    }

    fn args(value: Value) -> ToolArgs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_tool_call_new_generates_unique_ids() {
        let a = ToolCall::new("echo", ToolArgs::new());
        let b = ToolCall::new("echo", ToolArgs::new());
        assert_ne!(a.id, b.id);
        assert_eq!(a.name, "echo");
    }

    #[test]
    fn test_tool_call_from_value_rejects_non_objects() {
        let err = ToolCall::from_value("1", "echo", json!([1, 2])).unwrap_err();
        assert!(err.to_string().contains("array"));

        let call = ToolCall::from_value("1", "echo", json!({"a": 1})).unwrap();
        assert_eq!(call.arguments["a"], 1);
    }

    #[test]
    fn test_tool_call_deserializes_without_arguments() {
        let call: ToolCall = serde_json::from_str(r#"{"id": "c1", "name": "list"}"#).unwrap();
        assert!(call.arguments.is_empty());
    }

    #[test]
    fn test_result_constructors() {
        let call = ToolCall::with_id("c1", "send_email", ToolArgs::new());

        let ok = ToolCallResult::success(&call, "sent");
        assert!(ok.is_success());
        assert_eq!(ok.call_id, "c1");

        let err = ToolCallResult::error(&call, &ToolError::Custom("smtp down".into()));
        assert_eq!(err.status, ToolCallStatus::Error);
        assert_eq!(err.output, "Error executing send_email: smtp down");

        let denied = ToolCallResult::denied(&call, "nope");
        assert!(denied.is_denied());
        assert_eq!(denied.output, "nope");
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(
            serde_json::to_string(&ToolCallStatus::Denied).unwrap(),
            "\"denied\""
        );
    }

    #[tokio::test]
    async fn test_registry_dispatches_by_name() {
        let registry = ToolRegistry::new();
        registry.register("upper", Upper);

        let out = registry
            .execute("upper", &args(json!({"text": "hi"})))
            .await
            .unwrap();
        assert_eq!(out, "HI");
        assert_eq!(registry.names(), vec!["upper".to_string()]);
    }

    #[tokio::test]
    async fn test_registry_unknown_tool() {
        let registry = ToolRegistry::new();
        let err = registry.execute("ghost", &ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::NotFound(ref n) if n == "ghost"));
    }

    #[tokio::test]
    async fn test_registry_handler_error_propagates() {
        let registry = ToolRegistry::new();
        registry.register("upper", Upper);
        let err = registry.execute("upper", &ToolArgs::new()).await.unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments(_)));
    }
}
