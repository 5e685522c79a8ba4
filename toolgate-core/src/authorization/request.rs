//! Authorization record types and wire payloads.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::tool::ToolArgs;

/// A terminal decision made by the human responder.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Run the call with its original arguments.
    Approved,
    /// Run the call with these arguments instead (full replacement, no merge).
    ApprovedModified(ToolArgs),
    /// Do not run the call.
    Denied,
}

impl Decision {
    /// Build a decision from a wire verdict plus optional replacement args.
    ///
    /// Replacement args are ignored on a deny. An empty replacement object
    /// counts as a plain approval rather than wiping every argument.
    pub fn from_verdict(verdict: Verdict, modified_args: Option<ToolArgs>) -> Self {
        match (verdict, modified_args) {
            (Verdict::Approve, Some(args)) if !args.is_empty() => Decision::ApprovedModified(args),
            (Verdict::Approve, _) => Decision::Approved,
            (Verdict::Deny, _) => Decision::Denied,
        }
    }

    /// The wire verdict for this decision.
    pub fn verdict(&self) -> Verdict {
        match self {
            Decision::Approved | Decision::ApprovedModified(_) => Verdict::Approve,
            Decision::Denied => Verdict::Deny,
        }
    }

    /// Replacement args, if the approver supplied any.
    pub fn modified_args(&self) -> Option<&ToolArgs> {
        match self {
            Decision::ApprovedModified(args) => Some(args),
            _ => None,
        }
    }

    /// True for either approval variant.
    pub fn is_approved(&self) -> bool {
        self.verdict() == Verdict::Approve
    }
}

/// Wire form of a decision: `"approve"` or `"deny"`.
///
/// The single-letter codes `"A"` and `"D"` are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    #[serde(alias = "A", alias = "a", alias = "approved")]
    Approve,
    #[serde(alias = "D", alias = "d", alias = "denied")]
    Deny,
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::Approve => write!(f, "approve"),
            Verdict::Deny => write!(f, "deny"),
        }
    }
}

/// One authorization record. At most one exists per session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRequest {
    /// Session this request belongs to.
    pub session_id: String,
    /// Tool awaiting a decision.
    pub tool_name: String,
    /// Arguments as the model requested them.
    pub tool_args: ToolArgs,
    /// Capability-table text explaining why approval is needed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
    /// When the request was filed.
    pub created_at: DateTime<Utc>,
    /// How long the request may stay undecided.
    #[serde(rename = "ttl_secs", with = "duration_secs")]
    pub ttl: Duration,
    /// `None` while pending.
    #[serde(
        default,
        serialize_with = "serialize_decision",
        deserialize_with = "deserialize_decision",
        skip_serializing_if = "Option::is_none"
    )]
    pub decision: Option<Decision>,
}

impl AuthorizationRequest {
    /// Create a pending request.
    pub fn new(
        session_id: impl Into<String>,
        tool_name: impl Into<String>,
        tool_args: ToolArgs,
        ttl: Duration,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            tool_name: tool_name.into(),
            tool_args,
            justification: None,
            created_at: Utc::now(),
            ttl,
            decision: None,
        }
    }

    /// Attach the approver-facing justification.
    pub fn with_justification(mut self, justification: impl Into<String>) -> Self {
        self.justification = Some(justification.into());
        self
    }

    /// True until a terminal decision is recorded.
    pub fn is_pending(&self) -> bool {
        self.decision.is_none()
    }

    /// The push payload announcing this request.
    pub fn to_push(&self) -> PushMessage {
        PushMessage {
            session_id: self.session_id.clone(),
            tool_name: self.tool_name.clone(),
            tool_args: self.tool_args.clone(),
            justification: self.justification.clone(),
        }
    }
}

/// Message pushed to the human-facing client when a request is filed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushMessage {
    pub session_id: String,
    pub tool_name: String,
    pub tool_args: ToolArgs,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub justification: Option<String>,
}

/// Result of a consuming status poll.
#[derive(Debug, Clone, PartialEq)]
pub enum PollStatus {
    /// No decision yet; the record is untouched.
    Pending,
    /// Terminal decision. The record has been deleted.
    Resolved(Decision),
}

impl PollStatus {
    /// The terminal decision, if any.
    pub fn decision(&self) -> Option<&Decision> {
        match self {
            PollStatus::Pending => None,
            PollStatus::Resolved(decision) => Some(decision),
        }
    }
}

/// Wire form of [`PollStatus`]: `{"decision": null}` while pending,
/// `{"decision": "approve", "tool_args": {...}|null}` once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub decision: Option<Verdict>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<ToolArgs>,
}

impl From<&PollStatus> for StatusResponse {
    fn from(status: &PollStatus) -> Self {
        match status {
            PollStatus::Pending => Self {
                decision: None,
                tool_args: None,
            },
            PollStatus::Resolved(decision) => Self {
                decision: Some(decision.verdict()),
                tool_args: decision.modified_args().cloned(),
            },
        }
    }
}

impl From<StatusResponse> for PollStatus {
    fn from(response: StatusResponse) -> Self {
        match response.decision {
            None => PollStatus::Pending,
            Some(verdict) => PollStatus::Resolved(Decision::from_verdict(verdict, response.tool_args)),
        }
    }
}

/// Body of `POST /auth/respond`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RespondRequest {
    pub session_id: String,
    pub decision: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_args: Option<ToolArgs>,
}

impl RespondRequest {
    /// Wire body for a decision.
    pub fn new(session_id: impl Into<String>, decision: &Decision) -> Self {
        Self {
            session_id: session_id.into(),
            decision: decision.verdict(),
            tool_args: decision.modified_args().cloned(),
        }
    }

    /// The typed decision this body carries.
    pub fn decision(&self) -> Decision {
        Decision::from_verdict(self.decision, self.tool_args.clone())
    }
}

#[derive(Serialize, Deserialize)]
struct DecisionRepr {
    verdict: Verdict,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tool_args: Option<ToolArgs>,
}

fn serialize_decision<S: Serializer>(
    decision: &Option<Decision>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    decision
        .as_ref()
        .map(|d| DecisionRepr {
            verdict: d.verdict(),
            tool_args: d.modified_args().cloned(),
        })
        .serialize(serializer)
}

fn deserialize_decision<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Decision>, D::Error> {
    let repr = Option::<DecisionRepr>::deserialize(deserializer)?;
    Ok(repr.map(|r| Decision::from_verdict(r.verdict, r.tool_args)))
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}
