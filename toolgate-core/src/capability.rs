//! Static capability table: which tools need a human decision.

use std::collections::HashMap;

/// Maps sensitive tool names to the justification shown to the approver.
///
/// A tool is sensitive if and only if it has an entry here. The lookup is
/// by name only; call arguments never influence classification.
///
/// # Example
///
/// ```rust
/// use toolgate_core::CapabilityTable;
///
/// let table = CapabilityTable::new()
///     .with_sensitive("send_email", "This will send an email on your behalf.");
///
/// assert!(table.is_sensitive("send_email"));
/// assert!(!table.is_sensitive("get_weather"));
/// assert_eq!(
///     table.justification("send_email"),
///     Some("This will send an email on your behalf.")
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct CapabilityTable {
    sensitive: HashMap<String, String>,
}

impl CapabilityTable {
    /// Create an empty table (every tool unrestricted).
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a tool as sensitive.
    pub fn with_sensitive(
        mut self,
        tool: impl Into<String>,
        justification: impl Into<String>,
    ) -> Self {
        self.insert(tool, justification);
        self
    }

    /// Mark a tool as sensitive, replacing any previous justification.
    pub fn insert(&mut self, tool: impl Into<String>, justification: impl Into<String>) {
        self.sensitive.insert(tool.into(), justification.into());
    }

    /// Whether a tool requires authorization.
    pub fn is_sensitive(&self, tool: &str) -> bool {
        self.sensitive.contains_key(tool)
    }

    /// Justification text for a sensitive tool.
    pub fn justification(&self, tool: &str) -> Option<&str> {
        self.sensitive.get(tool).map(String::as_str)
    }

    /// Number of sensitive tools.
    pub fn len(&self) -> usize {
        self.sensitive.len()
    }

    /// True if no tool is sensitive.
    pub fn is_empty(&self) -> bool {
        self.sensitive.is_empty()
    }
}

impl<K, V> FromIterator<(K, V)> for CapabilityTable
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            sensitive: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
