//! Authorization store trait and the in-memory implementation.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::time::Instant;

use super::request::{AuthorizationRequest, Decision};

/// Default lifetime of an undecided request (10 minutes).
pub const DEFAULT_REQUEST_TTL: Duration = Duration::from_secs(600);

/// Errors that can occur in authorization store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// A pending request already exists for the session.
    #[error("authorization already pending for session '{0}'")]
    Conflict(String),

    /// No live request exists for the session.
    #[error("no authorization request for session '{0}'")]
    NotFound(String),

    /// The request already carries a terminal decision.
    #[error("authorization for session '{0}' was already decided")]
    AlreadyDecided(String),

    /// The backing store failed.
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Keyed, TTL-bounded holder of at most one authorization record per session.
///
/// Records past their ttl must be invisible to every operation, whether or
/// not they have been physically removed yet.
#[async_trait]
pub trait AuthorizationStore: Send + Sync {
    /// Store a new pending request.
    ///
    /// Fails with [`StoreError::Conflict`] if a pending request exists for the
    /// same session. A decided but unconsumed record is replaced.
    async fn put(&self, request: AuthorizationRequest) -> Result<(), StoreError>;

    /// Non-consuming read.
    async fn get(&self, session_id: &str) -> Result<Option<AuthorizationRequest>, StoreError>;

    /// Record a terminal decision, keeping the remaining ttl.
    async fn resolve(&self, session_id: &str, decision: Decision) -> Result<(), StoreError>;

    /// Atomically return and delete the record iff it carries a decision.
    ///
    /// Returns `None` (and leaves the record untouched) while pending, and
    /// `None` when no live record exists. Of any number of concurrent
    /// callers, at most one receives a given decision.
    async fn take_if_resolved(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, StoreError>;

    /// Physically remove expired records, returning how many were removed.
    async fn purge_expired(&self) -> Result<usize, StoreError>;

    /// Number of live records.
    async fn len(&self) -> Result<usize, StoreError>;
}

struct StoredRequest {
    request: AuthorizationRequest,
    expires_at: Instant,
}

impl StoredRequest {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// In-memory authorization store.
///
/// Backed by a sharded concurrent map, so each operation locks only the
/// shard holding its session. Expiry is lazy; call
/// [`purge_expired`](AuthorizationStore::purge_expired) periodically to
/// reclaim memory.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use toolgate_core::authorization::{
///     AuthorizationRequest, AuthorizationStore, Decision, MemoryAuthorizationStore,
/// };
///
/// # tokio_test::block_on(async {
/// let store = MemoryAuthorizationStore::new();
/// let request = AuthorizationRequest::new("s1", "send_email", Default::default(), Duration::from_secs(60));
/// store.put(request).await.unwrap();
///
/// // Nothing to take while pending
/// assert!(store.take_if_resolved("s1").await.unwrap().is_none());
///
/// store.resolve("s1", Decision::Approved).await.unwrap();
/// let taken = store.take_if_resolved("s1").await.unwrap().unwrap();
/// assert_eq!(taken.decision, Some(Decision::Approved));
///
/// // Consumed exactly once
/// assert!(store.get("s1").await.unwrap().is_none());
/// # });
/// ```
#[derive(Default)]
pub struct MemoryAuthorizationStore {
    entries: DashMap<String, StoredRequest>,
}

impl MemoryAuthorizationStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthorizationStore for MemoryAuthorizationStore {
    async fn put(&self, request: AuthorizationRequest) -> Result<(), StoreError> {
        let now = Instant::now();
        let expires_at = now.checked_add(request.ttl).ok_or_else(|| {
            StoreError::Backend(format!("ttl of {}s is out of range", request.ttl.as_secs()))
        })?;
        let stored = StoredRequest { expires_at, request };

        match self.entries.entry(stored.request.session_id.clone()) {
            Entry::Occupied(mut existing) => {
                let current = existing.get();
                if !current.is_expired(now) && current.request.is_pending() {
                    return Err(StoreError::Conflict(existing.key().clone()));
                }
                existing.insert(stored);
            }
            Entry::Vacant(slot) => {
                slot.insert(stored);
            }
        }
        Ok(())
    }

    async fn get(&self, session_id: &str) -> Result<Option<AuthorizationRequest>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .get(session_id)
            .filter(|stored| !stored.is_expired(now))
            .map(|stored| stored.request.clone()))
    }

    async fn resolve(&self, session_id: &str, decision: Decision) -> Result<(), StoreError> {
        let now = Instant::now();
        let mut stored = match self.entries.get_mut(session_id) {
            Some(stored) if !stored.is_expired(now) => stored,
            _ => return Err(StoreError::NotFound(session_id.to_string())),
        };

        if !stored.request.is_pending() {
            return Err(StoreError::AlreadyDecided(session_id.to_string()));
        }
        stored.request.decision = Some(decision);
        Ok(())
    }

    async fn take_if_resolved(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .remove_if(session_id, |_, stored| {
                !stored.is_expired(now) && !stored.request.is_pending()
            })
            .map(|(_, stored)| stored.request))
    }

    async fn purge_expired(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, stored| {
            let keep = !stored.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }

    async fn len(&self) -> Result<usize, StoreError> {
        let now = Instant::now();
        Ok(self
            .entries
            .iter()
            .filter(|stored| !stored.is_expired(now))
            .count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tool::ToolArgs;
    use serde_json::json;
    use std::sync::Arc;

    fn request(session: &str, ttl: Duration) -> AuthorizationRequest {
        let args = json!({"to": "x@y.com"}).as_object().cloned().unwrap();
        AuthorizationRequest::new(session, "send_email", args, ttl)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryAuthorizationStore::new();
        assert!(store.get("s1").await.unwrap().is_none());

        store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();

        let got = store.get("s1").await.unwrap().unwrap();
        assert_eq!(got.tool_name, "send_email");
        assert!(got.is_pending());
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_put_conflicts_while_pending() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();

        let err = store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap_err();
        assert_eq!(err, StoreError::Conflict("s1".to_string()));

        // Other sessions are independent
        store.put(request("s2", DEFAULT_REQUEST_TTL)).await.unwrap();
        assert_eq!(store.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_put_replaces_decided_record() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();
        store.resolve("s1", Decision::Denied).await.unwrap();

        store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();
        assert!(store.get("s1").await.unwrap().unwrap().is_pending());
    }

    #[tokio::test]
    async fn test_resolve_missing_session() {
        let store = MemoryAuthorizationStore::new();
        let err = store.resolve("nope", Decision::Approved).await.unwrap_err();
        assert_eq!(err, StoreError::NotFound("nope".to_string()));
    }

    #[tokio::test]
    async fn test_resolve_is_first_writer_wins() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();
        store.resolve("s1", Decision::Approved).await.unwrap();

        let err = store.resolve("s1", Decision::Denied).await.unwrap_err();
        assert_eq!(err, StoreError::AlreadyDecided("s1".to_string()));

        let taken = store.take_if_resolved("s1").await.unwrap().unwrap();
        assert_eq!(taken.decision, Some(Decision::Approved));
    }

    #[tokio::test]
    async fn test_take_leaves_pending_record() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();

        assert!(store.take_if_resolved("s1").await.unwrap().is_none());
        assert!(store.get("s1").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_take_consumes_exactly_once() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();

        let modified: ToolArgs = json!({"a": 1}).as_object().cloned().unwrap();
        store
            .resolve("s1", Decision::ApprovedModified(modified.clone()))
            .await
            .unwrap();

        let taken = store.take_if_resolved("s1").await.unwrap().unwrap();
        assert_eq!(taken.decision, Some(Decision::ApprovedModified(modified)));
        assert!(store.take_if_resolved("s1").await.unwrap().is_none());
        assert!(store.get("s1").await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_take_single_winner() {
        for _ in 0..20 {
            let store = Arc::new(MemoryAuthorizationStore::new());
            store.put(request("s1", DEFAULT_REQUEST_TTL)).await.unwrap();
            store.resolve("s1", Decision::Approved).await.unwrap();

            let handles: Vec<_> = (0..16)
                .map(|_| {
                    let store = store.clone();
                    tokio::spawn(async move { store.take_if_resolved("s1").await.unwrap() })
                })
                .collect();

            let mut winners = 0;
            for handle in handles {
                if handle.await.unwrap().is_some() {
                    winners += 1;
                }
            }
            assert_eq!(winners, 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_record_is_invisible() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("s1", Duration::from_secs(1))).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert!(store.get("s1").await.unwrap().is_none());
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(matches!(
            store.resolve("s1", Decision::Approved).await,
            Err(StoreError::NotFound(_))
        ));
        // An expired pending record does not block a new request
        store.put(request("s1", Duration::from_secs(1))).await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_resolve_keeps_remaining_ttl() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("s1", Duration::from_secs(10))).await.unwrap();

        tokio::time::advance(Duration::from_secs(6)).await;
        store.resolve("s1", Decision::Approved).await.unwrap();

        tokio::time::advance(Duration::from_secs(5)).await;
        assert!(store.take_if_resolved("s1").await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let store = MemoryAuthorizationStore::new();
        store.put(request("short", Duration::from_secs(1))).await.unwrap();
        store.put(request("long", Duration::from_secs(60))).await.unwrap();

        tokio::time::advance(Duration::from_secs(2)).await;

        assert_eq!(store.purge_expired().await.unwrap(), 1);
        assert_eq!(store.purge_expired().await.unwrap(), 0);
        assert!(store.get("long").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_out_of_range_ttl_is_rejected() {
        let store = MemoryAuthorizationStore::new();
        let err = store
            .put(request("s1", Duration::from_secs(u64::MAX)))
            .await
            .unwrap_err();

        assert!(matches!(err, StoreError::Backend(_)));
        assert!(store.get("s1").await.unwrap().is_none());
    }
}
