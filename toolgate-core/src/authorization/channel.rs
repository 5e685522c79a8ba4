//! Live notification channels, at most one per session.
//!
//! Delivery is best effort. Pushing never awaits: a full queue drops the
//! message and a closed queue unregisters the channel. A client that misses
//! a push recovers through a snapshot read.

use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tokio::sync::mpsc;

use super::request::PushMessage;

/// Default number of undelivered pushes buffered per channel.
pub const DEFAULT_CHANNEL_BUFFER: usize = 32;

/// Identifies one registration, so a stale disconnect cannot evict its successor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(u64);

/// What happened to a push.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PushOutcome {
    /// Queued for the session's client.
    Delivered,
    /// No client is connected for the session.
    NoChannel,
    /// The client's queue was full; the message was dropped.
    Dropped,
    /// The client had gone away; the channel was unregistered.
    Closed,
}

/// A registered channel's receiving half.
#[derive(Debug)]
pub struct Subscription {
    /// Registration ID to pass back to [`ChannelManager::unregister`].
    pub id: ChannelId,
    /// Incoming pushes for the session.
    pub receiver: mpsc::Receiver<PushMessage>,
}

struct Registered {
    id: ChannelId,
    sender: mpsc::Sender<PushMessage>,
}

/// Maintains at most one live push channel per session.
///
/// # Example
///
/// ```rust
/// use toolgate_core::authorization::{ChannelManager, PushMessage, PushOutcome};
///
/// # tokio_test::block_on(async {
/// let channels = ChannelManager::new();
/// let mut sub = channels.subscribe("s1");
///
/// let message = PushMessage {
///     session_id: "s1".into(),
///     tool_name: "send_email".into(),
///     tool_args: Default::default(),
///     justification: None,
/// };
/// assert_eq!(channels.push("s1", message.clone()), PushOutcome::Delivered);
/// assert_eq!(sub.receiver.recv().await, Some(message));
///
/// // Unknown sessions are silently ignored
/// # let message = PushMessage { session_id: "s2".into(), tool_name: "x".into(), tool_args: Default::default(), justification: None };
/// assert_eq!(channels.push("s2", message), PushOutcome::NoChannel);
/// # });
/// ```
pub struct ChannelManager {
    channels: DashMap<String, Registered>,
    next_id: AtomicU64,
    buffer: usize,
}

impl ChannelManager {
    /// Create a manager with the default per-channel buffer.
    pub fn new() -> Self {
        Self::with_buffer(DEFAULT_CHANNEL_BUFFER)
    }

    /// Create a manager whose subscriptions buffer `buffer` pushes.
    pub fn with_buffer(buffer: usize) -> Self {
        Self {
            channels: DashMap::new(),
            next_id: AtomicU64::new(1),
            buffer: buffer.max(1),
        }
    }

    /// Register a sender for a session, replacing any prior channel.
    ///
    /// The replaced channel's sender is dropped, which ends its receiver.
    pub fn register(&self, session_id: &str, sender: mpsc::Sender<PushMessage>) -> ChannelId {
        let id = ChannelId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let replaced = self
            .channels
            .insert(session_id.to_string(), Registered { id, sender });

        if replaced.is_some() {
            tracing::info!(session_id, "push channel replaced");
        } else {
            tracing::debug!(session_id, "push channel registered");
        }
        id
    }

    /// Create a bounded queue for a session and register its sending half.
    pub fn subscribe(&self, session_id: &str) -> Subscription {
        let (sender, receiver) = mpsc::channel(self.buffer);
        let id = self.register(session_id, sender);
        Subscription { id, receiver }
    }

    /// Remove the session's channel if it is still registration `id`.
    ///
    /// Returns `true` if a channel was removed.
    pub fn unregister(&self, session_id: &str, id: ChannelId) -> bool {
        let removed = self
            .channels
            .remove_if(session_id, |_, registered| registered.id == id)
            .is_some();
        if removed {
            tracing::debug!(session_id, "push channel unregistered");
        }
        removed
    }

    /// Best-effort delivery to the session's channel. Never blocks.
    pub fn push(&self, session_id: &str, message: PushMessage) -> PushOutcome {
        let sender = match self.channels.get(session_id) {
            Some(registered) => registered.sender.clone(),
            None => {
                tracing::debug!(session_id, "no push channel; client must poll or snapshot");
                return PushOutcome::NoChannel;
            }
        };

        match sender.try_send(message) {
            Ok(()) => {
                tracing::debug!(session_id, "push delivered");
                PushOutcome::Delivered
            }
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::warn!(session_id, "push channel full; message dropped");
                PushOutcome::Dropped
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                // Only evict the channel we failed on, not a fresh reconnect
                if let Entry::Occupied(entry) = self.channels.entry(session_id.to_string()) {
                    if entry.get().sender.same_channel(&sender) {
                        entry.remove();
                    }
                }
                tracing::info!(session_id, "push channel closed; unregistered");
                PushOutcome::Closed
            }
        }
    }

    /// Whether a session currently has a channel.
    pub fn is_connected(&self, session_id: &str) -> bool {
        self.channels.contains_key(session_id)
    }

    /// Number of registered channels.
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// True if no channel is registered.
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }
}

impl Default for ChannelManager {
    fn default() -> Self {
        Self::new()
    }
}
