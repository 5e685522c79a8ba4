//! Authorization broker for sensitive tool calls.
//!
//! A gate files a request, the human-facing client is notified over a push
//! channel, the human's decision is recorded, and the gate consumes the
//! decision by polling. Each session holds at most one request at a time.
//!
//! # Storage
//!
//! [`AuthorizationStore`] abstracts the record store.
//! [`MemoryAuthorizationStore`] keeps records in-process with a ttl; a shared
//! store can be plugged in through the same trait.
//!
//! # Transports
//!
//! [`AuthorizationBroker`] runs in-process. With the `remote` feature,
//! [`HttpBrokerClient`] talks to a broker behind the toolgate server.

mod broker;
mod channel;
#[cfg(feature = "remote")]
mod remote;
mod request;
mod store;

pub use broker::{AuthorizationBroker, Broker, BrokerError, BrokerHealth, NewAuthorization};
pub use channel::{ChannelId, ChannelManager, PushOutcome, Subscription, DEFAULT_CHANNEL_BUFFER};
#[cfg(feature = "remote")]
pub use remote::{HttpBrokerClient, DEFAULT_CALL_TIMEOUT};
pub use request::{
    AuthorizationRequest, Decision, PollStatus, PushMessage, RespondRequest, StatusResponse, Verdict,
};
pub use store::{AuthorizationStore, MemoryAuthorizationStore, StoreError, DEFAULT_REQUEST_TTL};
