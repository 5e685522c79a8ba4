//! HTTP client for a broker running in another process.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Deserialize;

use super::broker::{Broker, BrokerError, BrokerHealth, NewAuthorization};
use super::request::{AuthorizationRequest, Decision, PollStatus, RespondRequest, StatusResponse};

/// Per-call timeout for broker HTTP requests.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: String,
}

/// Talks to a toolgate server over HTTP.
///
/// Connection failures and timeouts surface as
/// [`BrokerError::Transport`]; `409` maps to [`BrokerError::Conflict`] and
/// `404` to [`BrokerError::NotFound`].
///
/// ```rust,no_run
/// use toolgate_core::authorization::HttpBrokerClient;
///
/// let client = HttpBrokerClient::new("http://127.0.0.1:8000").unwrap();
/// assert_eq!(client.base_url(), "http://127.0.0.1:8000");
/// ```
#[derive(Debug, Clone)]
pub struct HttpBrokerClient {
    client: reqwest::Client,
    base: Url,
    base_url: String,
}

impl HttpBrokerClient {
    /// Create a client with the default per-call timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self, BrokerError> {
        Self::with_timeout(base_url, DEFAULT_CALL_TIMEOUT)
    }

    /// Create a client with a custom per-call timeout.
    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self, BrokerError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| BrokerError::Transport(format!("failed to build HTTP client: {}", e)))?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        let base = Url::parse(&base_url)
            .map_err(|e| BrokerError::Transport(format!("invalid broker URL '{}': {}", base_url, e)))?;
        if base.cannot_be_a_base() {
            return Err(BrokerError::Transport(format!(
                "invalid broker URL '{}': not a base URL",
                base_url
            )));
        }

        Ok(Self {
            client,
            base,
            base_url,
        })
    }

    /// The server base URL, without a trailing slash.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Record a decision on the server.
    pub async fn submit_decision(
        &self,
        session_id: &str,
        decision: &Decision,
    ) -> Result<(), BrokerError> {
        let response = self
            .client
            .post(self.url(&["auth", "respond"]))
            .json(&RespondRequest::new(session_id, decision))
            .send()
            .await
            .map_err(transport)?;
        check(response, session_id).await.map(|_| ())
    }

    /// Server health counts.
    pub async fn health(&self) -> Result<BrokerHealth, BrokerError> {
        let response = self
            .client
            .get(self.url(&["health"]))
            .send()
            .await
            .map_err(transport)?;
        check(response, "").await?.json().await.map_err(transport)
    }

    /// Endpoint URL from raw path segments; each segment is percent-encoded,
    /// so a session id containing `/`, `?` or `#` stays one segment.
    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

#[async_trait]
impl Broker for HttpBrokerClient {
    async fn request_authorization(&self, request: NewAuthorization) -> Result<(), BrokerError> {
        let response = self
            .client
            .post(self.url(&["auth", "request"]))
            .json(&request)
            .send()
            .await
            .map_err(transport)?;
        check(response, &request.session_id).await.map(|_| ())
    }

    async fn poll_status(&self, session_id: &str) -> Result<PollStatus, BrokerError> {
        let response = self
            .client
            .get(self.url(&["auth", "status", session_id]))
            .send()
            .await
            .map_err(transport)?;
        let body: StatusResponse = check(response, session_id)
            .await?
            .json()
            .await
            .map_err(transport)?;
        Ok(body.into())
    }

    async fn get_request_snapshot(
        &self,
        session_id: &str,
    ) -> Result<Option<AuthorizationRequest>, BrokerError> {
        let response = self
            .client
            .get(self.url(&["auth", session_id]))
            .send()
            .await
            .map_err(transport)?;
        check(response, session_id)
            .await?
            .json()
            .await
            .map_err(transport)
    }
}

fn transport(err: reqwest::Error) -> BrokerError {
    BrokerError::Transport(err.to_string())
}

async fn check(response: reqwest::Response, session_id: &str) -> Result<reqwest::Response, BrokerError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body.error,
        Err(_) => status.to_string(),
    };
    tracing::debug!(session_id, %status, error = %message, "broker call failed");

    Err(match status {
        StatusCode::CONFLICT => BrokerError::Conflict(message),
        StatusCode::NOT_FOUND => BrokerError::NotFound(session_id.to_string()),
        _ => BrokerError::Transport(format!("{}: {}", status, message)),
    })
}
