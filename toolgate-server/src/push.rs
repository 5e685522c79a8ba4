//! Push transports: WebSocket and Server-Sent Events.
//!
//! Both register a channel for the session on connect and unregister it on
//! disconnect. A newer connection for the same session replaces the older
//! one, whose stream then ends.
//!
//! A WebSocket client can also answer over the same socket by sending a
//! text frame `{"decision": "approve"|"deny", "tool_args": {...}?}` for its
//! session. Each frame gets a `{"status": "recorded"}` reply, or an
//! `{"error", "code"}` reply shaped like the HTTP error bodies.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
};
use futures::{SinkExt, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::wrappers::ReceiverStream;
use toolgate_core::authorization::{ChannelId, ChannelManager, Decision, PushMessage, Verdict};
use toolgate_core::ToolArgs;

use crate::error::ServerError;
use crate::state::AppState;

/// SSE event name for an authorization request.
pub const AUTHORIZATION_EVENT: &str = "authorization_request";

/// Unregisters a channel when the connection that owns it goes away.
struct ChannelGuard {
    channels: Arc<ChannelManager>,
    session_id: String,
    id: ChannelId,
}

impl Drop for ChannelGuard {
    fn drop(&mut self) {
        self.channels.unregister(&self.session_id, self.id);
    }
}

/// `GET /ws/:session_id`
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

async fn handle_socket(socket: WebSocket, state: AppState, session_id: String) {
    let channels = state.broker.channels().clone();
    let subscription = channels.subscribe(&session_id);
    let _guard = ChannelGuard {
        channels,
        session_id: session_id.clone(),
        id: subscription.id,
    };
    let mut receiver = subscription.receiver;
    let (mut sink, mut inbound) = socket.split();

    tracing::info!(session_id = %session_id, "websocket client connected");

    loop {
        tokio::select! {
            push = receiver.recv() => {
                let Some(message) = push else {
                    // Replaced by a newer connection
                    let _ = sink.send(Message::Close(None)).await;
                    break;
                };
                let Some(text) = encode(&message) else { continue };
                if sink.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            frame = inbound.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_decision(&state, &session_id, &text).await;
                        if sink.send(Message::Text(reply.to_string())).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                    Some(Ok(_)) => {}
                }
            }
        }
    }

    tracing::info!(session_id = %session_id, "websocket client disconnected");
}

/// A decision sent over the session's WebSocket.
#[derive(Debug, Deserialize)]
struct DecisionFrame {
    decision: Verdict,
    #[serde(default)]
    tool_args: Option<ToolArgs>,
}

async fn handle_decision(state: &AppState, session_id: &str, text: &str) -> Value {
    let result = match serde_json::from_str::<DecisionFrame>(text) {
        Ok(frame) => state
            .broker
            .submit_decision(session_id, Decision::from_verdict(frame.decision, frame.tool_args))
            .await
            .map_err(ServerError::from),
        Err(e) => Err(ServerError::InvalidRequest(format!(
            "invalid decision frame: {}",
            e
        ))),
    };

    match result {
        Ok(()) => json!({ "status": "recorded" }),
        Err(e) => {
            tracing::debug!(session_id, error = %e, "websocket decision rejected");
            e.body()
        }
    }
}

/// `GET /events/:session_id`
pub async fn events_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let channels = state.broker.channels().clone();
    let subscription = channels.subscribe(&session_id);
    let guard = ChannelGuard {
        channels,
        session_id,
        id: subscription.id,
    };

    let stream = ReceiverStream::new(subscription.receiver).filter_map(move |message| {
        // The stream owns the guard, so dropping the response unregisters
        let _owner = &guard;
        let event = encode(&message).map(|json| {
            Ok::<_, Infallible>(Event::default().event(AUTHORIZATION_EVENT).data(json))
        });
        futures::future::ready(event)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

fn encode(message: &PushMessage) -> Option<String> {
    match serde_json::to_string(message) {
        Ok(json) => Some(json),
        Err(e) => {
            tracing::warn!(session_id = %message.session_id, error = %e, "failed to encode push message");
            None
        }
    }
}
