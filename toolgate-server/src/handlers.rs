//! HTTP handlers for the broker operations.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use toolgate_core::authorization::{
    AuthorizationRequest, NewAuthorization, RespondRequest, StatusResponse,
};

use crate::error::{ServerError, ServerResult};
use crate::state::AppState;

/// `POST /auth/request`: file a pending request and notify the client.
pub async fn request_handler(
    State(state): State<AppState>,
    Json(request): Json<NewAuthorization>,
) -> ServerResult<(StatusCode, Json<Value>)> {
    require_session(&request.session_id)?;
    if request.tool_name.is_empty() {
        return Err(ServerError::InvalidRequest("tool_name must not be empty".into()));
    }

    state.broker.request_authorization(request).await?;
    Ok((StatusCode::ACCEPTED, Json(json!({ "status": "pending" }))))
}

/// `POST /auth/respond`: record the human decision.
pub async fn respond_handler(
    State(state): State<AppState>,
    Json(response): Json<RespondRequest>,
) -> ServerResult<Json<Value>> {
    require_session(&response.session_id)?;

    state
        .broker
        .submit_decision(&response.session_id, response.decision())
        .await?;
    Ok(Json(json!({ "status": "recorded" })))
}

/// `GET /auth/status/:session_id`: consuming status poll.
pub async fn status_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ServerResult<Json<StatusResponse>> {
    let status = state.broker.poll_status(&session_id).await?;
    Ok(Json(StatusResponse::from(&status)))
}

/// `GET /auth/:session_id`: non-consuming snapshot, `null` if none.
pub async fn snapshot_handler(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> ServerResult<Json<Option<AuthorizationRequest>>> {
    Ok(Json(state.broker.get_request_snapshot(&session_id).await?))
}

/// `GET /health`
pub async fn health_handler(State(state): State<AppState>) -> ServerResult<Json<Value>> {
    let health = state.broker.health().await?;
    Ok(Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "pending": health.pending,
        "channels": health.channels,
    })))
}

fn require_session(session_id: &str) -> ServerResult<()> {
    if session_id.trim().is_empty() {
        return Err(ServerError::InvalidRequest("session_id must not be empty".into()));
    }
    Ok(())
}

#[cfg(test)]
#[path = "handlers_tests.rs"]
mod tests;
