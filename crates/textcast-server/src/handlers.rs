//! HTTP handlers translating requests into bus operations.

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use textcast_core::TextEvent;
use tracing::info;

use crate::errors::ApiError;
use crate::server::AppState;
use crate::stream;

/// Query string accepted by `GET /api`.
#[derive(Debug, Default, Deserialize)]
pub struct TextQuery {
    /// When present, the text to publish.
    pub text: Option<String>,
}

/// Body accepted by `POST /api`.
#[derive(Debug, Deserialize)]
pub struct PublishRequest {
    /// Text to publish.
    pub text: String,
}

/// Acknowledgement for a publish.
#[derive(Debug, Serialize, Deserialize)]
pub struct PublishResponse {
    /// The text that was published.
    pub text: String,
}

/// Acknowledgement for a refresh.
#[derive(Debug, Serialize, Deserialize)]
pub struct RefreshResponse {
    /// Always `"ok"`.
    pub response: String,
}

/// Body of `GET /api/history`.
#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    /// Most recently published text.
    pub latest: TextEvent,
    /// Retained history, oldest first.
    pub history: Vec<TextEvent>,
}

fn publish(state: &AppState, text: String) -> Json<PublishResponse> {
    state.bus.publish_text(text.clone());
    info!(text_len = text.len(), "published text");
    Json(PublishResponse { text })
}

/// GET /api: publish when `text` is given, otherwise open a stream.
pub async fn api_get(State(state): State<AppState>, Query(query): Query<TextQuery>) -> Response {
    match query.text {
        Some(text) => publish(&state, text).into_response(),
        None => stream::event_stream(&state),
    }
}

/// POST /api
pub async fn api_post(
    State(state): State<AppState>,
    payload: Result<Json<PublishRequest>, JsonRejection>,
) -> Result<Json<PublishResponse>, ApiError> {
    let Json(request) = payload.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(publish(&state, request.text))
}

/// GET /api/refresh
pub async fn refresh_stream(State(state): State<AppState>) -> Response {
    stream::event_stream(&state)
}

/// POST /api/refresh
///
/// Only signals listeners for now. Once a message store exists this should
/// load the latest stored message and publish it.
pub async fn refresh_post(State(state): State<AppState>) -> Json<RefreshResponse> {
    state.bus.trigger_refresh();
    info!(subscribers = state.bus.subscriber_count(), "triggered refresh");
    Json(RefreshResponse {
        response: "ok".into(),
    })
}

/// GET /api/history
pub async fn history_get(State(state): State<AppState>) -> Json<HistoryResponse> {
    let snapshot = state.bus.snapshot();
    Json(HistoryResponse {
        latest: snapshot.latest,
        history: snapshot.history,
    })
}
