//! HTTP handlers for the transcript view, session controls, and the event log.

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive},
        IntoResponse, Response, Sse,
    },
    Json,
};
use barista_observe::{EventDirection, EventFilter, LoggedEvent};
use barista_session::SessionError;
use barista_transcript::view::{self, FunctionCallStatus};
use barista_types::{SessionStatus, TranscriptItem};
use futures_util::Stream;
use serde::{Deserialize, Serialize};
use serde_json::json;
use thiserror::Error;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::StreamExt;

use crate::AppState;

/// Upper bound on one page of the event log.
const MAX_EVENTS_PAGE: usize = 1_000;

/// Errors returned by API handlers.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream failure: {0}")]
    BadGateway(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotConnected | SessionError::Closed | SessionError::Aborted => {
                ApiError::Conflict(err.to_string())
            }
            SessionError::Handshake(_) | SessionError::Transport(_) => {
                ApiError::BadGateway(err.to_string())
            }
        }
    }
}

/// A transcript item as the display layer renders it.
#[derive(Debug, Serialize)]
pub struct ItemView {
    #[serde(flatten)]
    pub item: TranscriptItem,
    pub display_text: String,
    pub is_annotation: bool,
    /// Local capture time, `HH:MM:SS.mmm`.
    pub timestamp: String,
}

impl From<&TranscriptItem> for ItemView {
    fn from(item: &TranscriptItem) -> Self {
        Self {
            display_text: item.display_text().to_string(),
            is_annotation: item.is_annotation(),
            timestamp: item.timestamp_label(),
            item: item.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TranscriptResponse {
    pub status: SessionStatus,
    pub items: Vec<ItemView>,
    pub streaming: bool,
    pub agent_loading: bool,
    /// Tool activity from the last few seconds, if any.
    pub latest_function_call: Option<FunctionCallStatus>,
}

/// Handler for `GET /api/transcript`.
pub async fn transcript_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<TranscriptResponse> {
    let now = state.clock.now_ms();
    let status = state.session.status();
    let response = state.session.with_transcript(|store| TranscriptResponse {
        status,
        items: store.visible().into_iter().map(ItemView::from).collect(),
        streaming: view::is_streaming(store),
        agent_loading: view::is_agent_loading(store, now),
        latest_function_call: view::active_function_call(store, now),
    });
    Json(response)
}

/// Handler for `GET /api/transcript/text`.
pub async fn transcript_text_handler(Extension(state): Extension<Arc<AppState>>) -> String {
    state.session.with_transcript(view::to_plain_text)
}

/// Handler for `POST /api/transcript/{item_id}/expand`.
pub async fn toggle_expand_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(item_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let transcript = state.session.transcript();
    let mut store = transcript
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner);
    let expanded = store
        .toggle_expand(&item_id)
        .map_err(|e| ApiError::NotFound(e.to_string()))?;
    Ok(Json(json!({ "itemId": item_id, "expanded": expanded })))
}

/// Handler for `GET /api/session`.
pub async fn session_status_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Json<serde_json::Value> {
    Json(json!({
        "status": state.session.status(),
        "retryCount": state.session.retry_count(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct SendTextRequest {
    pub text: String,
}

/// Handler for `POST /api/session/text`.
pub async fn send_text_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<SendTextRequest>,
) -> Result<StatusCode, ApiError> {
    let text = payload.text.trim();
    if text.is_empty() {
        return Err(ApiError::BadRequest("text must not be empty".to_string()));
    }
    state.session.send_user_text(text)?;
    Ok(StatusCode::ACCEPTED)
}

/// Handler for `POST /api/session/interrupt`.
pub async fn interrupt_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.session.interrupt()?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct MuteRequest {
    pub muted: bool,
}

/// Handler for `POST /api/session/mute`.
pub async fn mute_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(payload): Json<MuteRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.session.mute(payload.muted)?;
    Ok(Json(json!({ "muted": payload.muted })))
}

/// Handler for `POST /api/session/ptt/start`.
pub async fn ptt_start_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.session.push_to_talk_start()?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/session/ptt/stop`.
pub async fn ptt_stop_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Result<StatusCode, ApiError> {
    state.session.push_to_talk_stop()?;
    Ok(StatusCode::NO_CONTENT)
}

/// Handler for `POST /api/session/disconnect`. Always succeeds.
pub async fn disconnect_handler(Extension(state): Extension<Arc<AppState>>) -> StatusCode {
    state.session.disconnect();
    StatusCode::NO_CONTENT
}

/// Query parameters for `GET /api/events`.
#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Return records with a sequence number strictly greater than this.
    pub since: Option<u64>,
    /// Maximum number of records (default: 100, max: 1000).
    pub limit: Option<usize>,
    /// `client` or `server`.
    pub direction: Option<String>,
    pub event_type: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct EventsResponse {
    pub events: Vec<LoggedEvent>,
    pub count: usize,
}

/// Handler for `GET /api/events`.
pub async fn events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Query(params): Query<EventsQuery>,
) -> Result<Json<EventsResponse>, ApiError> {
    let direction = params
        .direction
        .as_deref()
        .map(str::parse::<EventDirection>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;

    let filter = EventFilter {
        direction,
        event_type: params.event_type,
        since_seq: params.since,
        limit: Some(params.limit.unwrap_or(100).clamp(1, MAX_EVENTS_PAGE)),
    };

    let events = state.session.events().query(&filter);
    let count = events.len();
    Ok(Json(EventsResponse { events, count }))
}

/// Handler for `GET /events/stream`.
///
/// Streams event log records as they are appended. Each SSE message carries
/// the record's type as its event name and its sequence number as its id.
pub async fn event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = BroadcastStream::new(state.session.events().subscribe());

    let mapped_stream = stream.filter_map(|result| match result {
        Ok(record) => match serde_json::to_string(&record) {
            Ok(data) => {
                let event = Event::default().id(record.seq.to_string()).data(data);
                // Event names cannot span lines.
                let event = if record.event_type.contains(['\n', '\r']) {
                    event
                } else {
                    event.event(record.event_type.as_str())
                };
                Some(Ok(event))
            }
            Err(e) => {
                tracing::error!("failed to serialize logged event: {}", e);
                None
            }
        },
        Err(broadcast_error) => {
            tracing::warn!(
                error = %broadcast_error,
                "event stream lagged; records were dropped for this subscriber"
            );
            None
        }
    });

    Sse::new(mapped_stream).keep_alive(KeepAlive::default())
}
