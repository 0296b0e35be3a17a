//! Barista server library logic.
//!
//! Serves the transcript view, session controls, and the event log of one
//! realtime session over HTTP.

pub mod api;
pub mod config;
pub mod replay;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use barista_session::{ChannelConnector, SessionManager};
use barista_transcript::{Clock, SystemClock};
use serde_json::{json, Value};
use tower_http::trace::TraceLayer;

/// Maximum request body size (64 KiB). Requests carry short text at most.
const MAX_REQUEST_BODY_BYTES: usize = 64 * 1024;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The session whose transcript and controls are served.
    pub session: SessionManager<ChannelConnector>,
    /// Clock used for time-windowed view flags. Share it with the session.
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(session: SessionManager<ChannelConnector>) -> Self {
        Self {
            session,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }
}

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/api/transcript", get(api::transcript_handler))
        .route("/api/transcript/text", get(api::transcript_text_handler))
        .route(
            "/api/transcript/{item_id}/expand",
            post(api::toggle_expand_handler),
        )
        .route("/api/session", get(api::session_status_handler))
        .route("/api/session/text", post(api::send_text_handler))
        .route("/api/session/interrupt", post(api::interrupt_handler))
        .route("/api/session/mute", post(api::mute_handler))
        .route("/api/session/ptt/start", post(api::ptt_start_handler))
        .route("/api/session/ptt/stop", post(api::ptt_stop_handler))
        .route("/api/session/disconnect", post(api::disconnect_handler))
        .route("/api/events", get(api::events_handler))
        .route("/events/stream", get(api::event_stream_handler))
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(Extension(Arc::new(state)))
}
