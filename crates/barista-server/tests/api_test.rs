use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use barista_observe::EventLog;
use barista_server::{app, AppState};
use barista_session::{ChannelConnector, ChannelHandle, SessionConfig, SessionManager};
use barista_transcript::{ManualClock, SessionEvent};
use serde_json::{json, Value};
use tower::ServiceExt;

const T0: i64 = 1_700_000_000_000;

struct Fixture {
    app: Router,
    session: SessionManager<ChannelConnector>,
    connector: ChannelConnector,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        let connector = ChannelConnector::default();
        let clock = Arc::new(ManualClock::new(T0));
        let session =
            SessionManager::builder(connector.clone(), SessionConfig::default(), EventLog::new(100))
                .clock(clock.clone())
                .build();
        let app = app(AppState::new(session.clone()).with_clock(clock.clone()));
        Self {
            app,
            session,
            connector,
            clock,
        }
    }

    async fn connected() -> (Self, ChannelHandle) {
        let fixture = Self::new();
        fixture.session.connect().await.unwrap();
        let handle = fixture.connector.handle().unwrap();
        (fixture, handle)
    }

    async fn request(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Vec<u8>) {
        let builder = Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, bytes.to_vec())
    }

    async fn json(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let (status, bytes) = self.request(method, uri, body).await;
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, value)
    }
}

async fn push(handle: &ChannelHandle, event: Value) {
    handle
        .push(SessionEvent::from_value(event).unwrap())
        .await
        .unwrap();
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

// ── health ───────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn health_check_returns_ok() {
    let fixture = Fixture::new();
    let (status, body) = fixture.json("GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
}

// ── transcript ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn transcript_lists_visible_items_with_display_fields() {
    let (fixture, handle) = Fixture::connected().await;
    push(
        &handle,
        json!({"event": "history_added", "item": {
            "type": "message", "itemId": "sys", "role": "system",
            "content": [{"type": "input_text", "text": "You are a barista."}]
        }}),
    )
    .await;
    push(
        &handle,
        json!({"event": "history_added", "item": {
            "type": "message", "itemId": "u1", "role": "user",
            "content": [{"type": "input_audio"}]
        }}),
    )
    .await;
    settle().await;

    let (status, body) = fixture.json("GET", "/api/transcript", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "CONNECTED");

    let items = body["items"].as_array().unwrap();
    assert_eq!(items.len(), 1, "system message is hidden");
    assert_eq!(items[0]["item_id"], "u1");
    assert_eq!(items[0]["text"], "[Transcribing...]");
    assert_eq!(items[0]["display_text"], "Transcribing...");
    assert_eq!(items[0]["is_annotation"], true);
    assert_eq!(body["streaming"], false);
}

#[tokio::test(start_paused = true)]
async fn transcript_reports_streaming_and_tool_activity() {
    let (fixture, handle) = Fixture::connected().await;
    push(
        &handle,
        json!({"event": "agent_tool_end", "tool": {"name": "add_item"}, "result": "{\"ok\":true}"}),
    )
    .await;
    push(
        &handle,
        json!({"event": "transport", "payload": {
            "type": "response.audio_transcript.delta", "item_id": "a1", "delta": "One"
        }}),
    )
    .await;
    settle().await;

    let (_, body) = fixture.json("GET", "/api/transcript", None).await;
    assert_eq!(body["streaming"], true);
    assert_eq!(body["latest_function_call"]["name"], "add_item");
    assert_eq!(body["latest_function_call"]["state"], "success");

    fixture.clock.advance(10_000);
    let (_, body) = fixture.json("GET", "/api/transcript", None).await;
    assert!(body["latest_function_call"].is_null(), "stale tool status expires");
}

#[tokio::test(start_paused = true)]
async fn agent_loading_follows_recent_agent_breadcrumb() {
    let (fixture, _handle) = Fixture::connected().await;
    fixture
        .session
        .transcript()
        .lock()
        .unwrap()
        .add_breadcrumb("Agent: menu", None, T0);

    fixture.clock.advance(1_000);
    let (_, body) = fixture.json("GET", "/api/transcript", None).await;
    assert_eq!(body["agent_loading"], true);

    fixture.clock.advance(5_000);
    let (_, body) = fixture.json("GET", "/api/transcript", None).await;
    assert_eq!(body["agent_loading"], false);
}

#[tokio::test(start_paused = true)]
async fn plain_text_export() {
    let (fixture, handle) = Fixture::connected().await;
    push(
        &handle,
        json!({"event": "history_added", "item": {
            "type": "message", "itemId": "u1", "role": "user",
            "content": [{"type": "input_text", "text": "Large latte"}]
        }}),
    )
    .await;
    settle().await;

    let (status, bytes) = fixture.request("GET", "/api/transcript/text", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(String::from_utf8(bytes).unwrap(), "user: Large latte");
}

#[tokio::test(start_paused = true)]
async fn expand_toggles_and_rejects_unknown_items() {
    let (fixture, handle) = Fixture::connected().await;
    push(
        &handle,
        json!({"event": "history_added", "item": {
            "type": "message", "itemId": "u1", "role": "user",
            "content": [{"type": "input_text", "text": "Mocha"}]
        }}),
    )
    .await;
    settle().await;

    let (status, body) = fixture.json("POST", "/api/transcript/u1/expand", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["expanded"], true);
    let (_, body) = fixture.json("POST", "/api/transcript/u1/expand", None).await;
    assert_eq!(body["expanded"], false);

    let (status, _) = fixture.json("POST", "/api/transcript/nope/expand", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

// ── session controls ─────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn send_text_requires_an_active_session() {
    let fixture = Fixture::new();
    let (status, body) = fixture
        .json("POST", "/api/session/text", Some(json!({"text": "Hi"})))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("not connected"));
}

#[tokio::test(start_paused = true)]
async fn send_text_reaches_the_transport() {
    let (fixture, handle) = Fixture::connected().await;
    let (status, _) = fixture
        .json("POST", "/api/session/text", Some(json!({"text": "Large latte"})))
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(
        handle.transport().sent_types(),
        vec!["conversation.item.create", "response.create"]
    );

    let (status, _) = fixture
        .json("POST", "/api/session/text", Some(json!({"text": "   "})))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn mute_interrupt_and_push_to_talk() {
    let (fixture, handle) = Fixture::connected().await;

    let (status, body) = fixture
        .json("POST", "/api/session/mute", Some(json!({"muted": true})))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["muted"], true);
    assert!(handle.transport().is_muted());

    let (status, _) = fixture.json("POST", "/api/session/interrupt", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(handle.transport().interrupts(), 1);

    fixture.json("POST", "/api/session/ptt/start", None).await;
    fixture.json("POST", "/api/session/ptt/stop", None).await;
    assert_eq!(
        handle.transport().sent_types(),
        vec![
            "input_audio_buffer.clear",
            "input_audio_buffer.commit",
            "response.create"
        ]
    );
}

#[tokio::test(start_paused = true)]
async fn disconnect_is_idempotent() {
    let (fixture, handle) = Fixture::connected().await;
    for _ in 0..2 {
        let (status, _) = fixture.json("POST", "/api/session/disconnect", None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }
    assert!(handle.transport().is_closed());

    let (_, body) = fixture.json("GET", "/api/session", None).await;
    assert_eq!(body["status"], "DISCONNECTED");
    assert!(body["retryCount"].is_null());

    let (status, _) = fixture.json("POST", "/api/session/interrupt", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

// ── event log ────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn events_page_with_cursor_and_direction() {
    let (fixture, handle) = Fixture::connected().await;
    handle
        .push_transport(json!({"type": "session.created"}))
        .await
        .unwrap();
    settle().await;

    let (status, body) = fixture.json("GET", "/api/events", None).await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(body["count"], 3);
    assert_eq!(events[0]["event_type"], "session.status");
    assert_eq!(events[2]["event_type"], "session.created");
    assert_eq!(events[2]["direction"], "server");

    let first_seq = events[0]["seq"].as_u64().unwrap();
    let (_, body) = fixture
        .json("GET", &format!("/api/events?since={first_seq}&limit=1"), None)
        .await;
    assert_eq!(body["count"], 1);
    assert_eq!(body["events"][0]["seq"], first_seq + 1);

    let (_, body) = fixture
        .json("GET", "/api/events?direction=server", None)
        .await;
    assert_eq!(body["count"], 1);

    let (status, _) = fixture
        .json("GET", "/api/events?direction=sideways", None)
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test(start_paused = true)]
async fn event_stream_is_server_sent_events() {
    let fixture = Fixture::new();
    let response = fixture
        .app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/events/stream")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );
}
