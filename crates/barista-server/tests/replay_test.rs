use std::io::Write;
use std::time::Duration;

use barista_observe::{EventFilter, EventLog};
use barista_server::replay::{self, ReplayError, ReplayScript};
use barista_session::{ChannelConnector, SessionConfig, SessionManager};
use barista_types::{ItemStatus, SessionStatus};

fn session() -> (SessionManager<ChannelConnector>, ChannelConnector) {
    let connector = ChannelConnector::default();
    let session =
        SessionManager::new(connector.clone(), SessionConfig::default(), EventLog::new(200));
    (session, connector)
}

const COMBO: &str = r#"
{"action":"send_text","text":"Large latte and a croissant"}
{"event":"history_added","item":{"type":"message","itemId":"u1","role":"user","content":[{"type":"input_text","text":"Large latte and a croissant"}]}}
{"event":"agent_tool_start","context":{"history":[{"type":"function_call","name":"add_item","arguments":"{\"sku\":\"latte-l\"}"}]},"tool":{"name":"add_item"}}
{"event":"agent_tool_end","tool":{"name":"add_item"},"result":"{\"ok\":true}"}
{"event":"transport","payload":{"type":"response.audio_transcript.delta","item_id":"a1","delta":"Added"}}
{"event":"transport","payload":{"type":"response.audio_transcript.delta","item_id":"a1","delta":" both."}}
{"event":"transport","payload":{"type":"response.audio_transcript.done","item_id":"a1","transcript":"Added both."}}
{"event":"transport","payload":{"type":"response.done","response":{"status":"completed"}}}
{"action":"wait","ms":1000}
"#;

// ── end to end ───────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn combo_script_builds_the_transcript() {
    let (session, connector) = session();
    let script = ReplayScript::parse(COMBO).unwrap();

    let played = replay::run(&session, &connector, &script, Duration::from_millis(50))
        .await
        .unwrap();
    assert_eq!(played, 9);
    assert_eq!(session.status(), SessionStatus::Connected);

    session.with_transcript(|store| {
        let labels: Vec<&str> = store.visible().iter().map(|i| i.title()).collect();
        assert_eq!(
            labels,
            vec![
                "Large latte and a croissant",
                "function call: add_item",
                "function call result: add_item",
                "Added both.",
            ]
        );
        let reply = store.get("a1").unwrap();
        assert_eq!(reply.status, ItemStatus::Done);
        assert!(!reply.guardrail_result.as_ref().unwrap().is_pending());
    });

    let handle = connector.handle().unwrap();
    assert_eq!(
        handle.transport().sent_types(),
        vec!["conversation.item.create", "response.create"]
    );
}

#[tokio::test(start_paused = true)]
async fn rate_limited_replay_is_resent() {
    let (session, connector) = session();
    let script = ReplayScript::parse(
        r#"
{"action":"send_text","text":"Mocha"}
{"event":"transport","payload":{"type":"response.done","response":{"status":"failed","status_details":{"error":{"type":"tokens","code":"rate_limit_exceeded"}}}}}
{"action":"wait","ms":6000}
"#,
    )
    .unwrap();

    replay::run(&session, &connector, &script, Duration::ZERO)
        .await
        .unwrap();

    let retries = session.events().query(&EventFilter {
        event_type: Some("rate_limit_retry".to_string()),
        ..Default::default()
    });
    assert_eq!(retries.len(), 1);
    assert_eq!(
        retries[0].payload["message"],
        "Rate limit exceeded, retrying in 5 seconds (Attempt 1/5)"
    );

    let sent = connector.handle().unwrap().transport().sent_types();
    assert_eq!(
        sent,
        vec![
            "conversation.item.create",
            "response.create",
            "conversation.item.create"
        ]
    );
}

// ── failures ─────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn failed_handshake_stops_the_replay() {
    let (session, connector) = session();
    connector.fail_next("no ephemeral key");
    let script = ReplayScript::parse(COMBO).unwrap();

    let err = replay::run(&session, &connector, &script, Duration::ZERO)
        .await
        .unwrap_err();
    assert!(matches!(err, ReplayError::Session(_)));
    assert!(connector.handle().is_none());
}

#[test]
fn script_loads_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(file, "{COMBO}").unwrap();
    let script = ReplayScript::load(file.path()).unwrap();
    assert_eq!(script.len(), 9);
}
