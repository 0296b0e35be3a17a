//! The seam between a session and the realtime service.
//!
//! A [`Connector`] performs the handshake and yields a [`Connection`]: a
//! [`Transport`] for outbound commands plus a channel of inbound
//! [`SessionEvent`]s. Production connectors wrap the hosted SDK;
//! [`crate::channel::ChannelConnector`] keeps everything in memory.

use std::future::Future;
use std::sync::Arc;

use barista_transcript::SessionEvent;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::config::SessionConfig;
use crate::error::SessionError;

/// Outbound side of a live connection.
pub trait Transport: Send + Sync {
    /// Sends a raw client event.
    fn send_event(&self, event: &Value) -> Result<(), SessionError>;

    /// Sends a user text message and asks for a response.
    fn send_message(&self, text: &str) -> Result<(), SessionError>;

    fn mute(&self, muted: bool) -> Result<(), SessionError>;

    /// Cuts off the response currently being spoken.
    fn interrupt(&self) -> Result<(), SessionError>;

    /// Tears down the channel. Safe to call more than once.
    fn close(&self);
}

/// Parameters of a handshake.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectRequest {
    pub model: String,
    pub input_audio_format: &'static str,
    pub output_audio_format: &'static str,
    pub transcription_model: String,
}

impl ConnectRequest {
    pub fn from_config(config: &SessionConfig) -> Self {
        let format = config.codec.audio_format();
        Self {
            model: config.model.clone(),
            input_audio_format: format,
            output_audio_format: format,
            transcription_model: config.transcription_model.clone(),
        }
    }
}

/// A live connection.
pub struct Connection {
    pub transport: Arc<dyn Transport>,
    pub events: mpsc::Receiver<SessionEvent>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}

/// Establishes connections.
pub trait Connector: Send + Sync + 'static {
    fn connect(
        &self,
        request: ConnectRequest,
    ) -> impl Future<Output = Result<Connection, SessionError>> + Send;
}

/// `conversation.item.create` event for a typed user message.
pub fn user_text_event(text: &str) -> Value {
    serde_json::json!({
        "type": "conversation.item.create",
        "item": {
            "type": "message",
            "role": "user",
            "content": [{"type": "input_text", "text": text}]
        }
    })
}

/// `response.create` event that asks the service to answer.
pub fn response_create_event() -> Value {
    serde_json::json!({"type": "response.create"})
}

/// Client event types that start work on the service and are retried when
/// rate limited.
pub fn is_request_event(event: &Value) -> bool {
    matches!(
        event.get("type").and_then(Value::as_str),
        Some("response.create" | "conversation.item.create")
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use barista_types::AudioCodec;
    use serde_json::json;

    #[test]
    fn connect_request_derives_audio_format_from_codec() {
        let config = SessionConfig {
            codec: AudioCodec::Pcma,
            ..Default::default()
        };
        let request = ConnectRequest::from_config(&config);
        assert_eq!(request.input_audio_format, "g711_alaw");
        assert_eq!(request.output_audio_format, "g711_alaw");
        assert_eq!(request.transcription_model, "gpt-4o-mini-transcribe");
    }

    #[test]
    fn user_text_event_shape() {
        let event = user_text_event("Large latte");
        assert_eq!(event["type"], "conversation.item.create");
        assert_eq!(event["item"]["role"], "user");
        assert_eq!(event["item"]["content"][0]["text"], "Large latte");
    }

    #[test]
    fn request_events_are_recognized() {
        assert!(is_request_event(&response_create_event()));
        assert!(is_request_event(&user_text_event("x")));
        assert!(!is_request_event(&json!({"type": "input_audio_buffer.clear"})));
        assert!(!is_request_event(&json!({})));
    }
}
