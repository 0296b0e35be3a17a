//! Event direction, payload, and record types for the session event log.

use barista_types::SessionStatus;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Which side of the realtime channel an event originated on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventDirection {
    /// Produced by this application (status changes, outbound requests).
    Client,
    /// Delivered by the realtime service or derived from what it delivered.
    Server,
}

impl EventDirection {
    /// Returns the canonical string label for this direction.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Client => "client",
            Self::Server => "server",
        }
    }
}

impl std::fmt::Display for EventDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EventDirection {
    type Err = ParseEventDirectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Self::Client),
            "server" => Ok(Self::Server),
            _ => Err(ParseEventDirectionError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown event direction string.
#[derive(Debug, Clone)]
pub struct ParseEventDirectionError(pub String);

impl std::fmt::Display for ParseEventDirectionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown event direction: {}", self.0)
    }
}

impl std::error::Error for ParseEventDirectionError {}

/// Structured payloads for the events the session engine itself emits.
///
/// Raw transport events are logged verbatim; these variants cover what the
/// engine derives on top of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum EventPayload {
    /// The session moved to a new connection status.
    #[serde(rename = "session.status")]
    ConnectionStatus { status: SessionStatus },

    /// A rate-limited request was scheduled for resubmission.
    #[serde(rename = "rate_limit_retry")]
    RateLimitRetry {
        /// 1-based attempt number.
        attempt: u32,
        max_retries: u32,
        message: String,
    },

    /// A rate-limited request was abandoned after the retry budget ran out.
    #[serde(rename = "rate_limit_max_retries")]
    RateLimitMaxRetries { max_retries: u32, message: String },

    /// A moderation verdict tripped the output guardrail.
    #[serde(rename = "guardrail_tripped")]
    GuardrailTripped { moderation: Value },

    /// The session reported an error.
    #[serde(rename = "error")]
    Error { message: Value },
}

impl EventPayload {
    /// Returns the canonical event type string for this payload.
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::ConnectionStatus { .. } => "session.status",
            Self::RateLimitRetry { .. } => "rate_limit_retry",
            Self::RateLimitMaxRetries { .. } => "rate_limit_max_retries",
            Self::GuardrailTripped { .. } => "guardrail_tripped",
            Self::Error { .. } => "error",
        }
    }

    /// Returns the direction this payload is logged under.
    pub fn direction(&self) -> EventDirection {
        match self {
            Self::ConnectionStatus { .. } => EventDirection::Client,
            Self::RateLimitRetry { .. }
            | Self::RateLimitMaxRetries { .. }
            | Self::GuardrailTripped { .. }
            | Self::Error { .. } => EventDirection::Server,
        }
    }
}

/// A single entry in the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Monotonically increasing sequence number within the log.
    pub seq: u64,
    pub direction: EventDirection,
    /// The `type` tag of the event (e.g. `response.done`).
    pub event_type: String,
    /// The full event as JSON.
    pub payload: Value,
    /// RFC 3339 timestamp of when the event was recorded.
    pub occurred_at: String,
}
