//! Inbound session events.
//!
//! Two layers arrive on the same channel:
//!
//! - [`SessionEvent`]: the agent-level notifications (history changes, tool
//!   calls, guardrail verdicts, handoffs, errors).
//! - Raw transport events carried by [`SessionEvent::Transport`], decoded on
//!   demand by [`TransportEvent::classify`]. Raw payloads are kept as JSON so
//!   every one of them can be forwarded to the event log, including the kinds
//!   this crate does not act on.
//!
//! History lists are decoded leniently: an entry that does not match any
//! known shape is logged and skipped rather than failing the whole event.

use barista_types::Role;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::TranscriptError;

/// One sub-part of a history message's content list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    InputText {
        #[serde(default)]
        text: Option<String>,
    },
    OutputText {
        #[serde(default)]
        text: Option<String>,
    },
    Text {
        #[serde(default)]
        text: Option<String>,
    },
    Audio {
        #[serde(default)]
        transcript: Option<String>,
    },
    InputAudio {
        #[serde(default)]
        transcript: Option<String>,
    },
    OutputAudio {
        #[serde(default)]
        transcript: Option<String>,
    },
    /// Any part kind with no displayable text (images, refusals, ...).
    #[serde(other)]
    Unsupported,
}

impl ContentPart {
    /// Displayable text carried by this part, if any.
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::InputText { text } | Self::OutputText { text } | Self::Text { text } => {
                text.as_deref()
            }
            Self::Audio { transcript }
            | Self::InputAudio { transcript }
            | Self::OutputAudio { transcript } => transcript.as_deref(),
            Self::Unsupported => None,
        }
    }

    /// True for audio parts of any direction.
    pub fn is_audio(&self) -> bool {
        matches!(
            self,
            Self::Audio { .. } | Self::InputAudio { .. } | Self::OutputAudio { .. }
        )
    }
}

/// An entry in the session's canonical history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HistoryItem {
    Message {
        #[serde(rename = "itemId")]
        item_id: String,
        role: Role,
        #[serde(default)]
        content: Vec<ContentPart>,
        /// `in_progress`, `completed` or `incomplete`.
        #[serde(default)]
        status: Option<String>,
    },
    FunctionCall {
        #[serde(rename = "itemId", default)]
        item_id: Option<String>,
        name: String,
        /// JSON-encoded argument object as sent by the model.
        #[serde(default)]
        arguments: Value,
        #[serde(default)]
        output: Option<Value>,
    },
    /// Handoff markers, tool outputs and anything else without transcript text.
    #[serde(other)]
    Other,
}

impl HistoryItem {
    /// The `name` of a function-call entry.
    pub fn function_name(&self) -> Option<&str> {
        match self {
            Self::FunctionCall { name, .. } => Some(name),
            _ => None,
        }
    }

    /// True for a message the service reports as finished.
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Message { status: Some(s), .. } if s == "completed")
    }
}

/// The run context passed alongside agent-level notifications.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunContext {
    #[serde(default, deserialize_with = "lenient_history")]
    pub history: Vec<HistoryItem>,
}

impl RunContext {
    pub fn new(history: Vec<HistoryItem>) -> Self {
        Self { history }
    }
}

/// Identifies the tool an agent invoked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolRef {
    pub name: String,
}

/// Agent-level session notification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// A new item appeared in canonical history.
    HistoryAdded { item: HistoryItem },

    /// Full refresh of canonical history.
    HistoryUpdated {
        #[serde(deserialize_with = "lenient_history")]
        items: Vec<HistoryItem>,
    },

    AgentToolStart {
        #[serde(default)]
        context: RunContext,
        tool: ToolRef,
    },

    AgentToolEnd {
        #[serde(default)]
        context: RunContext,
        tool: ToolRef,
        #[serde(default)]
        result: Value,
    },

    /// An output guardrail flagged assistant content.
    GuardrailTripped {
        #[serde(default)]
        context: RunContext,
        /// Explicit reference to the judged message, when the upstream
        /// contract provides one.
        #[serde(rename = "itemId", default)]
        item_id: Option<String>,
        #[serde(default)]
        result: Value,
    },

    AgentHandoff {
        #[serde(default)]
        context: RunContext,
    },

    /// A raw transport event.
    Transport { payload: Value },

    Error {
        #[serde(default)]
        error: Value,
    },

    /// An event kind this engine does not act on, kept verbatim for logging.
    #[serde(skip_deserializing)]
    Unrecognized { name: String, raw: Value },
}

/// Tags of the session events that are decoded into typed variants.
const KNOWN_SESSION_EVENTS: [&str; 8] = [
    "history_added",
    "history_updated",
    "agent_tool_start",
    "agent_tool_end",
    "guardrail_tripped",
    "agent_handoff",
    "transport",
    "error",
];

impl SessionEvent {
    /// Decodes an event from its JSON form.
    ///
    /// An event whose `event` tag names no known kind decodes to
    /// [`SessionEvent::Unrecognized`].
    ///
    /// # Errors
    ///
    /// Returns `TranscriptError::MalformedEvent` if the value has no `event`
    /// tag, or a known tag with a body that does not match its shape.
    pub fn from_value(value: Value) -> Result<Self, TranscriptError> {
        if let Some(name) = value.get("event").and_then(Value::as_str) {
            if !KNOWN_SESSION_EVENTS.contains(&name) {
                return Ok(Self::Unrecognized {
                    name: name.to_string(),
                    raw: value,
                });
            }
        }
        serde_json::from_value(value).map_err(|source| TranscriptError::MalformedEvent {
            kind: "session",
            source,
        })
    }

    /// Wire label of this event kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::HistoryAdded { .. } => "history_added",
            Self::HistoryUpdated { .. } => "history_updated",
            Self::AgentToolStart { .. } => "agent_tool_start",
            Self::AgentToolEnd { .. } => "agent_tool_end",
            Self::GuardrailTripped { .. } => "guardrail_tripped",
            Self::AgentHandoff { .. } => "agent_handoff",
            Self::Transport { .. } => "transport",
            Self::Error { .. } => "error",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }
}

/// Terminal error detail of a response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseError {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusDetails {
    #[serde(default)]
    pub error: Option<ResponseError>,
}

/// The `response` object of a `response.done` transport event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseInfo {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub status_details: Option<StatusDetails>,
}

/// Error code the realtime service reports when the caller must back off.
pub const RATE_LIMIT_CODE: &str = "rate_limit_exceeded";

impl ResponseInfo {
    pub fn is_failed(&self) -> bool {
        self.status.as_deref() == Some("failed")
    }

    pub fn error_code(&self) -> Option<&str> {
        self.status_details
            .as_ref()
            .and_then(|d| d.error.as_ref())
            .and_then(|e| e.code.as_deref())
    }

    /// True for a failed response whose error code signals rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        self.is_failed() && self.error_code() == Some(RATE_LIMIT_CODE)
    }
}

/// The `item` of a `response.output_item.done` transport event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OutputItem {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub content: Vec<ContentPart>,
}

impl OutputItem {
    /// The first non-empty audio transcript in a message item.
    pub fn audio_transcript(&self) -> Option<&str> {
        if self.kind.as_deref() != Some("message") {
            return None;
        }
        self.content
            .iter()
            .filter(|part| part.is_audio())
            .filter_map(ContentPart::text)
            .find(|t| !t.is_empty())
    }
}

/// The transport event kinds the reconciler acts on.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type")]
pub enum TransportEvent {
    #[serde(rename = "conversation.item.input_audio_transcription.completed")]
    InputTranscriptionCompleted {
        item_id: String,
        #[serde(default)]
        transcript: Option<String>,
    },

    #[serde(rename = "response.audio_transcript.delta")]
    AudioTranscriptDelta {
        item_id: String,
        #[serde(default)]
        delta: String,
    },

    #[serde(rename = "response.audio_transcript.done")]
    AudioTranscriptDone {
        item_id: String,
        #[serde(default)]
        transcript: Option<String>,
    },

    #[serde(rename = "response.content_part.done")]
    ContentPartDone { item_id: String, part: ContentPart },

    #[serde(rename = "response.output_item.done")]
    OutputItemDone { item: OutputItem },

    #[serde(rename = "response.done")]
    ResponseDone {
        #[serde(default)]
        response: ResponseInfo,
    },

    /// Every other transport event type.
    #[serde(other)]
    Unhandled,
}

impl TransportEvent {
    /// Classifies a raw transport event.
    ///
    /// # Errors
    ///
    /// Returns `TranscriptError::MalformedEvent` when the `type` is known but
    /// the fields it requires are missing or mistyped.
    pub fn classify(raw: &Value) -> Result<Self, TranscriptError> {
        Self::deserialize(raw).map_err(|source| TranscriptError::MalformedEvent {
            kind: "transport",
            source,
        })
    }
}

fn lenient_history<'de, D>(deserializer: D) -> Result<Vec<HistoryItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Vec::<Value>::deserialize(deserializer)?;
    Ok(raw
        .into_iter()
        .filter_map(|entry| match serde_json::from_value(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                tracing::warn!("skipping malformed history entry: {}", e);
                None
            }
        })
        .collect())
}
