//! Shared data model for the Barista voice ordering assistant.
//!
//! This crate provides the foundational types used across all Barista crates:
//! transcript items and their lifecycle states, guardrail verdicts attached to
//! messages, connection status, and audio codec selection.
//!
//! No crate in the workspace depends on anything *except* `barista-types` for
//! cross-cutting type definitions. This keeps the dependency graph clean and
//! prevents circular dependencies.

use serde::{Deserialize, Serialize};
use serde_json::Value;

mod guardrail;
mod session;

pub use guardrail::{GuardrailResult, GuardrailStatus, CATEGORY_NONE};
pub use session::{AudioCodec, ParseAudioCodecError, SessionStatus};

/// Text shown for a user message whose audio has not been transcribed yet.
pub const TRANSCRIBING_PLACEHOLDER: &str = "[Transcribing...]";

/// Text shown for a completed transcription that contained no speech.
pub const INAUDIBLE_MARKER: &str = "[inaudible]";

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The customer speaking or typing to the assistant.
    User,
    /// The voice agent.
    Assistant,
    /// Instructions injected by the application.
    System,
}

impl Role {
    /// Returns the wire label for this role.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

/// Lifecycle state of a transcript item.
///
/// Streamed content starts `InProgress` and moves to `Done` exactly once.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemStatus {
    InProgress,
    Done,
}

impl ItemStatus {
    /// Combines the current status with a requested one without ever
    /// moving backwards from `Done`.
    pub fn advance(self, next: ItemStatus) -> ItemStatus {
        match (self, next) {
            (Self::Done, _) | (_, Self::Done) => Self::Done,
            _ => Self::InProgress,
        }
    }
}

/// What a transcript item represents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ItemKind {
    /// A conversational message.
    Message { role: Role, text: String },
    /// A non-conversational annotation such as a tool call or a system note.
    Breadcrumb {
        label: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        payload: Option<Value>,
    },
}

/// One unit of conversation history.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptItem {
    /// Identifier unique within a session.
    pub item_id: String,
    #[serde(flatten)]
    pub kind: ItemKind,
    pub status: ItemStatus,
    /// Capture time in milliseconds since the Unix epoch. Display order key.
    pub created_at_ms: i64,
    pub expanded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guardrail_result: Option<GuardrailResult>,
    pub is_hidden: bool,
}

impl TranscriptItem {
    /// Creates an in-progress message.
    pub fn message(
        item_id: impl Into<String>,
        role: Role,
        text: impl Into<String>,
        created_at_ms: i64,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            kind: ItemKind::Message {
                role,
                text: text.into(),
            },
            status: ItemStatus::InProgress,
            created_at_ms,
            expanded: false,
            guardrail_result: None,
            is_hidden: false,
        }
    }

    /// Creates a breadcrumb. Breadcrumbs are complete the moment they exist.
    pub fn breadcrumb(
        item_id: impl Into<String>,
        label: impl Into<String>,
        payload: Option<Value>,
        created_at_ms: i64,
    ) -> Self {
        Self {
            item_id: item_id.into(),
            kind: ItemKind::Breadcrumb {
                label: label.into(),
                payload,
            },
            status: ItemStatus::Done,
            created_at_ms,
            expanded: false,
            guardrail_result: None,
            is_hidden: false,
        }
    }

    /// Returns the role for messages, `None` for breadcrumbs.
    pub fn role(&self) -> Option<Role> {
        match &self.kind {
            ItemKind::Message { role, .. } => Some(*role),
            ItemKind::Breadcrumb { .. } => None,
        }
    }

    /// Returns the message text, or the label for breadcrumbs.
    pub fn title(&self) -> &str {
        match &self.kind {
            ItemKind::Message { text, .. } => text,
            ItemKind::Breadcrumb { label, .. } => label,
        }
    }

    pub fn is_message(&self) -> bool {
        matches!(self.kind, ItemKind::Message { .. })
    }

    pub fn is_breadcrumb(&self) -> bool {
        matches!(self.kind, ItemKind::Breadcrumb { .. })
    }

    /// True for assistant-authored messages.
    pub fn is_assistant_message(&self) -> bool {
        self.role() == Some(Role::Assistant)
    }

    /// Returns the breadcrumb payload, if any.
    pub fn payload(&self) -> Option<&Value> {
        match &self.kind {
            ItemKind::Breadcrumb { payload, .. } => payload.as_ref(),
            ItemKind::Message { .. } => None,
        }
    }

    /// True when the message text is a bracketed annotation such as
    /// [`TRANSCRIBING_PLACEHOLDER`] rather than spoken content.
    pub fn is_annotation(&self) -> bool {
        match &self.kind {
            ItemKind::Message { text, .. } => {
                text.len() >= 2 && text.starts_with('[') && text.ends_with(']')
            }
            ItemKind::Breadcrumb { .. } => false,
        }
    }

    /// Text as it should be displayed: annotations lose their brackets.
    pub fn display_text(&self) -> &str {
        let title = self.title();
        if self.is_annotation() {
            &title[1..title.len() - 1]
        } else {
            title
        }
    }

    /// Local wall-clock capture time formatted as `HH:MM:SS.mmm`.
    pub fn timestamp_label(&self) -> String {
        chrono::DateTime::from_timestamp_millis(self.created_at_ms)
            .map(|utc| {
                utc.with_timezone(&chrono::Local)
                    .format("%H:%M:%S%.3f")
                    .to_string()
            })
            .unwrap_or_default()
    }
}
