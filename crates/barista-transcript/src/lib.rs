//! Transcript reconciliation for the Barista voice ordering assistant.
//!
//! Reduces the session's event stream into a single ordered transcript.
//!
//! | Module | Contents |
//! |--------|----------|
//! | `store` | [`TranscriptStore`], one item per id, display ordering |
//! | `delta` | [`DeltaQueue`] of streamed fragments and the active-item set |
//! | `events` | Inbound [`SessionEvent`]s and raw [`TransportEvent`] classification |
//! | `reconciler` | [`EventReconciler`], applying events to the store |
//! | `guardrail` | Moderation verdict extraction and target correlation |
//! | `content` | Message text extraction and payload parsing |
//! | `view` | Derived display queries |
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use barista_transcript::{EventReconciler, SessionEvent, SystemClock, TranscriptStore};
//! use serde_json::json;
//!
//! let mut store = TranscriptStore::new();
//! let mut reconciler = EventReconciler::new(Arc::new(SystemClock));
//!
//! let event = SessionEvent::from_value(json!({
//!     "event": "history_added",
//!     "item": {
//!         "type": "message",
//!         "itemId": "m1",
//!         "role": "user",
//!         "content": [{"type": "input_text", "text": "Large latte"}]
//!     }
//! }))
//! .unwrap();
//! reconciler.apply(&mut store, &event);
//!
//! assert_eq!(store.get("m1").unwrap().title(), "Large latte");
//! ```

mod clock;
mod content;
mod delta;
mod error;
mod events;
pub mod guardrail;
mod reconciler;
mod store;
pub mod view;

pub use clock::{Clock, ManualClock, SystemClock};
pub use content::{
    extract_message_text, maybe_parse_json, normalize_transcript, GUARDRAIL_CORRECTION_LABEL,
};
pub use delta::{DeltaEntry, DeltaQueue};
pub use error::TranscriptError;
pub use events::{
    ContentPart, HistoryItem, OutputItem, ResponseError, ResponseInfo, RunContext, SessionEvent,
    StatusDetails, ToolRef, TransportEvent, RATE_LIMIT_CODE,
};
pub use reconciler::{DrainStep, EventReconciler, Reaction, TRANSFER_MARKER};
pub use store::{TranscriptStore, Upsert};
