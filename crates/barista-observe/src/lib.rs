//! Observability layer for Barista sessions.
//!
//! Every transport event, connection status change, and retry decision is
//! recorded as a [`LoggedEvent`]: a record with a `type` tag, a direction
//! (`client` for events the application originates, `server` for events the
//! realtime service delivers) and a free-form JSON payload. Records live in a
//! bounded in-memory [`EventLog`] and are broadcast to live subscribers.
//!
//! # Event types
//!
//! | Direction | Example types |
//! |-----------|---------------|
//! | `client` | `session.status`, `conversation.item.create`, `response.create` |
//! | `server` | `response.done`, `rate_limit_retry`, `rate_limit_max_retries`, `guardrail_tripped`, `error` |
//!
//! # Usage
//!
//! ```rust,ignore
//! use barista_observe::{EventLog, EventPayload};
//!
//! let log = EventLog::new(1_000);
//! log.emit_or_warn(&EventPayload::RateLimitRetry {
//!     attempt: 1,
//!     max_retries: 5,
//!     message: "Rate limit exceeded, retrying in 5 seconds (Attempt 1/5)".into(),
//! });
//! ```

mod error;
mod event;
mod store;

pub use error::ObserveError;
pub use event::{EventDirection, EventPayload, LoggedEvent, ParseEventDirectionError};
pub use store::{EventFilter, EventLog, DEFAULT_EVENT_LOG_CAPACITY};
