//! In-memory storage for the session event log.
//!
//! All writes go through [`EventLog::record`], which assigns a monotonically
//! increasing sequence number, timestamps the record, appends it to a bounded
//! buffer (evicting the oldest record when full) and broadcasts it to live
//! subscribers.
//!
//! Reads go through [`EventLog::query`], which supports filtering by
//! direction and event type with cursor-based pagination on `seq`.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use serde_json::Value;
use tokio::sync::broadcast;

use crate::error::ObserveError;
use crate::event::{EventDirection, EventPayload, LoggedEvent};

/// Default number of records retained by [`EventLog::default`].
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 1_000;

/// Capacity of the live subscriber channel.
const BROADCAST_CAPACITY: usize = 256;

/// Event type recorded for transport events that carry no `type` tag.
const UNTYPED_EVENT: &str = "unknown";

struct LogState {
    events: VecDeque<LoggedEvent>,
    next_seq: u64,
}

/// Bounded, shareable event log. Cloning yields another handle to the same log.
#[derive(Clone)]
pub struct EventLog {
    state: Arc<Mutex<LogState>>,
    capacity: usize,
    tx: broadcast::Sender<LoggedEvent>,
}

impl std::fmt::Debug for EventLog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventLog")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_LOG_CAPACITY)
    }
}

impl EventLog {
    /// Creates a log retaining at most `capacity` records (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(LogState {
                events: VecDeque::new(),
                next_seq: 1,
            })),
            capacity: capacity.max(1),
            tx,
        }
    }

    /// Appends a record and broadcasts it.
    pub fn record(
        &self,
        direction: EventDirection,
        event_type: impl Into<String>,
        payload: Value,
    ) -> LoggedEvent {
        let event = {
            let mut state = self.lock_state();
            let event = LoggedEvent {
                seq: state.next_seq,
                direction,
                event_type: event_type.into(),
                payload,
                occurred_at: chrono::Utc::now().to_rfc3339(),
            };
            state.next_seq += 1;
            if state.events.len() == self.capacity {
                state.events.pop_front();
            }
            state.events.push_back(event.clone());
            event
        };

        // No receivers is the common case outside of the HTTP stream.
        let _ = self.tx.send(event.clone());
        event
    }

    /// Records a typed engine event.
    ///
    /// # Errors
    ///
    /// Returns `ObserveError::Serialization` if the payload cannot be
    /// serialised, or `ObserveError::NotAnObject` if it does not serialise
    /// to a JSON object.
    pub fn emit(&self, payload: &EventPayload) -> Result<LoggedEvent, ObserveError> {
        let value = serde_json::to_value(payload)?;
        if !value.is_object() {
            return Err(ObserveError::NotAnObject(value.to_string()));
        }
        Ok(self.record(payload.direction(), payload.event_type(), value))
    }

    /// Records a typed engine event, logging failures as warnings instead of
    /// returning them.
    pub fn emit_or_warn(&self, payload: &EventPayload) {
        if let Err(e) = self.emit(payload) {
            tracing::warn!(
                event_type = payload.event_type(),
                "failed to emit observe event: {}",
                e
            );
        }
    }

    /// Records a raw event received from the realtime service. The event type
    /// is taken from its `type` field.
    pub fn log_server_event(&self, raw: &Value) -> LoggedEvent {
        self.record(EventDirection::Server, event_type_of(raw), raw.clone())
    }

    /// Records a raw event this application sent or originated.
    pub fn log_client_event(&self, raw: &Value) -> LoggedEvent {
        self.record(EventDirection::Client, event_type_of(raw), raw.clone())
    }

    /// Returns records matching `filter` in sequence order.
    pub fn query(&self, filter: &EventFilter) -> Vec<LoggedEvent> {
        let limit = filter.limit.unwrap_or(100);
        let state = self.lock_state();
        state
            .events
            .iter()
            .filter(|e| filter.since_seq.map_or(true, |since| e.seq > since))
            .filter(|e| filter.direction.map_or(true, |d| e.direction == d))
            .filter(|e| {
                filter
                    .event_type
                    .as_deref()
                    .map_or(true, |t| e.event_type == t)
            })
            .take(limit)
            .cloned()
            .collect()
    }

    /// Subscribes to records appended after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<LoggedEvent> {
        self.tx.subscribe()
    }

    /// Number of records currently retained.
    pub fn len(&self) -> usize {
        self.lock_state().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock_state(&self) -> MutexGuard<'_, LogState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

/// Filter criteria for querying the event log.
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// Filter by direction.
    pub direction: Option<EventDirection>,
    /// Filter by event type string.
    pub event_type: Option<String>,
    /// Return events with a sequence number strictly greater than this.
    pub since_seq: Option<u64>,
    /// Maximum number of events to return (default: 100).
    pub limit: Option<usize>,
}

fn event_type_of(raw: &Value) -> String {
    raw.get("type")
        .and_then(Value::as_str)
        .unwrap_or(UNTYPED_EVENT)
        .to_string()
}
