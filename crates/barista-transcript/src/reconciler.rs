//! Applies inbound session events to the transcript store.
//!
//! An [`EventReconciler`] is created per connection and owns everything the
//! event stream needs between events: the delta queue, its active-item set
//! and whether a drain is running. It never touches a timer itself. Callers
//! apply events with [`EventReconciler::apply`], start a repeating drain when
//! the returned [`Reaction`] asks for one, and call
//! [`EventReconciler::drain_tick`] on every tick until it reports the queue
//! is idle.
//!
//! Every mutation is keyed by item id, so applying an event twice leaves the
//! store as applying it once did.

use std::sync::Arc;

use barista_observe::EventPayload;
use barista_types::{ItemStatus, Role, TRANSCRIBING_PLACEHOLDER};
use serde_json::{json, Value};

use crate::clock::Clock;
use crate::content::{
    extract_message_text, guardrail_correction, maybe_parse_json, normalize_transcript,
    GUARDRAIL_CORRECTION_LABEL,
};
use crate::delta::DeltaQueue;
use crate::events::{HistoryItem, ResponseInfo, RunContext, SessionEvent, TransportEvent};
use crate::guardrail::{extract_moderation, verdict_target};
use crate::store::TranscriptStore;

/// Prefix on a handoff tool name; the remainder is the destination agent.
pub const TRANSFER_MARKER: &str = "transfer_to_";

/// What the caller should do after an event was applied.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct Reaction {
    /// The delta queue went from idle to non-empty; start the drain timer.
    pub start_drain: bool,
    /// The conversation was handed off to this agent.
    pub handoff: Option<String>,
    /// A response finished, successfully or not.
    pub response_done: Option<ResponseInfo>,
    /// Derived observability events to record.
    pub notices: Vec<EventPayload>,
}

/// Result of a single drain tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DrainStep {
    /// A fragment was appended. `more` is false once the queue is empty.
    Applied { item_id: String, more: bool },
    /// Nothing was queued; the drain should stop.
    Idle,
}

/// Folds session and transport events into a [`TranscriptStore`].
///
/// Streaming fragments are queued rather than applied on arrival; the owner
/// drives [`EventReconciler::drain_tick`] on a timer to apply them one at a
/// time. Items with queued or draining fragments are treated as active and
/// are shielded from history snapshots.
pub struct EventReconciler {
    deltas: DeltaQueue,
    clock: Arc<dyn Clock>,
    draining: bool,
}

impl std::fmt::Debug for EventReconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventReconciler")
            .field("deltas", &self.deltas)
            .field("draining", &self.draining)
            .finish()
    }
}

impl EventReconciler {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            deltas: DeltaQueue::new(),
            clock,
            draining: false,
        }
    }

    /// Applies one event. Never fails: malformed content is logged and the
    /// affected mutation skipped.
    pub fn apply(&mut self, store: &mut TranscriptStore, event: &SessionEvent) -> Reaction {
        let mut reaction = Reaction::default();
        match event {
            SessionEvent::HistoryAdded { item } => self.on_history_added(store, item),
            SessionEvent::HistoryUpdated { items } => self.on_history_updated(store, items),
            SessionEvent::AgentToolStart { context, tool } => {
                self.on_tool_start(store, context, &tool.name)
            }
            SessionEvent::AgentToolEnd {
                context: _,
                tool,
                result,
            } => self.on_tool_end(store, &tool.name, result),
            SessionEvent::GuardrailTripped {
                context,
                item_id,
                result,
            } => {
                if let Some(notice) =
                    self.on_guardrail_tripped(store, context, item_id.as_deref(), result)
                {
                    reaction.notices.push(notice);
                }
            }
            SessionEvent::AgentHandoff { context } => reaction.handoff = handoff_target(context),
            SessionEvent::Transport { payload } => {
                self.on_transport(store, payload, &mut reaction)
            }
            SessionEvent::Error { error } => {
                tracing::warn!(error = %error, "session reported an error");
                reaction.notices.push(EventPayload::Error {
                    message: error.clone(),
                });
            }
            SessionEvent::Unrecognized { name, .. } => {
                tracing::debug!(event = %name, "ignoring unrecognized session event");
            }
        }
        reaction
    }

    /// Applies the oldest queued fragment.
    pub fn drain_tick(&mut self, store: &mut TranscriptStore) -> DrainStep {
        let Some(entry) = self.deltas.pop() else {
            self.draining = false;
            return DrainStep::Idle;
        };

        if !store.contains(&entry.item_id) {
            self.ensure_message(store, &entry.item_id, Role::Assistant);
        }
        if let Err(e) = store.update_message(&entry.item_id, &entry.fragment, true) {
            tracing::warn!(item_id = %entry.item_id, "dropping delta: {}", e);
        }
        let completed = store
            .get(&entry.item_id)
            .is_some_and(|item| item.status == ItemStatus::Done);
        if completed && !self.deltas.is_active(&entry.item_id) {
            if let Err(e) = store.mark_done(&entry.item_id) {
                tracing::warn!(item_id = %entry.item_id, "could not settle item: {}", e);
            }
        }

        let more = !self.deltas.is_empty();
        if !more {
            self.draining = false;
        }
        DrainStep::Applied {
            item_id: entry.item_id,
            more,
        }
    }

    /// Whether fragments for this item are still queued.
    pub fn is_active(&self, item_id: &str) -> bool {
        self.deltas.is_active(item_id)
    }

    pub fn pending_deltas(&self) -> usize {
        self.deltas.len()
    }

    pub fn is_draining(&self) -> bool {
        self.draining
    }

    /// Drops all queued fragments. Used on teardown.
    pub fn reset(&mut self) {
        self.deltas.clear();
        self.draining = false;
    }

    // ── history ──────────────────────────────────────────────────────

    fn on_history_added(&mut self, store: &mut TranscriptStore, item: &HistoryItem) {
        let HistoryItem::Message {
            item_id,
            role,
            content,
            ..
        } = item
        else {
            return;
        };

        let text = extract_message_text(content);
        if let Some(details) = guardrail_correction(&text) {
            tracing::debug!(item_id = %item_id, "guardrail correction recorded as breadcrumb");
            if let Err(e) = store.upsert_breadcrumb(
                item_id,
                GUARDRAIL_CORRECTION_LABEL,
                Some(json!({ "details": details })),
                self.clock.now_ms(),
            ) {
                tracing::warn!("guardrail correction skipped: {}", e);
            }
            return;
        }

        let text = if *role == Role::User && text.is_empty() {
            TRANSCRIBING_PLACEHOLDER.to_string()
        } else {
            text
        };

        if let Some(existing) = store.get(item_id) {
            // Streamed text is in flight, or a placeholder would replace
            // real content: keep what is displayed.
            let keep_text = self.deltas.is_active(item_id)
                || ((text.is_empty() || text == TRANSCRIBING_PLACEHOLDER)
                    && !existing.title().is_empty());
            if keep_text {
                let current = existing.title().to_string();
                self.upsert(store, item_id, *role, current);
                return;
            }
        }

        // Typed user input has no transcription to wait for.
        let finished =
            item.is_completed() || (*role == Role::User && text != TRANSCRIBING_PLACEHOLDER);
        self.upsert(store, item_id, *role, text);
        if finished {
            if let Err(e) = store.mark_done(item_id) {
                tracing::warn!("history item not completed: {}", e);
            }
        }
    }

    fn on_history_updated(&mut self, store: &mut TranscriptStore, items: &[HistoryItem]) {
        for item in items {
            let HistoryItem::Message {
                item_id, content, ..
            } = item
            else {
                continue;
            };
            if self.deltas.is_active(item_id) {
                tracing::trace!(item_id = %item_id, "snapshot skipped for streaming item");
                continue;
            }
            let text = extract_message_text(content);
            if text.is_empty() || !store.contains(item_id) {
                continue;
            }
            let updated = store.update_message(item_id, &text, false).and_then(|()| {
                if item.is_completed() {
                    store.mark_done(item_id)
                } else {
                    Ok(())
                }
            });
            if let Err(e) = updated {
                tracing::warn!(item_id = %item_id, "snapshot update skipped: {}", e);
            }
        }
    }

    // ── tools ────────────────────────────────────────────────────────

    fn on_tool_start(&mut self, store: &mut TranscriptStore, context: &RunContext, name: &str) {
        let arguments = context.history.iter().rev().find_map(|item| match item {
            HistoryItem::FunctionCall {
                name: call_name,
                arguments,
                ..
            } if call_name == name => Some(maybe_parse_json(arguments)),
            _ => None,
        });
        if arguments.is_none() {
            tracing::debug!(tool = name, "no call record for tool start");
        }
        store.add_breadcrumb(
            format!("function call: {name}"),
            arguments,
            self.clock.now_ms(),
        );
    }

    fn on_tool_end(&mut self, store: &mut TranscriptStore, name: &str, result: &Value) {
        store.add_breadcrumb(
            format!("function call result: {name}"),
            Some(maybe_parse_json(result)),
            self.clock.now_ms(),
        );
    }

    // ── guardrail ────────────────────────────────────────────────────

    fn on_guardrail_tripped(
        &mut self,
        store: &mut TranscriptStore,
        context: &RunContext,
        explicit: Option<&str>,
        result: &Value,
    ) -> Option<EventPayload> {
        let moderation = extract_moderation(result);
        let notice = EventPayload::GuardrailTripped {
            moderation: moderation
                .as_ref()
                .map_or(Value::Null, |m| m.raw.clone()),
        };

        let Some(moderation) = moderation else {
            tracing::warn!("guardrail tripped without a moderation verdict");
            return Some(notice);
        };
        let Some(target) = verdict_target(explicit, context) else {
            tracing::warn!(
                category = %moderation.category,
                "no assistant message to attach guardrail verdict to"
            );
            return Some(notice);
        };

        match store.set_guardrail(target, moderation.to_result()) {
            Ok(()) => tracing::info!(
                item_id = target,
                category = %moderation.category,
                "guardrail verdict attached"
            ),
            Err(e) => tracing::warn!("guardrail verdict dropped: {}", e),
        }
        Some(notice)
    }

    // ── transport ────────────────────────────────────────────────────

    fn on_transport(&mut self, store: &mut TranscriptStore, raw: &Value, reaction: &mut Reaction) {
        let event = match TransportEvent::classify(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("ignoring transport event: {}", e);
                return;
            }
        };

        match event {
            TransportEvent::InputTranscriptionCompleted {
                item_id,
                transcript,
            } => self.complete(store, &item_id, transcript.as_deref(), Role::User),
            TransportEvent::AudioTranscriptDone {
                item_id,
                transcript,
            } => self.complete(store, &item_id, transcript.as_deref(), Role::Assistant),
            TransportEvent::AudioTranscriptDelta { item_id, delta } => {
                if delta.is_empty() {
                    return;
                }
                if !store.contains(&item_id) {
                    self.ensure_message(store, &item_id, Role::Assistant);
                }
                self.deltas.push(&item_id, delta);
                if !self.draining {
                    self.draining = true;
                    reaction.start_drain = true;
                }
            }
            TransportEvent::ContentPartDone { item_id, part } => {
                if let Some(transcript) = part.text().filter(|t| part.is_audio() && !t.is_empty())
                {
                    self.complete(store, &item_id, Some(transcript), Role::Assistant);
                }
            }
            TransportEvent::OutputItemDone { item } => {
                if let (Some(item_id), Some(transcript)) = (&item.id, item.audio_transcript()) {
                    self.complete(store, item_id, Some(transcript), Role::Assistant);
                }
            }
            TransportEvent::ResponseDone { response } => reaction.response_done = Some(response),
            TransportEvent::Unhandled => {}
        }
    }

    /// Final text arrived for an item, independent of its deltas.
    fn complete(
        &mut self,
        store: &mut TranscriptStore,
        item_id: &str,
        transcript: Option<&str>,
        role_hint: Role,
    ) {
        if self.deltas.is_active(item_id) {
            // The queue converges on the full text by itself; the default
            // verdict waits for the last fragment.
            if let Err(e) = store.update_status(item_id, ItemStatus::Done) {
                tracing::warn!("completion for streaming item skipped: {}", e);
            }
            return;
        }

        let dropped = self.deltas.discard(item_id);
        if dropped > 0 {
            tracing::debug!(item_id, dropped, "discarded stale deltas");
        }

        let text = normalize_transcript(transcript);
        let applied = if store.contains(item_id) {
            store.update_message(item_id, &text, false)
        } else {
            store
                .add_message(item_id, role_hint, text, false, self.clock.now_ms())
                .map(|_| ())
        };
        if let Err(e) = applied.and_then(|()| store.mark_done(item_id)) {
            tracing::warn!("completion skipped: {}", e);
        }
    }

    fn ensure_message(&self, store: &mut TranscriptStore, item_id: &str, role: Role) {
        if let Err(e) = store.add_message(item_id, role, "", false, self.clock.now_ms()) {
            tracing::warn!("could not create message: {}", e);
        }
    }

    fn upsert(&self, store: &mut TranscriptStore, item_id: &str, role: Role, text: String) {
        let hidden = role == Role::System;
        if let Err(e) = store.add_message(item_id, role, text, hidden, self.clock.now_ms()) {
            tracing::warn!("history item skipped: {}", e);
        }
    }
}

/// Destination agent named by the last history entry of a handoff.
fn handoff_target(context: &RunContext) -> Option<String> {
    let target = context
        .history
        .last()
        .and_then(HistoryItem::function_name)
        .and_then(|name| name.split_once(TRANSFER_MARKER))
        .map(|(_, agent)| agent)
        .filter(|agent| !agent.is_empty())
        .map(str::to_string);
    if target.is_none() {
        tracing::warn!("handoff without a transfer target");
    }
    target
}
