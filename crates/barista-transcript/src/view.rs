//! Read-only queries the display layer derives from the store.
//!
//! All time-window checks take `now_ms` explicitly so they can be evaluated
//! against a manual clock.

use barista_types::{ItemStatus, Role, TranscriptItem};
use serde::Serialize;

use crate::store::TranscriptStore;

const CALL_PREFIX: &str = "function call: ";
const RESULT_PREFIX: &str = "function call result: ";
const AGENT_PREFIX: &str = "Agent:";
const ORDER_PREFIXES: [&str; 2] = ["Order completed:", "Order ended:"];

/// How long an agent breadcrumb keeps the loading indicator alive.
pub const AGENT_LOADING_WINDOW_MS: i64 = 5_000;
/// An assistant message this recent means the agent already answered.
pub const ASSISTANT_QUIET_WINDOW_MS: i64 = 2_000;
/// How long an order completion breadcrumb stays current.
pub const ORDER_COMPLETION_WINDOW_MS: i64 = 2_000;
/// How long the latest tool status stays on screen.
pub const FUNCTION_CALL_STATUS_TTL_MS: i64 = 3_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CallState {
    Calling,
    Success,
}

/// The most recent tool activity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FunctionCallStatus {
    pub name: String,
    pub state: CallState,
    pub at_ms: i64,
}

/// Newest visible assistant message.
pub fn latest_assistant_message(store: &TranscriptStore) -> Option<&TranscriptItem> {
    store
        .visible()
        .into_iter()
        .rev()
        .find(|item| item.role() == Some(Role::Assistant))
}

/// True while the newest assistant message is still receiving text.
pub fn is_streaming(store: &TranscriptStore) -> bool {
    latest_assistant_message(store).is_some_and(|item| item.status == ItemStatus::InProgress)
}

/// Newest tool call or tool result breadcrumb.
pub fn latest_function_call(store: &TranscriptStore) -> Option<FunctionCallStatus> {
    store.ordered().into_iter().rev().find_map(|item| {
        if !item.is_breadcrumb() {
            return None;
        }
        let label = item.title();
        let (rest, state) = if let Some(rest) = label.strip_prefix(RESULT_PREFIX) {
            (rest, CallState::Success)
        } else if let Some(rest) = label.strip_prefix(CALL_PREFIX) {
            (rest, CallState::Calling)
        } else {
            return None;
        };
        let name = leading_word(rest);
        (!name.is_empty()).then(|| FunctionCallStatus {
            name: name.to_string(),
            state,
            at_ms: item.created_at_ms,
        })
    })
}

/// [`latest_function_call`], only while it is recent enough to show.
pub fn active_function_call(store: &TranscriptStore, now_ms: i64) -> Option<FunctionCallStatus> {
    latest_function_call(store).filter(|call| now_ms - call.at_ms <= FUNCTION_CALL_STATUS_TTL_MS)
}

/// An agent was just handed the conversation and has not answered yet.
pub fn is_agent_loading(store: &TranscriptStore, now_ms: i64) -> bool {
    let items = store.visible();
    let recent_agent = items.iter().any(|item| {
        item.is_breadcrumb()
            && item.title().starts_with(AGENT_PREFIX)
            && now_ms - item.created_at_ms <= AGENT_LOADING_WINDOW_MS
    });
    let recent_answer = items.iter().any(|item| {
        item.role() == Some(Role::Assistant)
            && now_ms - item.created_at_ms <= ASSISTANT_QUIET_WINDOW_MS
    });
    recent_agent && !recent_answer && !is_streaming(store)
}

/// The order completion breadcrumb, if one was added within the window.
pub fn recent_order_completion(store: &TranscriptStore, now_ms: i64) -> Option<&TranscriptItem> {
    store.visible().into_iter().rev().find(|item| {
        item.is_breadcrumb()
            && ORDER_PREFIXES.iter().any(|p| item.title().starts_with(p))
            && now_ms - item.created_at_ms <= ORDER_COMPLETION_WINDOW_MS
    })
}

/// Copyable plain-text rendering of the visible transcript.
pub fn to_plain_text(store: &TranscriptStore) -> String {
    store
        .visible()
        .into_iter()
        .map(|item| match item.role() {
            Some(role) => format!("{}: {}", role.as_str(), item.display_text()),
            None => format!("* {}", item.title()),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn leading_word(s: &str) -> &str {
    let end = s
        .find(|c: char| !(c.is_alphanumeric() || c == '_'))
        .unwrap_or(s.len());
    &s[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_with(items: &[(&str, Option<Role>, &str, i64)]) -> TranscriptStore {
        let mut store = TranscriptStore::new();
        for (id, role, text, at) in items {
            match role {
                Some(role) => {
                    store.add_message(id, *role, *text, false, *at).unwrap();
                }
                None => {
                    store.add_breadcrumb(*text, None, *at);
                }
            }
        }
        store
    }

    #[test]
    fn streaming_follows_latest_assistant_status() {
        let mut store = store_with(&[
            ("a1", Some(Role::Assistant), "Hi", 0),
            ("a2", Some(Role::Assistant), "What", 10),
        ]);
        assert_eq!(latest_assistant_message(&store).unwrap().item_id, "a2");
        assert!(is_streaming(&store));

        store.mark_done("a2").unwrap();
        assert!(!is_streaming(&store));
    }

    #[test]
    fn hidden_assistant_messages_are_skipped() {
        let mut store = store_with(&[
            ("a1", Some(Role::Assistant), "Hi", 0),
            ("a2", Some(Role::Assistant), "secret", 10),
        ]);
        store.set_hidden("a2", true).unwrap();
        assert_eq!(latest_assistant_message(&store).unwrap().item_id, "a1");
    }

    #[test]
    fn latest_function_call_reads_newest_breadcrumb() {
        let store = store_with(&[
            ("", None, "function call: getMenu", 0),
            ("", None, "function call result: getMenu", 10),
            ("", None, "function call: addItemToOrder", 20),
            ("", None, "Agent: cafeAgent", 30),
        ]);
        let call = latest_function_call(&store).unwrap();
        assert_eq!(call.name, "addItemToOrder");
        assert_eq!(call.state, CallState::Calling);
        assert_eq!(call.at_ms, 20);

        assert!(active_function_call(&store, 3_020).is_some());
        assert!(active_function_call(&store, 3_021).is_none());
    }

    #[test]
    fn result_breadcrumb_reports_success() {
        let store = store_with(&[("", None, "function call result: finalizeOrder", 5)]);
        let call = latest_function_call(&store).unwrap();
        assert_eq!(call.name, "finalizeOrder");
        assert_eq!(call.state, CallState::Success);
    }

    #[test]
    fn agent_loading_until_assistant_answers() {
        let mut store = store_with(&[("", None, "Agent: baristaAgent", 1_000)]);
        assert!(is_agent_loading(&store, 2_000));
        assert!(!is_agent_loading(&store, 6_001), "breadcrumb too old");

        store
            .add_message("a1", Role::Assistant, "Hello", false, 2_500)
            .unwrap();
        store.mark_done("a1").unwrap();
        assert!(!is_agent_loading(&store, 3_000), "answer is recent");
        assert!(is_agent_loading(&store, 5_000), "answer is stale");
    }

    #[test]
    fn agent_loading_is_false_while_streaming() {
        let store = store_with(&[
            ("a1", Some(Role::Assistant), "Hel", 0),
            ("", None, "Agent: baristaAgent", 3_000),
        ]);
        assert!(!is_agent_loading(&store, 3_500));
    }

    #[test]
    fn order_completion_window() {
        let store = store_with(&[("", None, "Order completed: #42", 10_000)]);
        assert!(recent_order_completion(&store, 11_000).is_some());
        assert!(recent_order_completion(&store, 12_001).is_none());

        let ended = store_with(&[("", None, "Order ended: cancelled", 0)]);
        assert!(recent_order_completion(&ended, 100).is_some());
    }

    #[test]
    fn plain_text_strips_annotation_brackets() {
        let mut store = store_with(&[
            ("u1", Some(Role::User), "[inaudible]", 0),
            ("", None, "function call: getMenu", 1),
            ("a1", Some(Role::Assistant), "Sorry?", 2),
            ("s1", Some(Role::System), "rules", 3),
        ]);
        store.set_hidden("s1", true).unwrap();

        assert_eq!(
            to_plain_text(&store),
            "user: inaudible\n* function call: getMenu\nassistant: Sorry?"
        );
    }
}
