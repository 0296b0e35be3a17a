//! Matching moderation verdicts back to the messages they judge.
//!
//! A tripped guardrail reports its verdict inside a tree of wrapper objects
//! whose shape depends on how the guardrail was composed. The verdict is the
//! first object, following the wrapper keys, that exposes a
//! `moderationCategory`. The descent is bounded so malformed or cyclic-looking
//! input cannot loop.
//!
//! The verdict event does not always say which message it judges. When it
//! does, that reference wins. Otherwise the most recent assistant message in
//! the run context is assumed, which can misattribute when history is
//! reordered.

use barista_types::{GuardrailResult, Role, CATEGORY_NONE};
use serde_json::{Map, Value};

use crate::events::{HistoryItem, RunContext};

/// Wrapper keys followed while searching for the verdict, in priority order.
const WRAPPER_KEYS: [&str; 3] = ["outputInfo", "output", "result"];

/// Maximum number of wrapper levels descended.
pub const MAX_MODERATION_DEPTH: usize = 8;

/// A moderation verdict extracted from a guardrail result.
#[derive(Debug, Clone, PartialEq)]
pub struct Moderation {
    pub category: String,
    pub rationale: String,
    pub test_text: Option<String>,
    /// The object the verdict was read from.
    pub raw: Value,
}

impl Moderation {
    fn from_object(obj: &Map<String, Value>) -> Self {
        let field = |key: &str| obj.get(key).and_then(Value::as_str).map(str::to_string);
        Self {
            category: field("moderationCategory").unwrap_or_else(|| CATEGORY_NONE.to_string()),
            rationale: field("moderationRationale").unwrap_or_default(),
            test_text: field("testText"),
            raw: Value::Object(obj.clone()),
        }
    }

    pub fn to_result(&self) -> GuardrailResult {
        GuardrailResult::verdict(&self.category, &self.rationale, self.test_text.clone())
    }
}

/// Descends through wrapper keys until an object with a classification
/// category is found.
pub fn extract_moderation(result: &Value) -> Option<Moderation> {
    let mut current = result;
    for _ in 0..=MAX_MODERATION_DEPTH {
        let obj = current.as_object()?;
        if obj.contains_key("moderationCategory") {
            return Some(Moderation::from_object(obj));
        }
        current = WRAPPER_KEYS.iter().find_map(|key| obj.get(*key))?;
    }
    tracing::warn!(
        max_depth = MAX_MODERATION_DEPTH,
        "moderation verdict nested too deeply, ignoring"
    );
    None
}

/// The most recent assistant message in the run context.
pub fn last_assistant_item(context: &RunContext) -> Option<&str> {
    context.history.iter().rev().find_map(|item| match item {
        HistoryItem::Message {
            item_id,
            role: Role::Assistant,
            ..
        } => Some(item_id.as_str()),
        _ => None,
    })
}

/// Picks the message a verdict applies to.
pub fn verdict_target<'a>(explicit: Option<&'a str>, context: &'a RunContext) -> Option<&'a str> {
    explicit.or_else(|| last_assistant_item(context))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn assistant(id: &str) -> HistoryItem {
        HistoryItem::Message {
            item_id: id.to_string(),
            role: Role::Assistant,
            content: vec![],
            status: None,
        }
    }

    fn user(id: &str) -> HistoryItem {
        HistoryItem::Message {
            item_id: id.to_string(),
            role: Role::User,
            content: vec![],
            status: None,
        }
    }

    #[test]
    fn verdict_found_through_wrappers() {
        let result = json!({
            "guardrail": {"name": "moderation"},
            "output": {
                "outputInfo": {
                    "moderationCategory": "OFF_BRAND",
                    "moderationRationale": "mentions a competitor",
                    "testText": "try the place next door"
                }
            }
        });

        let moderation = extract_moderation(&result).unwrap();
        assert_eq!(moderation.category, "OFF_BRAND");
        assert_eq!(moderation.rationale, "mentions a competitor");
        assert_eq!(
            moderation.test_text.as_deref(),
            Some("try the place next door")
        );

        let verdict = moderation.to_result();
        assert!(verdict.is_flagged());
    }

    #[test]
    fn top_level_verdict_is_used_directly() {
        let moderation = extract_moderation(&json!({"moderationCategory": "NONE"})).unwrap();
        assert_eq!(moderation.category, CATEGORY_NONE);
        assert_eq!(moderation.rationale, "");
        assert!(moderation.test_text.is_none());
    }

    #[test]
    fn missing_category_yields_none() {
        assert!(extract_moderation(&json!({"output": {"tripwireTriggered": true}})).is_none());
        assert!(extract_moderation(&json!("flagged")).is_none());
        assert!(extract_moderation(&Value::Null).is_none());
    }

    #[test]
    fn descent_is_bounded() {
        let mut nested = json!({"moderationCategory": "OFFENSIVE"});
        for _ in 0..=MAX_MODERATION_DEPTH {
            nested = json!({"result": nested});
        }
        assert!(extract_moderation(&nested).is_none());

        let mut shallow = json!({"moderationCategory": "OFFENSIVE"});
        for _ in 0..MAX_MODERATION_DEPTH {
            shallow = json!({"result": shallow});
        }
        assert!(extract_moderation(&shallow).is_some());
    }

    #[test]
    fn last_assistant_message_is_targeted() {
        let context = RunContext::new(vec![
            user("u1"),
            assistant("a1"),
            user("u2"),
            assistant("a2"),
            user("u3"),
        ]);
        assert_eq!(last_assistant_item(&context), Some("a2"));
        assert_eq!(verdict_target(None, &context), Some("a2"));
    }

    #[test]
    fn explicit_reference_wins_over_heuristic() {
        let context = RunContext::new(vec![assistant("a1"), assistant("a2")]);
        assert_eq!(verdict_target(Some("a1"), &context), Some("a1"));
    }

    #[test]
    fn no_assistant_means_no_target() {
        let context = RunContext::new(vec![user("u1")]);
        assert_eq!(verdict_target(None, &context), None);
        assert_eq!(verdict_target(None, &RunContext::default()), None);
    }
}
