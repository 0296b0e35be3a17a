//! Moderation verdicts attached to transcript messages.

use serde::{Deserialize, Serialize};

/// Category label used when a message passed moderation.
pub const CATEGORY_NONE: &str = "NONE";

/// Whether a verdict has been reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailStatus {
    InProgress,
    Done,
}

/// A moderation verdict for one message.
///
/// Assistant messages receive an optimistic `InProgress` result when they are
/// created. The result becomes `Done` either when a verdict is matched to the
/// message or when the message completes with no verdict pending, in which
/// case it passes with category [`CATEGORY_NONE`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardrailResult {
    pub status: GuardrailStatus,
    /// Classification label, e.g. `OFFENSIVE` or `OFF_BRAND`.
    pub category: String,
    pub rationale: String,
    /// The excerpt that triggered the verdict, when the classifier reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test_text: Option<String>,
}

impl GuardrailResult {
    /// An unresolved verdict.
    pub fn pending() -> Self {
        Self {
            status: GuardrailStatus::InProgress,
            category: CATEGORY_NONE.to_string(),
            rationale: String::new(),
            test_text: None,
        }
    }

    /// A resolved passing verdict.
    pub fn pass() -> Self {
        Self {
            status: GuardrailStatus::Done,
            ..Self::pending()
        }
    }

    /// A resolved verdict reported by the moderation classifier.
    pub fn verdict(
        category: impl Into<String>,
        rationale: impl Into<String>,
        test_text: Option<String>,
    ) -> Self {
        Self {
            status: GuardrailStatus::Done,
            category: category.into(),
            rationale: rationale.into(),
            test_text,
        }
    }

    pub fn is_pending(&self) -> bool {
        self.status == GuardrailStatus::InProgress
    }

    /// True for a resolved verdict with a category other than [`CATEGORY_NONE`].
    pub fn is_flagged(&self) -> bool {
        self.status == GuardrailStatus::Done && self.category != CATEGORY_NONE
    }
}
