//! The transcript store: one [`TranscriptItem`] per item id.
//!
//! The store is append/update-only. Items are never removed; they can be
//! hidden. Display order is by capture time with insertion order breaking
//! ties, which is independent of the order items were stored in.

use std::collections::HashMap;

use barista_types::{GuardrailResult, ItemKind, ItemStatus, Role, TranscriptItem};
use serde_json::Value;

use crate::error::TranscriptError;

/// Whether an upsert created a new item or updated an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
}

/// Ordered, id-keyed collection of transcript items.
///
/// Exactly one item exists per id: every insert path is an upsert. Reads
/// that feed the display go through [`ordered`](Self::ordered) or
/// [`visible`](Self::visible).
#[derive(Debug, Default, Clone)]
pub struct TranscriptStore {
    items: Vec<TranscriptItem>,
    index: HashMap<String, usize>,
}

impl TranscriptStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts a message, or updates role and text of an existing one.
    ///
    /// New assistant messages carry a pending guardrail verdict until one is
    /// attached or the message completes.
    pub fn add_message(
        &mut self,
        item_id: &str,
        role: Role,
        text: impl Into<String>,
        hidden: bool,
        now_ms: i64,
    ) -> Result<Upsert, TranscriptError> {
        let text = text.into();
        if let Some(item) = self.get_mut(item_id) {
            match &mut item.kind {
                ItemKind::Message {
                    role: existing_role,
                    text: existing_text,
                } => {
                    *existing_role = role;
                    *existing_text = text;
                }
                ItemKind::Breadcrumb { .. } => {
                    return Err(TranscriptError::NotAMessage(item_id.to_string()))
                }
            }
            item.is_hidden = hidden;
            return Ok(Upsert::Updated);
        }

        let mut item = TranscriptItem::message(item_id, role, text, now_ms);
        item.is_hidden = hidden;
        if role == Role::Assistant {
            item.guardrail_result = Some(GuardrailResult::pending());
        }
        self.push(item);
        Ok(Upsert::Inserted)
    }

    /// Replaces or appends to a message's text.
    pub fn update_message(
        &mut self,
        item_id: &str,
        text: &str,
        append: bool,
    ) -> Result<(), TranscriptError> {
        let item = self
            .get_mut(item_id)
            .ok_or_else(|| TranscriptError::UnknownItem(item_id.to_string()))?;
        match &mut item.kind {
            ItemKind::Message {
                text: existing, ..
            } => {
                if append {
                    existing.push_str(text);
                } else {
                    text.clone_into(existing);
                }
                Ok(())
            }
            ItemKind::Breadcrumb { .. } => Err(TranscriptError::NotAMessage(item_id.to_string())),
        }
    }

    /// Adds a breadcrumb under a freshly generated id and returns the id.
    pub fn add_breadcrumb(
        &mut self,
        label: impl Into<String>,
        payload: Option<Value>,
        now_ms: i64,
    ) -> String {
        let item_id = uuid::Uuid::new_v4().to_string();
        self.push(TranscriptItem::breadcrumb(
            item_id.clone(),
            label,
            payload,
            now_ms,
        ));
        item_id
    }

    /// Inserts a breadcrumb under a caller-chosen id, or replaces the label
    /// and payload of the breadcrumb already stored under it. An update keeps
    /// the original capture time.
    pub fn upsert_breadcrumb(
        &mut self,
        item_id: &str,
        label: impl Into<String>,
        payload: Option<Value>,
        now_ms: i64,
    ) -> Result<Upsert, TranscriptError> {
        let label = label.into();
        if let Some(item) = self.get_mut(item_id) {
            return match &mut item.kind {
                ItemKind::Breadcrumb {
                    label: existing_label,
                    payload: existing_payload,
                } => {
                    *existing_label = label;
                    *existing_payload = payload;
                    Ok(Upsert::Updated)
                }
                ItemKind::Message { .. } => {
                    Err(TranscriptError::NotABreadcrumb(item_id.to_string()))
                }
            };
        }
        self.push(TranscriptItem::breadcrumb(item_id, label, payload, now_ms));
        Ok(Upsert::Inserted)
    }

    /// Moves an item's status forward. `Done` is terminal.
    pub fn update_status(
        &mut self,
        item_id: &str,
        status: ItemStatus,
    ) -> Result<(), TranscriptError> {
        let item = self
            .get_mut(item_id)
            .ok_or_else(|| TranscriptError::UnknownItem(item_id.to_string()))?;
        item.status = item.status.advance(status);
        Ok(())
    }

    /// Marks an item done and resolves an unresolved guardrail verdict on a
    /// message as a pass.
    pub fn mark_done(&mut self, item_id: &str) -> Result<(), TranscriptError> {
        let item = self
            .get_mut(item_id)
            .ok_or_else(|| TranscriptError::UnknownItem(item_id.to_string()))?;
        item.status = ItemStatus::Done;
        if item.is_message() && item.guardrail_result.as_ref().map_or(true, |g| g.is_pending()) {
            item.guardrail_result = Some(GuardrailResult::pass());
        }
        Ok(())
    }

    pub fn set_guardrail(
        &mut self,
        item_id: &str,
        result: GuardrailResult,
    ) -> Result<(), TranscriptError> {
        let item = self
            .get_mut(item_id)
            .ok_or_else(|| TranscriptError::UnknownItem(item_id.to_string()))?;
        item.guardrail_result = Some(result);
        Ok(())
    }

    /// Flips the expanded flag and returns the new value.
    pub fn toggle_expand(&mut self, item_id: &str) -> Result<bool, TranscriptError> {
        let item = self
            .get_mut(item_id)
            .ok_or_else(|| TranscriptError::UnknownItem(item_id.to_string()))?;
        item.expanded = !item.expanded;
        Ok(item.expanded)
    }

    pub fn set_hidden(&mut self, item_id: &str, hidden: bool) -> Result<(), TranscriptError> {
        let item = self
            .get_mut(item_id)
            .ok_or_else(|| TranscriptError::UnknownItem(item_id.to_string()))?;
        item.is_hidden = hidden;
        Ok(())
    }

    pub fn get(&self, item_id: &str) -> Option<&TranscriptItem> {
        self.index.get(item_id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.index.contains_key(item_id)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// All items in display order.
    pub fn ordered(&self) -> Vec<&TranscriptItem> {
        let mut items: Vec<&TranscriptItem> = self.items.iter().collect();
        // Stable, so equal capture times keep insertion order.
        items.sort_by_key(|item| item.created_at_ms);
        items
    }

    /// Non-hidden items in display order.
    pub fn visible(&self) -> Vec<&TranscriptItem> {
        self.ordered()
            .into_iter()
            .filter(|item| !item.is_hidden)
            .collect()
    }

    /// Owned copy of the visible items in display order.
    pub fn snapshot(&self) -> Vec<TranscriptItem> {
        self.visible().into_iter().cloned().collect()
    }

    fn get_mut(&mut self, item_id: &str) -> Option<&mut TranscriptItem> {
        let i = *self.index.get(item_id)?;
        self.items.get_mut(i)
    }

    fn push(&mut self, item: TranscriptItem) {
        self.index.insert(item.item_id.clone(), self.items.len());
        self.items.push(item);
    }
}
