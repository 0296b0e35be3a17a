//! The delta queue and its active-item set.
//!
//! A single FIFO shared by every item of a session. Fragments for one item
//! are applied in arrival order, and fragments of different items interleave
//! in arrival order too. An item stays active while any fragment for it is
//! still queued; active items must not have their text replaced wholesale.

use std::collections::{HashMap, HashSet, VecDeque};

/// One queued text fragment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeltaEntry {
    pub item_id: String,
    pub fragment: String,
}

/// FIFO of streamed text fragments plus the set of items they belong to.
///
/// Keeps a per-item count of queued fragments so that an item can be
/// dropped from the queue, or checked for activity, without scanning it.
#[derive(Debug, Default)]
pub struct DeltaQueue {
    entries: VecDeque<DeltaEntry>,
    pending: HashMap<String, usize>,
    active: HashSet<String>,
}

impl DeltaQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a fragment and marks its item active.
    pub fn push(&mut self, item_id: &str, fragment: impl Into<String>) {
        self.active.insert(item_id.to_string());
        *self.pending.entry(item_id.to_string()).or_insert(0) += 1;
        self.entries.push_back(DeltaEntry {
            item_id: item_id.to_string(),
            fragment: fragment.into(),
        });
    }

    /// Pops the oldest fragment. The item leaves the active set once nothing
    /// else is queued for it, and the whole set is cleared when the queue
    /// runs dry.
    pub fn pop(&mut self) -> Option<DeltaEntry> {
        let entry = self.entries.pop_front()?;
        if let Some(count) = self.pending.get_mut(&entry.item_id) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(&entry.item_id);
                self.active.remove(&entry.item_id);
            }
        }
        if self.entries.is_empty() {
            self.active.clear();
        }
        Some(entry)
    }

    /// Drops every queued fragment for an item and deactivates it. Returns
    /// the number of fragments dropped.
    pub fn discard(&mut self, item_id: &str) -> usize {
        self.active.remove(item_id);
        let Some(count) = self.pending.remove(item_id) else {
            return 0;
        };
        self.entries.retain(|e| e.item_id != item_id);
        count
    }

    pub fn is_active(&self, item_id: &str) -> bool {
        self.active.contains(item_id)
    }

    /// Number of queued fragments for one item.
    pub fn pending_for(&self, item_id: &str) -> usize {
        self.pending.get(item_id).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.pending.clear();
        self.active.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragments_pop_in_global_arrival_order() {
        let mut queue = DeltaQueue::new();
        queue.push("a", "1");
        queue.push("b", "x");
        queue.push("a", "2");

        let order: Vec<(String, String)> = std::iter::from_fn(|| queue.pop())
            .map(|e| (e.item_id, e.fragment))
            .collect();
        assert_eq!(
            order,
            vec![
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "x".to_string()),
                ("a".to_string(), "2".to_string()),
            ]
        );
    }

    #[test]
    fn item_stays_active_while_fragments_remain() {
        let mut queue = DeltaQueue::new();
        queue.push("a", "1");
        queue.push("b", "x");
        queue.push("a", "2");
        assert!(queue.is_active("a"));
        assert_eq!(queue.pending_for("a"), 2);

        queue.pop();
        assert!(queue.is_active("a"));
        queue.pop();
        assert!(!queue.is_active("b"), "b has nothing left queued");
        assert!(queue.is_active("a"));
        queue.pop();
        assert!(!queue.is_active("a"));
        assert!(queue.is_empty());
    }

    #[test]
    fn discard_drops_only_that_item() {
        let mut queue = DeltaQueue::new();
        queue.push("a", "1");
        queue.push("b", "x");
        queue.push("a", "2");

        assert_eq!(queue.discard("a"), 2);
        assert!(!queue.is_active("a"));
        assert_eq!(queue.len(), 1);
        assert_eq!(queue.pop().unwrap().item_id, "b");
        assert_eq!(queue.discard("a"), 0);
    }

    #[test]
    fn clear_resets_everything() {
        let mut queue = DeltaQueue::new();
        queue.push("a", "1");
        queue.clear();
        assert!(queue.is_empty());
        assert!(!queue.is_active("a"));
        assert_eq!(queue.pending_for("a"), 0);
    }
}
