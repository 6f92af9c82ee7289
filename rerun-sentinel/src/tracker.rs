use crate::element::DomElement;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// Set-like membership store for error occurrences already handled.
///
/// Keyed by node identity (`object_id`), never by the handle itself, so
/// membership holds no reference that could outlive the document's own
/// retention of the node. Two markers with identical text are distinct
/// entries. Entries are never removed.
#[derive(Debug, Default)]
pub struct OccurrenceTracker {
    seen: Mutex<HashSet<u64>>,
}

impl OccurrenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn has_seen(&self, element: &DomElement) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&element.object_id())
    }

    pub fn mark_seen(&self, element: &DomElement) {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(element.object_id());
    }

    pub fn len(&self) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
