use serde::{Deserialize, Serialize};

/// The pointer sequence dispatched to flip a renderer's hover state.
///
/// A single event type is not enough for every renderer; the enter/over/move
/// triple mirrors what a real pointer produces when it settles on an element.
pub const HOVER_SEQUENCE: [PointerEventKind; 3] = [
    PointerEventKind::MouseEnter,
    PointerEventKind::MouseOver,
    PointerEventKind::MouseMove,
];

/// A synthetic pointer event dispatched against a document element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PointerEventKind {
    MouseEnter,
    MouseOver,
    MouseMove,
    Click,
}

/// Holds the outcome details of a synthetic click.
#[derive(Debug, Clone)]
pub struct ClickResult {
    pub method: String,
    pub details: String,
}

/// One structural change observed in the watched document.
///
/// Backends coalesce whatever granularity their host offers into these
/// batches; the watcher only cares that *something* changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationBatch {
    pub kind: MutationKind,
    /// `object_id` of the element the change happened under.
    pub target: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    ChildAdded,
    ChildRemoved,
    TextChanged,
    SubtreeReplaced,
}
