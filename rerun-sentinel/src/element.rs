use crate::errors::SentinelError;
use crate::events::{ClickResult, PointerEventKind, HOVER_SEQUENCE};
use crate::selector::Selector;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::fmt::Debug;
use tracing::debug;

/// Represents an element in the watched document.
///
/// The document owns its nodes; a `DomElement` is a transient, non-owning
/// handle held only for the duration of a processing cycle. Identity is the
/// underlying node (`object_id`), never the element's content.
pub struct DomElement {
    inner: Box<dyn DomElementImpl>,
}

impl Debug for DomElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomElement")
            .field("object_id", &self.object_id())
            .field("attributes", &self.attributes())
            .finish()
    }
}

/// Attributes associated with a document element
#[derive(Clone, Serialize, Deserialize, Default)]
pub struct DomElementAttributes {
    pub tag: String,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub aria_label: Option<String>,
    #[serde(default, skip_serializing_if = "is_empty_string")]
    pub tooltip: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub attrs: HashMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub child_count: Option<usize>,
}

impl fmt::Debug for DomElementAttributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut debug_struct = f.debug_struct("DomElementAttributes");
        debug_struct.field("tag", &self.tag);
        if let Some(ref id) = self.id {
            if !id.is_empty() {
                debug_struct.field("id", id);
            }
        }
        if !self.classes.is_empty() {
            debug_struct.field("classes", &self.classes);
        }
        if let Some(ref label) = self.aria_label {
            if !label.is_empty() {
                debug_struct.field("aria_label", label);
            }
        }
        if let Some(ref tooltip) = self.tooltip {
            if !tooltip.is_empty() {
                debug_struct.field("tooltip", tooltip);
            }
        }
        if let Some(count) = self.child_count {
            debug_struct.field("child_count", &count);
        }
        debug_struct.finish()
    }
}

impl DomElementAttributes {
    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// A short human-readable tag for logs, e.g. `button.rerun-button`
    pub fn display_name(&self) -> String {
        match self.classes.first() {
            Some(class) => format!("{}.{}", self.tag, class),
            None => self.tag.clone(),
        }
    }
}

fn is_empty_string(opt: &Option<String>) -> bool {
    match opt {
        Some(s) => s.is_empty(),
        None => true,
    }
}

/// Interface for backend-specific element implementations
pub trait DomElementImpl: Send + Sync + Debug {
    /// Stable identity of the underlying node for the document's lifetime.
    fn object_id(&self) -> u64;
    fn id(&self) -> Option<String>;
    fn tag(&self) -> String;
    fn attributes(&self) -> DomElementAttributes;
    fn children(&self) -> Result<Vec<DomElement>, SentinelError>;
    fn parent(&self) -> Result<Option<DomElement>, SentinelError>;
    /// Whether this element matches the given (non-chain) selector.
    fn matches(&self, selector: &Selector) -> Result<bool, SentinelError>;
    /// Visible text of the subtree, depth-bounded.
    fn text(&self, max_depth: usize) -> Result<String, SentinelError>;
    /// Whether the node is still part of the live document.
    fn is_attached(&self) -> bool;
    fn dispatch(&self, event: PointerEventKind) -> Result<(), SentinelError>;
    fn click(&self) -> Result<ClickResult, SentinelError>;
    fn set_style(&self, property: &str, value: &str) -> Result<(), SentinelError>;
    /// Discard the element's current subtree and swap in the given markup.
    fn replace_content(&self, markup: &str) -> Result<(), SentinelError>;
    fn clone_box(&self) -> Box<dyn DomElementImpl>;
    fn as_any(&self) -> &dyn std::any::Any;
}

impl DomElement {
    pub fn new(impl_: Box<dyn DomElementImpl>) -> Self {
        Self { inner: impl_ }
    }

    pub fn object_id(&self) -> u64 {
        self.inner.object_id()
    }

    pub fn id(&self) -> Option<String> {
        self.inner.id()
    }

    pub fn tag(&self) -> String {
        self.inner.tag()
    }

    pub fn attributes(&self) -> DomElementAttributes {
        self.inner.attributes()
    }

    pub fn children(&self) -> Result<Vec<DomElement>, SentinelError> {
        self.inner.children()
    }

    pub fn parent(&self) -> Result<Option<DomElement>, SentinelError> {
        self.inner.parent()
    }

    pub fn matches(&self, selector: &Selector) -> Result<bool, SentinelError> {
        self.inner.matches(selector)
    }

    pub fn text(&self, max_depth: usize) -> Result<String, SentinelError> {
        self.inner.text(max_depth)
    }

    pub fn is_attached(&self) -> bool {
        self.inner.is_attached()
    }

    /// Walk up from this element (inclusive) to the nearest ancestor matching
    /// `selector`.
    pub fn closest(&self, selector: &Selector) -> Result<Option<DomElement>, SentinelError> {
        let mut current = Some(self.clone());
        while let Some(element) = current {
            if element.matches(selector)? {
                return Ok(Some(element));
            }
            current = element.parent()?;
        }
        Ok(None)
    }

    /// Dispatch the full hover-reveal sequence (enter, over, move).
    pub fn hover(&self) -> Result<(), SentinelError> {
        for event in HOVER_SEQUENCE {
            debug!(element = %self.attributes().display_name(), ?event, "dispatching pointer event");
            self.inner.dispatch(event)?;
        }
        Ok(())
    }

    pub fn dispatch(&self, event: PointerEventKind) -> Result<(), SentinelError> {
        self.inner.dispatch(event)
    }

    pub fn click(&self) -> Result<ClickResult, SentinelError> {
        self.inner.click()
    }

    pub fn set_style(&self, property: &str, value: &str) -> Result<(), SentinelError> {
        self.inner.set_style(property, value)
    }

    pub fn replace_content(&self, markup: &str) -> Result<(), SentinelError> {
        self.inner.replace_content(markup)
    }

    pub fn as_any(&self) -> &dyn std::any::Any {
        self.inner.as_any()
    }
}

impl Clone for DomElement {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone_box(),
        }
    }
}

impl PartialEq for DomElement {
    fn eq(&self, other: &Self) -> bool {
        self.object_id() == other.object_id()
    }
}

impl Eq for DomElement {}

impl std::hash::Hash for DomElement {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.object_id().hash(state);
    }
}
