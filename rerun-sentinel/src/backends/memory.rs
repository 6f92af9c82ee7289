//! In-memory document backend.
//!
//! The reference host for the watcher: a plain node tree with weak parent
//! links, a broadcast channel for structural mutations, and a log of every
//! synthetic pointer event so embedders and tests can observe what the
//! watcher dispatched. Nodes are owned by the document; handles given out are
//! non-owning with respect to tree membership (removal detaches regardless of
//! outstanding handles).

use crate::element::{DomElement, DomElementAttributes, DomElementImpl};
use crate::errors::SentinelError;
use crate::events::{ClickResult, MutationBatch, MutationKind, PointerEventKind};
use crate::selector::Selector;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::broadcast;

const MUTATION_CHANNEL_CAPACITY: usize = 256;
const MAX_TEXT_DEPTH: usize = 32;

pub struct MemoryDom {
    shared: Arc<DomShared>,
    root: Arc<NodeData>,
}

struct DomShared {
    next_object_id: AtomicU64,
    registry: Mutex<HashMap<u64, Weak<NodeData>>>,
    mutations: broadcast::Sender<MutationBatch>,
    pointer_log: Mutex<Vec<(u64, PointerEventKind)>>,
}

struct NodeData {
    object_id: u64,
    tag: String,
    state: Mutex<NodeState>,
}

#[derive(Default)]
struct NodeState {
    attrs: HashMap<String, String>,
    styles: HashMap<String, String>,
    text: String,
    children: Vec<Arc<NodeData>>,
    parent: Weak<NodeData>,
    attached: bool,
}

impl NodeData {
    fn lock(&self) -> MutexGuard<'_, NodeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for MemoryDom {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryDom {
    pub fn new() -> Self {
        let (mutations, _) = broadcast::channel(MUTATION_CHANNEL_CAPACITY);
        let shared = Arc::new(DomShared {
            next_object_id: AtomicU64::new(1),
            registry: Mutex::new(HashMap::new()),
            mutations,
            pointer_log: Mutex::new(Vec::new()),
        });
        let root = new_node(&shared, "body");
        root.lock().attached = true;
        Self { shared, root }
    }

    pub fn root_element(&self) -> DomElement {
        self.wrap(self.root.clone())
    }

    /// Create a detached element; attach it with [`MemoryDom::append_child`].
    pub fn create_element(&self, tag: &str) -> DomElement {
        self.wrap(new_node(&self.shared, tag))
    }

    /// Create an element and append it under `parent` in one step.
    pub fn append_new(&self, parent: &DomElement, tag: &str) -> Result<DomElement, SentinelError> {
        let child = self.create_element(tag);
        self.append_child(parent, &child)?;
        Ok(child)
    }

    pub fn append_child(
        &self,
        parent: &DomElement,
        child: &DomElement,
    ) -> Result<(), SentinelError> {
        let parent = self.native(parent)?;
        let child = self.native(child)?;
        let parent_attached = {
            let mut state = parent.node.lock();
            state.children.push(child.node.clone());
            state.attached
        };
        child.node.lock().parent = Arc::downgrade(&parent.node);
        if parent_attached {
            set_attached(&child.node, true);
        }
        self.emit(MutationKind::ChildAdded, child.node.object_id);
        Ok(())
    }

    /// Remove the element (and its subtree) from the document.
    pub fn remove(&self, element: &DomElement) -> Result<(), SentinelError> {
        let element = self.native(element)?;
        let parent = element.node.lock().parent.upgrade();
        if let Some(parent) = parent {
            parent
                .lock()
                .children
                .retain(|c| c.object_id != element.node.object_id);
        }
        element.node.lock().parent = Weak::new();
        set_attached(&element.node, false);
        self.emit(MutationKind::ChildRemoved, element.node.object_id);
        Ok(())
    }

    pub fn set_attr(
        &self,
        element: &DomElement,
        name: &str,
        value: &str,
    ) -> Result<(), SentinelError> {
        let element = self.native(element)?;
        element
            .node
            .lock()
            .attrs
            .insert(name.to_string(), value.to_string());
        Ok(())
    }

    pub fn set_text(&self, element: &DomElement, text: &str) -> Result<(), SentinelError> {
        let element = self.native(element)?;
        element.node.lock().text = text.to_string();
        self.emit(MutationKind::TextChanged, element.node.object_id);
        Ok(())
    }

    /// Inline style value previously applied to the element, if any.
    pub fn style_of(&self, element: &DomElement, property: &str) -> Option<String> {
        let element = self.native(element).ok()?;
        element.node.lock().styles.get(property).cloned()
    }

    /// Every synthetic pointer event dispatched so far, in order.
    pub fn pointer_log(&self) -> Vec<(u64, PointerEventKind)> {
        self.shared
            .pointer_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Pointer events dispatched against one element, in order.
    pub fn pointer_events_for(&self, element: &DomElement) -> Vec<PointerEventKind> {
        let id = element.object_id();
        self.pointer_log()
            .into_iter()
            .filter(|(target, _)| *target == id)
            .map(|(_, event)| event)
            .collect()
    }

    /// How many synthetic clicks landed on the element.
    pub fn clicks_on(&self, element: &DomElement) -> usize {
        self.pointer_events_for(element)
            .into_iter()
            .filter(|event| *event == PointerEventKind::Click)
            .count()
    }

    fn wrap(&self, node: Arc<NodeData>) -> DomElement {
        DomElement::new(Box::new(MemoryElement {
            node,
            shared: self.shared.clone(),
        }))
    }

    fn native<'a>(&self, element: &'a DomElement) -> Result<&'a MemoryElement, SentinelError> {
        element
            .as_any()
            .downcast_ref::<MemoryElement>()
            .ok_or_else(|| {
                SentinelError::BackendError(
                    "element does not belong to this in-memory document".to_string(),
                )
            })
    }

    fn emit(&self, kind: MutationKind, target: u64) {
        // No receivers is fine; the watcher may not be attached yet.
        let _ = self.shared.mutations.send(MutationBatch { kind, target });
    }

    fn find_all(
        &self,
        selector: &Selector,
        root: &Arc<NodeData>,
    ) -> Result<Vec<Arc<NodeData>>, SentinelError> {
        match selector {
            Selector::Chain(parts) => {
                let mut roots = vec![root.clone()];
                for part in parts {
                    if matches!(part, Selector::Chain(_)) {
                        return Err(SentinelError::InvalidSelector(
                            "nested selector chain".to_string(),
                        ));
                    }
                    let mut next: Vec<Arc<NodeData>> = Vec::new();
                    for stage_root in &roots {
                        for found in self.find_all(part, stage_root)? {
                            if !next.iter().any(|n| n.object_id == found.object_id) {
                                next.push(found);
                            }
                        }
                    }
                    roots = next;
                }
                Ok(roots)
            }
            Selector::Invalid(reason) => Err(SentinelError::InvalidSelector(reason.clone())),
            _ => {
                let mut out = Vec::new();
                let children = root.lock().children.clone();
                for child in children {
                    collect_matches(&child, selector, &mut out)?;
                }
                Ok(out)
            }
        }
    }
}

#[async_trait::async_trait]
impl super::DomEngine for MemoryDom {
    fn root(&self) -> DomElement {
        self.root_element()
    }

    fn get_element_by_object_id(&self, id: u64) -> Result<DomElement, SentinelError> {
        let node = self
            .shared
            .registry
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&id)
            .and_then(Weak::upgrade);
        match node {
            Some(node) => Ok(self.wrap(node)),
            None => Err(SentinelError::ElementNotFound(format!("object id {id}"))),
        }
    }

    fn find_element(
        &self,
        selector: &Selector,
        root: Option<&DomElement>,
    ) -> Result<DomElement, SentinelError> {
        let matches = self.find_elements(selector, root)?;
        matches
            .into_iter()
            .next()
            .ok_or_else(|| SentinelError::ElementNotFound(format!("{selector}")))
    }

    fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&DomElement>,
    ) -> Result<Vec<DomElement>, SentinelError> {
        let root_node = match root {
            Some(element) => self.native(element)?.node.clone(),
            None => self.root.clone(),
        };
        // Stale search roots degrade to "nothing found", never an error.
        if !root_node.lock().attached {
            return Ok(Vec::new());
        }
        let nodes = self.find_all(selector, &root_node)?;
        Ok(nodes.into_iter().map(|node| self.wrap(node)).collect())
    }

    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationBatch> {
        self.shared.mutations.subscribe()
    }

    async fn next_frame(&self) {
        // Headless: the next paint opportunity is the next scheduler turn.
        tokio::task::yield_now().await;
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}

fn new_node(shared: &Arc<DomShared>, tag: &str) -> Arc<NodeData> {
    let object_id = shared.next_object_id.fetch_add(1, Ordering::Relaxed);
    let node = Arc::new(NodeData {
        object_id,
        tag: tag.to_string(),
        state: Mutex::new(NodeState::default()),
    });
    let mut registry = shared
        .registry
        .lock()
        .unwrap_or_else(PoisonError::into_inner);
    if registry.len() % 64 == 0 {
        registry.retain(|_, weak| weak.strong_count() > 0);
    }
    registry.insert(object_id, Arc::downgrade(&node));
    node
}

fn set_attached(node: &Arc<NodeData>, attached: bool) {
    let children = {
        let mut state = node.lock();
        state.attached = attached;
        state.children.clone()
    };
    for child in children {
        set_attached(&child, attached);
    }
}

/// Pre-order walk; `node` itself is a candidate (the search root is not).
fn collect_matches(
    node: &Arc<NodeData>,
    selector: &Selector,
    out: &mut Vec<Arc<NodeData>>,
) -> Result<(), SentinelError> {
    if node_matches(node, selector)? {
        out.push(node.clone());
    }
    let children = node.lock().children.clone();
    for child in children {
        collect_matches(&child, selector, out)?;
    }
    Ok(())
}

fn node_matches(node: &Arc<NodeData>, selector: &Selector) -> Result<bool, SentinelError> {
    match selector {
        Selector::Tag(tag) => Ok(node.tag.eq_ignore_ascii_case(tag)),
        Selector::Id(id) => Ok(node.lock().attrs.get("id").map(String::as_str) == Some(id.as_str())),
        Selector::ClassName(class) => Ok(node
            .lock()
            .attrs
            .get("class")
            .is_some_and(|value| value.split_whitespace().any(|c| c == class))),
        Selector::AttrContains { tag, name, needle } => {
            if let Some(tag) = tag {
                if !node.tag.eq_ignore_ascii_case(tag) {
                    return Ok(false);
                }
            }
            Ok(node
                .lock()
                .attrs
                .get(name)
                .is_some_and(|value| value.contains(needle)))
        }
        Selector::Text(needle) => Ok(subtree_text(node, MAX_TEXT_DEPTH).contains(needle)),
        Selector::Chain(_) => Err(SentinelError::UnsupportedOperation(
            "chain selectors cannot be matched against a single element".to_string(),
        )),
        Selector::Invalid(reason) => Err(SentinelError::InvalidSelector(reason.clone())),
    }
}

fn subtree_text(node: &Arc<NodeData>, max_depth: usize) -> String {
    let (own, children) = {
        let state = node.lock();
        (state.text.clone(), state.children.clone())
    };
    let mut parts: Vec<String> = Vec::new();
    if !own.is_empty() {
        parts.push(own);
    }
    if max_depth > 0 {
        for child in children {
            let text = subtree_text(&child, max_depth - 1);
            if !text.is_empty() {
                parts.push(text);
            }
        }
    }
    parts.join(" ")
}

struct MemoryElement {
    node: Arc<NodeData>,
    shared: Arc<DomShared>,
}

impl fmt::Debug for MemoryElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryElement")
            .field("object_id", &self.node.object_id)
            .field("tag", &self.node.tag)
            .finish()
    }
}

impl MemoryElement {
    fn wrap(&self, node: Arc<NodeData>) -> DomElement {
        DomElement::new(Box::new(MemoryElement {
            node,
            shared: self.shared.clone(),
        }))
    }

    fn record(&self, event: PointerEventKind) {
        self.shared
            .pointer_log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((self.node.object_id, event));
    }
}

impl DomElementImpl for MemoryElement {
    fn object_id(&self) -> u64 {
        self.node.object_id
    }

    fn id(&self) -> Option<String> {
        self.node.lock().attrs.get("id").cloned()
    }

    fn tag(&self) -> String {
        self.node.tag.clone()
    }

    fn attributes(&self) -> DomElementAttributes {
        let state = self.node.lock();
        DomElementAttributes {
            tag: self.node.tag.clone(),
            id: state.attrs.get("id").cloned(),
            classes: state
                .attrs
                .get("class")
                .map(|value| value.split_whitespace().map(str::to_string).collect())
                .unwrap_or_default(),
            aria_label: state.attrs.get("aria-label").cloned(),
            tooltip: state.attrs.get("mattooltip").cloned(),
            attrs: state.attrs.clone(),
            child_count: Some(state.children.len()),
        }
    }

    fn children(&self) -> Result<Vec<DomElement>, SentinelError> {
        let children = self.node.lock().children.clone();
        Ok(children.into_iter().map(|node| self.wrap(node)).collect())
    }

    fn parent(&self) -> Result<Option<DomElement>, SentinelError> {
        let parent = self.node.lock().parent.upgrade();
        Ok(parent.map(|node| self.wrap(node)))
    }

    fn matches(&self, selector: &Selector) -> Result<bool, SentinelError> {
        node_matches(&self.node, selector)
    }

    fn text(&self, max_depth: usize) -> Result<String, SentinelError> {
        Ok(subtree_text(&self.node, max_depth))
    }

    fn is_attached(&self) -> bool {
        self.node.lock().attached
    }

    fn dispatch(&self, event: PointerEventKind) -> Result<(), SentinelError> {
        self.record(event);
        Ok(())
    }

    fn click(&self) -> Result<ClickResult, SentinelError> {
        self.record(PointerEventKind::Click);
        Ok(ClickResult {
            method: "synthetic".to_string(),
            details: self.attributes().display_name(),
        })
    }

    fn set_style(&self, property: &str, value: &str) -> Result<(), SentinelError> {
        self.node
            .lock()
            .styles
            .insert(property.to_string(), value.to_string());
        Ok(())
    }

    fn replace_content(&self, markup: &str) -> Result<(), SentinelError> {
        let removed = {
            let mut state = self.node.lock();
            state.text = markup.to_string();
            std::mem::take(&mut state.children)
        };
        for child in &removed {
            child.lock().parent = Weak::new();
            set_attached(child, false);
        }
        let _ = self.shared.mutations.send(MutationBatch {
            kind: MutationKind::SubtreeReplaced,
            target: self.node.object_id,
        });
        Ok(())
    }

    fn clone_box(&self) -> Box<dyn DomElementImpl> {
        Box::new(MemoryElement {
            node: self.node.clone(),
            shared: self.shared.clone(),
        })
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }
}
