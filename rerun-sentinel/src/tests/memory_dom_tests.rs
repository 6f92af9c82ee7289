//! Tests for the in-memory document backend

use crate::backends::DomEngine;
use crate::{MemoryDom, MutationKind, Page, PointerEventKind, Selector, SentinelError};
use std::sync::Arc;
use std::time::Duration;

fn dom_with_turn(dom: &MemoryDom) -> (crate::DomElement, crate::DomElement) {
    let root = dom.root_element();
    let turn = dom.append_new(&root, "ms-chat-turn").expect("turn");
    let marker = dom.append_new(&turn, "div").expect("marker");
    dom.set_attr(&marker, "class", "model-error").expect("class");
    (turn, marker)
}

#[test]
fn find_elements_returns_document_order() {
    let dom = MemoryDom::new();
    let root = dom.root_element();
    let a = dom.append_new(&root, "div").expect("a");
    dom.set_attr(&a, "class", "x").expect("attr");
    let b = dom.append_new(&root, "div").expect("b");
    let c = dom.append_new(&b, "div").expect("c");
    dom.set_attr(&c, "class", "x").expect("attr");
    let d = dom.append_new(&root, "div").expect("d");
    dom.set_attr(&d, "class", "x").expect("attr");

    let found = dom
        .find_elements(&Selector::ClassName("x".to_string()), None)
        .expect("query");
    let ids: Vec<u64> = found.iter().map(|e| e.object_id()).collect();
    assert_eq!(ids, vec![a.object_id(), c.object_id(), d.object_id()]);
}

#[test]
fn closest_is_self_inclusive_and_walks_up() {
    let dom = MemoryDom::new();
    let (turn, marker) = dom_with_turn(&dom);

    let hit = marker
        .closest(&Selector::ClassName("model-error".to_string()))
        .expect("closest")
        .expect("self match");
    assert_eq!(hit.object_id(), marker.object_id());

    let hit = marker
        .closest(&Selector::Tag("ms-chat-turn".to_string()))
        .expect("closest")
        .expect("ancestor match");
    assert_eq!(hit.object_id(), turn.object_id());

    assert!(marker
        .closest(&Selector::Tag("article".to_string()))
        .expect("closest")
        .is_none());
}

#[test]
fn subtree_text_joins_and_respects_depth() {
    let dom = MemoryDom::new();
    let root = dom.root_element();
    let outer = dom.append_new(&root, "div").expect("outer");
    dom.set_text(&outer, "outer").expect("text");
    let inner = dom.append_new(&outer, "span").expect("inner");
    dom.set_text(&inner, "inner").expect("text");

    assert_eq!(outer.text(4).expect("text"), "outer inner");
    assert_eq!(outer.text(0).expect("text"), "outer");
}

#[test]
fn attr_contains_matching_finds_labeled_button() {
    let dom = MemoryDom::new();
    let (turn, _) = dom_with_turn(&dom);
    let button = dom.append_new(&turn, "button").expect("button");
    dom.set_attr(&button, "aria-label", "Rerun this turn")
        .expect("attr");

    let found = dom
        .find_element(&Selector::from("button[aria-label*=Rerun]"), Some(&turn))
        .expect("find");
    assert_eq!(found.object_id(), button.object_id());

    // Tag qualification is honored
    assert!(matches!(
        dom.find_element(&Selector::from("a[aria-label*=Rerun]"), Some(&turn)),
        Err(SentinelError::ElementNotFound(_))
    ));
}

#[test]
fn chain_selector_scopes_each_stage() {
    let dom = MemoryDom::new();
    let (turn, _) = dom_with_turn(&dom);
    let actions = dom.append_new(&turn, "div").expect("actions");
    dom.set_attr(&actions, "class", "actions-container")
        .expect("attr");
    let inside = dom.append_new(&actions, "button").expect("inside");
    // A button outside the actions container must not match the chain.
    let _outside = dom.append_new(&turn, "button").expect("outside");

    let found = dom
        .find_elements(&Selector::from("ms-chat-turn >> .actions-container >> button"), None)
        .expect("query");
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].object_id(), inside.object_id());
}

#[test]
fn removal_detaches_subtree_from_queries() {
    let dom = MemoryDom::new();
    let (turn, marker) = dom_with_turn(&dom);

    dom.remove(&turn).expect("remove");
    assert!(!turn.is_attached());
    assert!(!marker.is_attached());

    // Gone from document-rooted queries
    let found = dom
        .find_elements(&Selector::ClassName("model-error".to_string()), None)
        .expect("query");
    assert!(found.is_empty());

    // Queries rooted at the stale handle degrade to nothing found
    let found = dom
        .find_elements(&Selector::ClassName("model-error".to_string()), Some(&turn))
        .expect("query");
    assert!(found.is_empty());

    // Parent links inside the detached subtree survive, so closest still
    // resolves from the marker's point of view.
    let hit = marker
        .closest(&Selector::Tag("ms-chat-turn".to_string()))
        .expect("closest");
    assert!(hit.is_some());
}

#[test]
fn structural_edits_broadcast_mutations() {
    let dom = MemoryDom::new();
    let mut rx = dom.subscribe_mutations();
    let root = dom.root_element();

    let child = dom.append_new(&root, "div").expect("child");
    dom.set_text(&child, "hello").expect("text");
    dom.remove(&child).expect("remove");

    assert_eq!(rx.try_recv().expect("added").kind, MutationKind::ChildAdded);
    assert_eq!(rx.try_recv().expect("text").kind, MutationKind::TextChanged);
    assert_eq!(
        rx.try_recv().expect("removed").kind,
        MutationKind::ChildRemoved
    );
}

#[test]
fn replace_content_discards_children() {
    let dom = MemoryDom::new();
    let root = dom.root_element();
    let prompt = dom.append_new(&root, "div").expect("prompt");
    let heavy = dom.append_new(&prompt, "p").expect("heavy");
    dom.set_text(&heavy, "very long prompt").expect("text");

    let mut rx = dom.subscribe_mutations();
    prompt.replace_content("(cleared)").expect("replace");

    assert_eq!(prompt.text(4).expect("text"), "(cleared)");
    assert!(prompt.children().expect("children").is_empty());
    assert!(!heavy.is_attached());
    assert_eq!(
        rx.try_recv().expect("replaced").kind,
        MutationKind::SubtreeReplaced
    );
}

#[test]
fn pointer_dispatch_is_recorded() {
    let dom = MemoryDom::new();
    let root = dom.root_element();
    let button = dom.append_new(&root, "button").expect("button");

    button.hover().expect("hover");
    button.click().expect("click");

    assert_eq!(
        dom.pointer_events_for(&button),
        vec![
            PointerEventKind::MouseEnter,
            PointerEventKind::MouseOver,
            PointerEventKind::MouseMove,
            PointerEventKind::Click,
        ]
    );
    assert_eq!(dom.clicks_on(&button), 1);
}

#[test]
fn element_lookup_by_object_id() {
    let dom = MemoryDom::new();
    let root = dom.root_element();
    let child = dom.append_new(&root, "div").expect("child");

    let found = dom
        .get_element_by_object_id(child.object_id())
        .expect("lookup");
    assert_eq!(found.object_id(), child.object_id());
    assert!(matches!(
        dom.get_element_by_object_id(9999),
        Err(SentinelError::ElementNotFound(_))
    ));
}

#[tokio::test(start_paused = true)]
async fn locator_waits_for_late_elements() {
    let dom = Arc::new(MemoryDom::new());
    let page = Page::new(dom.clone());

    {
        let dom = dom.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            let root = dom.root_element();
            let late = dom.append_new(&root, "div").expect("late");
            dom.set_attr(&late, "class", "late").expect("attr");
        });
    }

    let found = page
        .locator(".late")
        .first(Some(Duration::from_secs(1)))
        .await
        .expect("late element appears");
    assert_eq!(found.attributes().classes, vec!["late".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn locator_times_out_on_missing_elements() {
    let dom = Arc::new(MemoryDom::new());
    let page = Page::new(dom.clone());

    let result = page
        .locator(".never")
        .wait(Some(Duration::from_millis(300)))
        .await;
    assert!(matches!(result, Err(SentinelError::Timeout(_))));
}

#[test]
fn locator_try_first_does_not_retry() {
    let dom = Arc::new(MemoryDom::new());
    let page = Page::new(dom.clone());

    assert!(page.locator(".missing").try_first().expect("query").is_none());

    let root = dom.root_element();
    let hit = dom.append_new(&root, "div").expect("hit");
    dom.set_attr(&hit, "class", "missing").expect("attr");
    assert!(page.locator(".missing").try_first().expect("query").is_some());
}
