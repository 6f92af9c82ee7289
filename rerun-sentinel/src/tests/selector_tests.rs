//! Tests for selector string parsing

use crate::Selector;

#[test]
fn class_selector_parses() {
    assert_eq!(
        Selector::from(".rerun-button"),
        Selector::ClassName("rerun-button".to_string())
    );
}

#[test]
fn id_selector_parses() {
    assert_eq!(Selector::from("#turn-42"), Selector::Id("turn-42".to_string()));
}

#[test]
fn bare_tag_parses() {
    assert_eq!(
        Selector::from("ms-chat-turn"),
        Selector::Tag("ms-chat-turn".to_string())
    );
    assert_eq!(Selector::from("button"), Selector::Tag("button".to_string()));
}

#[test]
fn prefixed_forms_parse() {
    assert_eq!(
        Selector::from("tag:ms-chat-turn"),
        Selector::Tag("ms-chat-turn".to_string())
    );
    assert_eq!(
        Selector::from("class:model-error"),
        Selector::ClassName("model-error".to_string())
    );
    assert_eq!(Selector::from("id:a1"), Selector::Id("a1".to_string()));
    assert_eq!(
        Selector::from("text:An internal error has occurred"),
        Selector::Text("An internal error has occurred".to_string())
    );
}

#[test]
fn attr_contains_with_tag_parses() {
    assert_eq!(
        Selector::from("button[aria-label*=Rerun]"),
        Selector::AttrContains {
            tag: Some("button".to_string()),
            name: "aria-label".to_string(),
            needle: "Rerun".to_string(),
        }
    );
}

#[test]
fn attr_contains_quotes_are_stripped() {
    assert_eq!(
        Selector::from("button[aria-label*=\"Rerun\"]"),
        Selector::AttrContains {
            tag: Some("button".to_string()),
            name: "aria-label".to_string(),
            needle: "Rerun".to_string(),
        }
    );
}

#[test]
fn attr_contains_without_tag_parses() {
    assert_eq!(
        Selector::from("[mattooltip*=Rerun]"),
        Selector::AttrContains {
            tag: None,
            name: "mattooltip".to_string(),
            needle: "Rerun".to_string(),
        }
    );
}

#[test]
fn chain_parses() {
    assert_eq!(
        Selector::from("ms-chat-turn >> .actions-container >> button"),
        Selector::Chain(vec![
            Selector::Tag("ms-chat-turn".to_string()),
            Selector::ClassName("actions-container".to_string()),
            Selector::Tag("button".to_string()),
        ])
    );
}

#[test]
fn unknown_forms_are_invalid() {
    assert!(matches!(Selector::from("???"), Selector::Invalid(_)));
    assert!(matches!(Selector::from("button[aria-label]"), Selector::Invalid(_)));
    assert!(matches!(Selector::from(""), Selector::Invalid(_)));
}

#[test]
fn from_string_matches_from_str() {
    assert_eq!(
        Selector::from(".model-error".to_string()),
        Selector::from(".model-error")
    );
}
