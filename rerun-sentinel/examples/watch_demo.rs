//! Drives the watcher against the in-memory backend: a conversational turn
//! streams in, fails with the internal-error marker, and the sentinel
//! neutralizes the prompt and clicks the rerun control.
//!
//! Run with: cargo run --example watch_demo

use anyhow::Result;
use rerun_sentinel::{MemoryDom, Page, SentinelConfig, TARGET_ERROR_PHRASE};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let dom = Arc::new(MemoryDom::new());
    let page = Page::new(dom.clone());
    let sentinel = page.sentinel(SentinelConfig::default());
    sentinel.start();

    // Mirror the diagnostic stream to stdout.
    let mut events = sentinel.subscribe_diagnostics();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("[{}] {:?}: {}", event.timestamp_ms, event.stage, event.detail);
        }
    });

    // Simulate the host page: a turn with a huge prompt, hover-revealed
    // actions, and finally the error marker.
    let root = dom.root_element();
    let turn = dom.append_new(&root, "ms-chat-turn")?;
    let prompt = dom.append_new(&turn, "div")?;
    dom.set_attr(&prompt, "class", "user-prompt-container")?;
    dom.set_text(&prompt, &"a very long prompt ".repeat(2_000))?;
    let actions = dom.append_new(&turn, "div")?;
    dom.set_attr(&actions, "class", "actions-container")?;
    let rerun = dom.append_new(&actions, "button")?;
    dom.set_attr(&rerun, "class", "rerun-button")?;
    dom.set_attr(&rerun, "aria-label", "Rerun this turn")?;
    let marker = dom.append_new(&turn, "div")?;
    dom.set_attr(&marker, "class", "model-error")?;
    dom.set_text(&marker, TARGET_ERROR_PHRASE)?;

    // Debounce (800ms) + pre-recovery delay (1000ms) + reveal window (500ms),
    // plus a little slack.
    tokio::time::sleep(Duration::from_millis(2600)).await;

    println!("rerun clicks: {}", dom.clicks_on(&rerun));
    println!("final stats: {:?}", sentinel.stats());
    sentinel.stop();
    Ok(())
}
