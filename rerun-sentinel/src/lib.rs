//! Passive recovery automation for live conversational documents
//!
//! This crate watches a continuously mutating document for a transient
//! internal-error signature, neutralizes the laggy prompt subtree the error
//! leaves behind, and synthesizes the hover-then-click sequence that reruns
//! the failed turn, all without a reload and without double-processing any
//! occurrence.

use std::sync::Arc;
use tracing::instrument;

pub mod backends;
pub mod diagnostics;
pub mod element;
pub mod errors;
pub mod events;
pub mod gate;
pub mod locator;
pub mod mitigator;
pub mod recovery;
pub mod scanner;
pub mod selector;
#[cfg(test)]
mod tests;
pub mod tracker;
pub mod watcher;

pub use backends::memory::MemoryDom;
pub use backends::DomEngine;
pub use diagnostics::{DiagnosticEvent, DiagnosticHub, DiagnosticStage};
pub use element::{DomElement, DomElementAttributes, DomElementImpl};
pub use errors::SentinelError;
pub use events::{ClickResult, MutationBatch, MutationKind, PointerEventKind, HOVER_SEQUENCE};
pub use gate::ProcessingGate;
pub use locator::Locator;
pub use mitigator::LagMitigator;
pub use recovery::{RecoveryTrigger, REVEAL_TO_ACTIVATION_DELAY};
pub use scanner::{ErrorOccurrence, ErrorScanner, PRE_RECOVERY_DELAY};
pub use selector::Selector;
pub use tracker::OccurrenceTracker;
pub use watcher::{
    Sentinel, SentinelConfig, SentinelStats, StatsSnapshot, DEBOUNCE_QUIET_WINDOW,
    TARGET_ERROR_PHRASE,
};

/// The main entry point: a handle over whichever backend owns the document.
pub struct Page {
    engine: Arc<dyn DomEngine>,
}

impl Page {
    pub fn new(engine: Arc<dyn DomEngine>) -> Self {
        Self { engine }
    }

    /// Gets the root element of the watched document.
    pub fn root(&self) -> DomElement {
        self.engine.root()
    }

    #[instrument(skip(self, selector))]
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        let selector = selector.into();
        Locator::new(self.engine.clone(), selector)
    }

    pub fn engine(&self) -> Arc<dyn DomEngine> {
        self.engine.clone()
    }

    /// Build a watcher session over this document.
    ///
    /// The session is inert until [`Sentinel::start`] is called.
    pub fn sentinel(&self, config: SentinelConfig) -> Sentinel {
        Sentinel::new(self.engine.clone(), config)
    }
}

impl Clone for Page {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
        }
    }
}
