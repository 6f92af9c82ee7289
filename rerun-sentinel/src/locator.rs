use tracing::{debug, instrument};

use crate::backends::DomEngine;
use crate::element::DomElement;
use crate::errors::SentinelError;
use crate::selector::Selector;
use std::sync::Arc;
use std::time::Duration;

// Default timeout if none is specified on the locator itself
const DEFAULT_LOCATOR_TIMEOUT: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// A high-level API for finding elements in the watched document.
///
/// Queries are immediate; the `wait` variants re-poll the backend until the
/// element appears or the bounded window closes.
#[derive(Clone)]
pub struct Locator {
    engine: Arc<dyn DomEngine>,
    selector: Selector,
    timeout: Duration, // Default timeout for this locator instance
    root: Option<DomElement>,
}

impl Locator {
    /// Create a new locator with the given selector
    pub(crate) fn new(engine: Arc<dyn DomEngine>, selector: Selector) -> Self {
        Self {
            engine,
            selector,
            timeout: DEFAULT_LOCATOR_TIMEOUT,
            root: None,
        }
    }

    /// Set a default timeout for waiting operations on this locator instance.
    pub fn set_default_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Scope this locator to the subtree under `element`
    pub fn within(mut self, element: DomElement) -> Self {
        self.root = Some(element);
        self
    }

    /// All current matches, in document order. No waiting.
    pub fn all(&self) -> Result<Vec<DomElement>, SentinelError> {
        self.engine
            .find_elements(&self.selector, self.root.as_ref())
    }

    /// First current match, or `None`. No waiting, no retry.
    pub fn try_first(&self) -> Result<Option<DomElement>, SentinelError> {
        match self.engine.find_element(&self.selector, self.root.as_ref()) {
            Ok(element) => Ok(Some(element)),
            Err(SentinelError::ElementNotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub async fn first(&self, timeout: Option<Duration>) -> Result<DomElement, SentinelError> {
        self.wait(timeout).await
    }

    /// Wait for an element matching the locator to appear, up to the
    /// specified timeout. If no timeout is provided, uses the locator's
    /// default timeout.
    #[instrument(level = "debug", skip(self, timeout))]
    pub async fn wait(&self, timeout: Option<Duration>) -> Result<DomElement, SentinelError> {
        debug!("Waiting for element matching selector: {:?}", self.selector);
        let effective_timeout = timeout.unwrap_or(self.timeout);
        let deadline = tokio::time::Instant::now() + effective_timeout;

        loop {
            match self.engine.find_element(&self.selector, self.root.as_ref()) {
                Ok(element) => return Ok(element),
                Err(SentinelError::ElementNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(SentinelError::Timeout(format!(
                    "Timed out after {effective_timeout:?} waiting for element {:?}",
                    self.selector_string()
                )));
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    fn append_selector(&self, selector_to_append: Selector) -> Locator {
        let mut new_chain = match self.selector.clone() {
            Selector::Chain(existing_chain) => existing_chain,
            s => vec![s],
        };

        // Append the new selector, flattening if it's also a chain
        match selector_to_append {
            Selector::Chain(mut next_chain_parts) => {
                new_chain.append(&mut next_chain_parts);
            }
            s => new_chain.push(s),
        }

        Locator {
            engine: self.engine.clone(),
            selector: Selector::Chain(new_chain),
            timeout: self.timeout,
            root: self.root.clone(),
        }
    }

    /// Get a nested locator
    pub fn locator(&self, selector: impl Into<Selector>) -> Locator {
        self.append_selector(selector.into())
    }

    pub fn selector_string(&self) -> String {
        format!("{:?}", self.selector)
    }
}
