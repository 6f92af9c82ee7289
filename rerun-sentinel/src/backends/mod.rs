use crate::element::DomElement;
use crate::errors::SentinelError;
use crate::events::MutationBatch;
use crate::selector::Selector;
use tokio::sync::broadcast;

/// The common trait that all document backends must implement.
///
/// A backend wraps whatever actually owns the document tree (the reference
/// in-memory host, an embedder feeding a parsed page, a bridge into a real
/// renderer) and exposes the "find element" capability the watcher consumes.
#[async_trait::async_trait]
pub trait DomEngine: Send + Sync {
    /// Get the document root element
    fn root(&self) -> DomElement;

    fn get_element_by_object_id(&self, id: u64) -> Result<DomElement, SentinelError>;

    /// Find the first element matching a selector, in document order.
    ///
    /// The query is immediate; the element either exists in the live tree
    /// right now or `ElementNotFound` is returned. A detached `root` yields
    /// `ElementNotFound` as well; stale handles degrade to "not found".
    fn find_element(
        &self,
        selector: &Selector,
        root: Option<&DomElement>,
    ) -> Result<DomElement, SentinelError>;

    /// Find all elements matching a selector, in document order
    fn find_elements(
        &self,
        selector: &Selector,
        root: Option<&DomElement>,
    ) -> Result<Vec<DomElement>, SentinelError>;

    /// Subscribe to structural mutation batches.
    ///
    /// The channel is lossy under pressure; receivers must treat a lagged
    /// read as "mutations happened", never as an error.
    fn subscribe_mutations(&self) -> broadcast::Receiver<MutationBatch>;

    /// Resolve at the next paint opportunity.
    ///
    /// Headless backends yield to the scheduler once; rendering backends are
    /// expected to tie this to their frame clock.
    async fn next_frame(&self);

    /// Enable downcasting to concrete engine types
    fn as_any(&self) -> &dyn std::any::Any;
}

pub mod memory;
