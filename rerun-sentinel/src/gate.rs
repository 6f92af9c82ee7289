use std::sync::atomic::{AtomicBool, Ordering};

/// Single-flight guard: at most one occurrence pipeline is in flight
/// system-wide at any time.
#[derive(Debug, Default)]
pub struct ProcessingGate {
    busy: AtomicBool,
}

impl ProcessingGate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeeds iff idle, transitioning idle -> busy.
    pub fn acquire(&self) -> bool {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Always transitions back to idle. Must run on every pipeline exit path,
    /// success or not.
    pub fn release(&self) {
        self.busy.store(false, Ordering::Release);
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }
}
