use crate::backends::DomEngine;
use crate::diagnostics::{DiagnosticEvent, DiagnosticHub, DiagnosticStage};
use crate::events::MutationBatch;
use crate::gate::ProcessingGate;
use crate::mitigator::LagMitigator;
use crate::recovery::RecoveryTrigger;
use crate::scanner::{ErrorScanner, OccurrencePipeline};
use crate::tracker::OccurrenceTracker;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant};
use tokio_stream::Stream;
use tracing::{debug, instrument};

/// Quiet window after the last observed mutation before a scan pass runs.
/// The host document mutates continuously while responses stream in;
/// scanning on every mutation would re-trigger mid-render.
pub const DEBOUNCE_QUIET_WINDOW: Duration = Duration::from_millis(800);

/// The exact substring that identifies the error this watcher handles.
/// Case-sensitive, no localization.
pub const TARGET_ERROR_PHRASE: &str = "An internal error has occurred";

static DEFAULT_RECOVERY_SELECTORS: Lazy<Vec<String>> = Lazy::new(|| {
    vec![
        // The exact class carried by the control
        ".rerun-button".to_string(),
        // Fuzzy accessibility-label match, e.g. "Rerun this turn"
        "button[aria-label*=Rerun]".to_string(),
        // Backup tooltip check
        "button[mattooltip*=Rerun]".to_string(),
    ]
});

/// Configuration for the watcher session.
///
/// Selector strings describe the host document's external surface and can be
/// adjusted per host; the timing constants are deliberately not configurable.
#[derive(Debug, Clone)]
pub struct SentinelConfig {
    /// Selector matching error-marker elements.
    pub marker_selector: String,

    /// Substring a marker's text must contain to qualify.
    pub error_phrase: String,

    /// Selector for the conversational-turn container enclosing a marker.
    pub turn_selector: String,

    /// Selector for the heavy prompt subtree inside a turn.
    pub prompt_selector: String,

    /// Selector for the hover-revealed actions container inside a turn.
    pub actions_selector: String,

    /// Candidate selectors for the recovery control, tried in priority order.
    pub recovery_selectors: Vec<String>,

    /// Markup swapped in for the neutralized prompt subtree.
    pub placeholder_markup: String,

    /// Height the neutralized prompt is clamped to.
    pub placeholder_height_px: u32,

    /// Depth bound when reading marker text for signature matching.
    pub marker_text_depth: usize,
}

impl Default for SentinelConfig {
    fn default() -> Self {
        Self {
            marker_selector: ".model-error".to_string(),
            error_phrase: TARGET_ERROR_PHRASE.to_string(),
            turn_selector: "ms-chat-turn".to_string(),
            prompt_selector: ".user-prompt-container".to_string(),
            actions_selector: ".actions-container".to_string(),
            recovery_selectors: DEFAULT_RECOVERY_SELECTORS.clone(),
            placeholder_markup: "<div>(prompt content cleared)</div>".to_string(),
            placeholder_height_px: 100,
            marker_text_depth: 8,
        }
    }
}

/// Monotonic counters for everything the session has done.
#[derive(Debug, Default)]
pub struct SentinelStats {
    scans: AtomicU64,
    detections: AtomicU64,
    drops: AtomicU64,
    mitigations: AtomicU64,
    clicks: AtomicU64,
    failures: AtomicU64,
}

impl SentinelStats {
    pub(crate) fn record_scan(&self) {
        self.scans.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_detection(&self) {
        self.detections.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_drop(&self) {
        self.drops.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_mitigation(&self) {
        self.mitigations.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_click(&self) {
        self.clicks.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failure(&self) {
        self.failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            scans: self.scans.load(Ordering::Relaxed),
            detections: self.detections.load(Ordering::Relaxed),
            drops: self.drops.load(Ordering::Relaxed),
            mitigations: self.mitigations.load(Ordering::Relaxed),
            clicks: self.clicks.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time view of [`SentinelStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    pub scans: u64,
    pub detections: u64,
    pub drops: u64,
    pub mitigations: u64,
    pub clicks: u64,
    pub failures: u64,
}

/// Keeps handles for every task the session spawned so teardown can cancel
/// pending timers instead of letting them fire against a stopped session.
#[derive(Debug, Default)]
pub struct TaskRegistry {
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl TaskRegistry {
    pub(crate) fn track(&self, handle: JoinHandle<()>) {
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    pub(crate) fn abort_all(&self) {
        let handles: Vec<JoinHandle<()>> = self
            .handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();
        for handle in handles {
            handle.abort();
        }
    }
}

/// The watcher session: subscribes to document mutations, debounces them
/// into scan passes, and drives each detected occurrence through the
/// single-flight mitigation/recovery pipeline.
///
/// All durable state of the system lives here: the seen-set, the busy flag,
/// and the pending task handles. One `Sentinel` per watched document.
pub struct Sentinel {
    engine: Arc<dyn DomEngine>,
    config: SentinelConfig,
    scanner: Arc<ErrorScanner>,
    gate: Arc<ProcessingGate>,
    tracker: Arc<OccurrenceTracker>,
    diagnostics: Arc<DiagnosticHub>,
    stats: Arc<SentinelStats>,
    tasks: Arc<TaskRegistry>,
    watch_handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sentinel {
    pub fn new(engine: Arc<dyn DomEngine>, config: SentinelConfig) -> Self {
        let diagnostics = Arc::new(DiagnosticHub::new());
        let stats = Arc::new(SentinelStats::default());
        let tracker = Arc::new(OccurrenceTracker::new());
        let gate = Arc::new(ProcessingGate::new());
        let tasks = Arc::new(TaskRegistry::default());
        let mitigator = Arc::new(LagMitigator::new(
            engine.clone(),
            &config,
            diagnostics.clone(),
            stats.clone(),
        ));
        let recovery = Arc::new(RecoveryTrigger::new(
            engine.clone(),
            &config,
            diagnostics.clone(),
            stats.clone(),
        ));
        let pipeline = Arc::new(OccurrencePipeline::new(
            engine.clone(),
            &config,
            mitigator,
            recovery,
            gate.clone(),
            diagnostics.clone(),
            stats.clone(),
            tasks.clone(),
        ));
        let scanner = Arc::new(ErrorScanner::new(
            engine.clone(),
            &config,
            tracker.clone(),
            gate.clone(),
            diagnostics.clone(),
            stats.clone(),
            tasks.clone(),
            pipeline,
        ));
        Self {
            engine,
            config,
            scanner,
            gate,
            tracker,
            diagnostics,
            stats,
            tasks,
            watch_handle: Mutex::new(None),
        }
    }

    /// Attach to the document: subscribe to mutations and begin debounced
    /// scanning. Idempotent while already running.
    #[instrument(skip(self))]
    pub fn start(&self) {
        let mut guard = self
            .watch_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if guard.is_some() {
            debug!("sentinel already running");
            return;
        }
        // Subscribe before the task spawns so no mutation between now and
        // the first poll is lost.
        let rx = self.engine.subscribe_mutations();
        self.diagnostics.emit(
            None,
            DiagnosticStage::WatcherStarted,
            format!("rerun sentinel loaded, watching for \"{}\"", self.config.error_phrase),
        );
        let scanner = self.scanner.clone();
        *guard = Some(tokio::spawn(watch_loop(rx, scanner)));
    }

    /// Detach from the document: unsubscribes the observer and cancels
    /// pending timers, including an in-flight occurrence pipeline.
    #[instrument(skip(self))]
    pub fn stop(&self) {
        let handle = self
            .watch_handle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some(handle) = handle else {
            return;
        };
        handle.abort();
        self.tasks.abort_all();
        self.gate.release();
        self.diagnostics.emit(
            None,
            DiagnosticStage::WatcherStopped,
            "observer unsubscribed, pending work cancelled",
        );
    }

    /// Run a scan pass immediately, outside the debounce schedule.
    pub async fn scan_now(&self) {
        self.scanner.scan().await;
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Whether an occurrence pipeline is currently in flight.
    pub fn is_busy(&self) -> bool {
        self.gate.is_busy()
    }

    /// How many distinct occurrences have been handled or dropped so far.
    pub fn seen_count(&self) -> usize {
        self.tracker.len()
    }

    pub fn subscribe_diagnostics(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.diagnostics.subscribe()
    }

    /// Get a stream of diagnostic events
    pub fn diagnostics(&self) -> impl Stream<Item = DiagnosticEvent> {
        self.diagnostics.stream()
    }
}

impl Drop for Sentinel {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Trailing-edge debounce over the mutation feed: every observed batch
/// pushes the deadline out; the scan runs once when a full quiet window
/// elapses with no further mutations.
async fn watch_loop(mut rx: broadcast::Receiver<MutationBatch>, scanner: Arc<ErrorScanner>) {
    let mut deadline: Option<Instant> = None;
    loop {
        match deadline {
            Some(at) => {
                tokio::select! {
                    received = rx.recv() => match received {
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                            deadline = Some(Instant::now() + DEBOUNCE_QUIET_WINDOW);
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    _ = time::sleep_until(at) => {
                        deadline = None;
                        scanner.scan().await;
                    }
                }
            }
            None => match rx.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {
                    deadline = Some(Instant::now() + DEBOUNCE_QUIET_WINDOW);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
        }
    }
    debug!("mutation feed closed, watch loop exiting");
}
