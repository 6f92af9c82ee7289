use crate::backends::DomEngine;
use crate::diagnostics::{DiagnosticHub, DiagnosticStage};
use crate::element::DomElement;
use crate::gate::ProcessingGate;
use crate::mitigator::LagMitigator;
use crate::recovery::RecoveryTrigger;
use crate::selector::{parse_checked, Selector};
use crate::tracker::OccurrenceTracker;
use crate::watcher::{SentinelConfig, SentinelStats, TaskRegistry};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Delay between detection and the recovery attempt, letting the host finish
/// whatever re-render surfaced the error.
pub const PRE_RECOVERY_DELAY: Duration = Duration::from_millis(1000);

/// One detected error occurrence moving through the pipeline.
///
/// Identity is the marker node, not its text: two markers with identical
/// content are two occurrences. Nothing outlives the pipeline run; durable
/// state lives in the tracker and the gate only.
#[derive(Debug, Clone)]
pub struct ErrorOccurrence {
    pub id: Uuid,
    pub marker: DomElement,
}

/// Scans the document for error markers and dispatches qualifying ones into
/// the mitigation/recovery pipeline.
pub struct ErrorScanner {
    engine: Arc<dyn DomEngine>,
    marker_selector: Selector,
    error_phrase: String,
    marker_text_depth: usize,
    tracker: Arc<OccurrenceTracker>,
    gate: Arc<ProcessingGate>,
    diagnostics: Arc<DiagnosticHub>,
    stats: Arc<SentinelStats>,
    tasks: Arc<TaskRegistry>,
    pipeline: Arc<OccurrencePipeline>,
}

impl ErrorScanner {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: Arc<dyn DomEngine>,
        config: &SentinelConfig,
        tracker: Arc<OccurrenceTracker>,
        gate: Arc<ProcessingGate>,
        diagnostics: Arc<DiagnosticHub>,
        stats: Arc<SentinelStats>,
        tasks: Arc<TaskRegistry>,
        pipeline: Arc<OccurrencePipeline>,
    ) -> Self {
        Self {
            engine,
            marker_selector: parse_checked(&config.marker_selector),
            error_phrase: config.error_phrase.clone(),
            marker_text_depth: config.marker_text_depth,
            tracker,
            gate,
            diagnostics,
            stats,
            tasks,
            pipeline,
        }
    }

    /// One scan pass over the current document, markers visited in document
    /// order.
    #[instrument(level = "debug", skip(self))]
    pub async fn scan(&self) {
        let markers = match self.engine.find_elements(&self.marker_selector, None) {
            Ok(markers) => markers,
            Err(e) => {
                warn!(error = %e, "marker query failed, skipping scan pass");
                self.stats.record_scan();
                self.diagnostics.emit(
                    None,
                    DiagnosticStage::ScanCompleted,
                    format!("scan aborted: {e}"),
                );
                return;
            }
        };

        let total = markers.len();
        let mut dispatched = 0usize;
        for marker in markers {
            if self.tracker.has_seen(&marker) {
                continue;
            }
            // Read the text once; it is only used for signature matching.
            let text = match marker.text(self.marker_text_depth) {
                Ok(text) => text,
                Err(e) => {
                    debug!(error = %e, "marker text unreadable, skipping");
                    continue;
                }
            };
            if !text.contains(&self.error_phrase) {
                // Not a marker this watcher handles; leave it untracked so a
                // later content change can still qualify it.
                continue;
            }

            // Dedup before the gate: a busy window must never cause
            // reprocessing on a later pass.
            self.tracker.mark_seen(&marker);
            self.stats.record_detection();
            let occurrence = ErrorOccurrence {
                id: Uuid::new_v4(),
                marker,
            };
            self.diagnostics.emit(
                Some(occurrence.id),
                DiagnosticStage::ErrorDetected,
                format!(
                    "marker {} matched target phrase",
                    occurrence.marker.attributes().display_name()
                ),
            );

            if !self.gate.acquire() {
                self.stats.record_drop();
                self.diagnostics.emit(
                    Some(occurrence.id),
                    DiagnosticStage::OccurrenceDropped,
                    "pipeline busy; occurrence marked seen and dropped",
                );
                continue;
            }
            dispatched += 1;
            let pipeline = self.pipeline.clone();
            self.tasks.track(tokio::spawn(pipeline.run(occurrence)));
        }

        self.stats.record_scan();
        self.diagnostics.emit(
            None,
            DiagnosticStage::ScanCompleted,
            format!("{total} markers inspected, {dispatched} dispatched"),
        );
    }
}

/// The per-occurrence mitigation/recovery pipeline.
///
/// Owns the gate for the duration of one occurrence: acquired by the scanner
/// before spawn, released here on every exit path.
pub(crate) struct OccurrencePipeline {
    engine: Arc<dyn DomEngine>,
    turn_selector: Selector,
    mitigator: Arc<LagMitigator>,
    recovery: Arc<RecoveryTrigger>,
    gate: Arc<ProcessingGate>,
    diagnostics: Arc<DiagnosticHub>,
    stats: Arc<SentinelStats>,
    tasks: Arc<TaskRegistry>,
}

impl OccurrencePipeline {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        engine: Arc<dyn DomEngine>,
        config: &SentinelConfig,
        mitigator: Arc<LagMitigator>,
        recovery: Arc<RecoveryTrigger>,
        gate: Arc<ProcessingGate>,
        diagnostics: Arc<DiagnosticHub>,
        stats: Arc<SentinelStats>,
        tasks: Arc<TaskRegistry>,
    ) -> Self {
        Self {
            engine,
            turn_selector: parse_checked(&config.turn_selector),
            mitigator,
            recovery,
            gate,
            diagnostics,
            stats,
            tasks,
        }
    }

    pub(crate) async fn run(self: Arc<Self>, occurrence: ErrorOccurrence) {
        let turn = match occurrence.marker.closest(&self.turn_selector) {
            Ok(Some(turn)) => turn,
            Ok(None) => {
                self.stats.record_failure();
                self.diagnostics.emit(
                    Some(occurrence.id),
                    DiagnosticStage::TurnMissing,
                    format!("no enclosing {} for marker", self.turn_selector),
                );
                self.gate.release();
                return;
            }
            Err(e) => {
                self.stats.record_failure();
                self.diagnostics.emit(
                    Some(occurrence.id),
                    DiagnosticStage::TurnMissing,
                    format!("failed to resolve enclosing turn: {e}"),
                );
                self.gate.release();
                return;
            }
        };

        // Lag mitigation runs at the next paint opportunity, fire-and-forget;
        // recovery does not wait for it.
        {
            let engine = self.engine.clone();
            let mitigator = self.mitigator.clone();
            let turn = turn.clone();
            let id = occurrence.id;
            self.tasks.track(tokio::spawn(async move {
                engine.next_frame().await;
                mitigator.neutralize(&turn, id);
            }));
        }

        tokio::time::sleep(PRE_RECOVERY_DELAY).await;
        self.recovery.attempt(&turn, &occurrence).await;
        self.gate.release();
    }
}
