use crate::backends::DomEngine;
use crate::diagnostics::{DiagnosticHub, DiagnosticStage};
use crate::element::DomElement;
use crate::errors::SentinelError;
use crate::scanner::ErrorOccurrence;
use crate::selector::{parse_checked, Selector};
use crate::watcher::{SentinelConfig, SentinelStats};
use std::sync::Arc;
use std::time::Duration;
use tracing::{instrument, warn};

/// Delay between the hover-reveal stage and the activation stage, giving the
/// host's conditional rendering time to mount the control.
pub const REVEAL_TO_ACTIVATION_DELAY: Duration = Duration::from_millis(500);

/// Synthesizes the interaction sequence that reruns a failed turn.
///
/// The rerun control is only rendered while a hover state is active, so a
/// click alone finds nothing: stage 1 dispatches the hover sequence on the
/// turn (and its actions container, when present), stage 2 locates and
/// activates the control after a fixed delay.
pub struct RecoveryTrigger {
    engine: Arc<dyn DomEngine>,
    actions_selector: Selector,
    /// Candidate selectors in priority order; first match wins, no scoring.
    candidates: Vec<Selector>,
    diagnostics: Arc<DiagnosticHub>,
    stats: Arc<SentinelStats>,
}

impl RecoveryTrigger {
    pub(crate) fn new(
        engine: Arc<dyn DomEngine>,
        config: &SentinelConfig,
        diagnostics: Arc<DiagnosticHub>,
        stats: Arc<SentinelStats>,
    ) -> Self {
        Self {
            engine,
            actions_selector: parse_checked(&config.actions_selector),
            candidates: config
                .recovery_selectors
                .iter()
                .map(|s| parse_checked(s))
                .collect(),
            diagnostics,
            stats,
        }
    }

    /// Run both stages against the enclosing turn. Failure to find the
    /// control is terminal for this occurrence; there is no retry.
    #[instrument(level = "debug", skip(self, turn, occurrence))]
    pub async fn attempt(&self, turn: &DomElement, occurrence: &ErrorOccurrence) {
        self.reveal(turn, occurrence);
        tokio::time::sleep(REVEAL_TO_ACTIVATION_DELAY).await;
        self.activate(turn, occurrence);
    }

    /// Stage 1: flip the hover state of the turn so the controls render.
    fn reveal(&self, turn: &DomElement, occurrence: &ErrorOccurrence) {
        match turn.hover() {
            Ok(()) => self.diagnostics.emit(
                Some(occurrence.id),
                DiagnosticStage::HoverDispatched,
                format!("hover sequence on turn {}", turn.attributes().display_name()),
            ),
            Err(e) => warn!(error = %e, "hover on turn root failed"),
        }
        match self.engine.find_element(&self.actions_selector, Some(turn)) {
            Ok(actions) => match actions.hover() {
                Ok(()) => self.diagnostics.emit(
                    Some(occurrence.id),
                    DiagnosticStage::HoverDispatched,
                    "hover sequence on actions container",
                ),
                Err(e) => warn!(error = %e, "hover on actions container failed"),
            },
            Err(SentinelError::ElementNotFound(_)) => {}
            Err(e) => warn!(error = %e, "actions container lookup failed"),
        }
    }

    /// Stage 2: locate the rerun control and activate it.
    fn activate(&self, turn: &DomElement, occurrence: &ErrorOccurrence) {
        for selector in &self.candidates {
            let control = match self.engine.find_element(selector, Some(turn)) {
                Ok(control) => control,
                Err(SentinelError::ElementNotFound(_)) => continue,
                Err(e) => {
                    warn!(error = %e, %selector, "candidate lookup failed");
                    continue;
                }
            };
            match control.click() {
                Ok(result) => {
                    self.stats.record_click();
                    self.diagnostics.emit(
                        Some(occurrence.id),
                        DiagnosticStage::RecoveryClicked,
                        format!("clicked {} via {selector} ({})", result.details, result.method),
                    );
                }
                Err(e) => {
                    self.stats.record_failure();
                    warn!(error = %e, %selector, "activation failed");
                }
            }
            return;
        }

        // Exhausted every candidate. Count the buttons that are present to
        // make the failure log actionable.
        let buttons = self
            .engine
            .find_elements(&Selector::Tag("button".to_string()), Some(turn))
            .map(|b| b.len())
            .unwrap_or(0);
        self.stats.record_failure();
        self.diagnostics.emit(
            Some(occurrence.id),
            DiagnosticStage::RecoveryControlMissing,
            format!(
                "no recovery control matched {} candidates ({buttons} buttons present in turn)",
                self.candidates.len()
            ),
        );
    }
}
