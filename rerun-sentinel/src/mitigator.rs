use crate::backends::DomEngine;
use crate::diagnostics::{DiagnosticHub, DiagnosticStage};
use crate::element::DomElement;
use crate::errors::SentinelError;
use crate::selector::{parse_checked, Selector};
use crate::watcher::{SentinelConfig, SentinelStats};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// Replaces the heavy prompt subtree of a failed turn with a cheap
/// placeholder to relieve rendering and memory pressure.
///
/// The replacement is irreversible and lossy on purpose; the prompt content
/// is discarded from the document. The caller schedules this at the next
/// paint opportunity because the subtree may still be mid-layout when the
/// error first appears.
pub struct LagMitigator {
    engine: Arc<dyn DomEngine>,
    prompt_selector: Selector,
    placeholder_markup: String,
    placeholder_height_px: u32,
    diagnostics: Arc<DiagnosticHub>,
    stats: Arc<SentinelStats>,
}

impl LagMitigator {
    pub(crate) fn new(
        engine: Arc<dyn DomEngine>,
        config: &SentinelConfig,
        diagnostics: Arc<DiagnosticHub>,
        stats: Arc<SentinelStats>,
    ) -> Self {
        Self {
            engine,
            prompt_selector: parse_checked(&config.prompt_selector),
            placeholder_markup: config.placeholder_markup.clone(),
            placeholder_height_px: config.placeholder_height_px,
            diagnostics,
            stats,
        }
    }

    pub fn neutralize(&self, turn: &DomElement, occurrence: Uuid) {
        match self.try_neutralize(turn) {
            Ok(true) => {
                self.stats.record_mitigation();
                self.diagnostics.emit(
                    Some(occurrence),
                    DiagnosticStage::MitigationApplied,
                    "prompt subtree replaced with placeholder",
                );
            }
            Ok(false) => {
                // Absent prompt subtree is not an error.
                self.diagnostics.emit(
                    Some(occurrence),
                    DiagnosticStage::MitigationSkipped,
                    "no prompt subtree in turn",
                );
            }
            Err(e) => {
                warn!(error = %e, "lag mitigation failed");
                self.diagnostics.emit(
                    Some(occurrence),
                    DiagnosticStage::MitigationSkipped,
                    format!("mitigation failed: {e}"),
                );
            }
        }
    }

    fn try_neutralize(&self, turn: &DomElement) -> Result<bool, SentinelError> {
        let prompt = match self.engine.find_element(&self.prompt_selector, Some(turn)) {
            Ok(prompt) => prompt,
            Err(SentinelError::ElementNotFound(_)) => return Ok(false),
            Err(e) => return Err(e),
        };
        // Constrain layout before swapping content so the renderer never
        // re-lays-out the full subtree in between.
        prompt.set_style("contain", "strict")?;
        prompt.set_style("height", &format!("{}px", self.placeholder_height_px))?;
        prompt.set_style("overflow", "hidden")?;
        prompt.replace_content(&self.placeholder_markup)?;
        Ok(true)
    }
}
