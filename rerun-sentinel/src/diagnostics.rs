//! Append-only diagnostic event stream.
//!
//! Pure observability side-channel: nothing in the pipeline reads it back,
//! and dropping every receiver has no effect on processing.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::broadcast;
use tokio_stream::Stream;
use tracing::{debug, info, warn};
use uuid::Uuid;

const DIAGNOSTIC_CHANNEL_CAPACITY: usize = 256;

/// A single timestamped diagnostic record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp_ms: u64,
    /// Occurrence this record belongs to, when it is occurrence-scoped.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub occurrence: Option<Uuid>,
    pub stage: DiagnosticStage,
    pub detail: String,
}

impl DiagnosticEvent {
    /// Convert to JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticStage {
    WatcherStarted,
    WatcherStopped,
    ScanCompleted,
    ErrorDetected,
    OccurrenceDropped,
    TurnMissing,
    MitigationApplied,
    MitigationSkipped,
    HoverDispatched,
    RecoveryClicked,
    RecoveryControlMissing,
}

pub struct DiagnosticHub {
    tx: broadcast::Sender<DiagnosticEvent>,
}

impl Default for DiagnosticHub {
    fn default() -> Self {
        Self::new()
    }
}

impl DiagnosticHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(DIAGNOSTIC_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub(crate) fn emit(
        &self,
        occurrence: Option<Uuid>,
        stage: DiagnosticStage,
        detail: impl Into<String>,
    ) {
        let event = DiagnosticEvent {
            timestamp_ms: now_ms(),
            occurrence,
            stage,
            detail: detail.into(),
        };
        match stage {
            DiagnosticStage::TurnMissing
            | DiagnosticStage::RecoveryControlMissing
            | DiagnosticStage::OccurrenceDropped => {
                warn!(?stage, occurrence = ?event.occurrence, "{}", event.detail)
            }
            DiagnosticStage::WatcherStarted
            | DiagnosticStage::WatcherStopped
            | DiagnosticStage::ErrorDetected
            | DiagnosticStage::MitigationApplied
            | DiagnosticStage::RecoveryClicked => {
                info!(?stage, occurrence = ?event.occurrence, "{}", event.detail)
            }
            DiagnosticStage::ScanCompleted
            | DiagnosticStage::MitigationSkipped
            | DiagnosticStage::HoverDispatched => {
                debug!(?stage, occurrence = ?event.occurrence, "{}", event.detail)
            }
        }
        // No receivers is the normal case; the stream is purely optional.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiagnosticEvent> {
        self.tx.subscribe()
    }

    /// Get a stream of diagnostic events
    pub fn stream(&self) -> impl Stream<Item = DiagnosticEvent> {
        let mut rx = self.tx.subscribe();
        Box::pin(async_stream::stream! {
            loop {
                match rx.recv().await {
                    Ok(event) => yield event,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Log but continue - don't terminate stream on lag
                        warn!("diagnostic stream lagged, skipped {skipped} events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
