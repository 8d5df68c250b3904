//! Error/event recording.
//!
//! Some failures are deliberately not returned to the caller: an external
//! encoder that times out or exits non-zero only means "no usable output",
//! and the derivative layer falls back to a default representation. Those
//! failures are handed to an [`EventRecorder`] instead, which must never fail.

use crate::types::{AssetId, GalleryId};
use std::sync::Mutex;

/// Where a recorded event happened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventContext {
    pub gallery_id: Option<GalleryId>,
    pub asset_id: Option<AssetId>,
    /// Free-form detail, e.g. the encoder command line or collected output.
    pub detail: Option<String>,
}

impl EventContext {
    pub fn gallery(gallery_id: GalleryId) -> Self {
        Self {
            gallery_id: Some(gallery_id),
            ..Self::default()
        }
    }

    pub fn with_asset(mut self, asset_id: AssetId) -> Self {
        self.asset_id = Some(asset_id);
        self
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

/// Fire-and-forget sink for errors that are recorded rather than propagated.
pub trait EventRecorder: Send + Sync {
    fn record(&self, error: &dyn std::error::Error, context: EventContext);
}

/// Logs recorded events through `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingRecorder;

impl EventRecorder for TracingRecorder {
    fn record(&self, error: &dyn std::error::Error, context: EventContext) {
        tracing::error!(
            gallery = ?context.gallery_id,
            asset = ?context.asset_id,
            detail = context.detail.as_deref().unwrap_or(""),
            "{error}"
        );
    }
}

/// A recorded event, as kept by [`MemoryRecorder`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub message: String,
    pub context: EventContext,
}

/// Keeps recorded events in memory, e.g. for an admin "event log" view.
#[derive(Debug, Default)]
pub struct MemoryRecorder {
    events: Mutex<Vec<RecordedEvent>>,
}

impl MemoryRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn clear(&self) {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }
}

impl EventRecorder for MemoryRecorder {
    fn record(&self, error: &dyn std::error::Error, context: EventContext) {
        tracing::warn!(asset = ?context.asset_id, "recorded: {error}");
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedEvent {
                message: error.to_string(),
                context,
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_recorder_keeps_message_and_context() {
        let recorder = MemoryRecorder::new();
        let err = std::io::Error::other("encoder crashed");
        recorder.record(
            &err,
            EventContext::gallery(GalleryId(3))
                .with_asset(AssetId(9))
                .with_detail("ffmpeg -i x"),
        );

        let events = recorder.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message, "encoder crashed");
        assert_eq!(events[0].context.gallery_id, Some(GalleryId(3)));
        assert_eq!(events[0].context.asset_id, Some(AssetId(9)));
        assert_eq!(events[0].context.detail.as_deref(), Some("ffmpeg -i x"));

        recorder.clear();
        assert!(recorder.events().is_empty());
    }

    #[test]
    fn tracing_recorder_never_panics() {
        let err = std::io::Error::other("boom");
        TracingRecorder.record(&err, EventContext::default());
    }
}
