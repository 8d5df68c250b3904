//! The service bundle handed to asset lifecycle operations.
//!
//! Nothing in the asset layer reaches for global state: the store, settings
//! source, cache, event recorder and image backend all arrive through a
//! [`GalleryContext`].

use crate::cache::CacheController;
use crate::config::{ConfigError, GallerySettings, SettingsProvider};
use crate::encoder::EncoderRunner;
use crate::events::{EventRecorder, TracingRecorder};
use crate::imaging::ImageBackend;
use crate::store::Repository;
use crate::types::GalleryId;
use std::sync::Arc;

/// Name recorded in audit fields when no user is set.
pub const SYSTEM_USER: &str = "system";

#[derive(Clone)]
pub struct GalleryContext {
    pub store: Arc<dyn Repository>,
    pub settings: Arc<dyn SettingsProvider>,
    pub cache: Arc<CacheController>,
    pub recorder: Arc<dyn EventRecorder>,
    pub backend: Arc<dyn ImageBackend>,
    /// Recorded as `created_by` / `last_modified_by`.
    pub user: String,
}

impl GalleryContext {
    pub fn new(
        store: Arc<dyn Repository>,
        settings: Arc<dyn SettingsProvider>,
        backend: Arc<dyn ImageBackend>,
    ) -> Self {
        Self {
            store,
            settings,
            cache: Arc::new(CacheController::default()),
            recorder: Arc::new(TracingRecorder),
            backend,
            user: SYSTEM_USER.to_string(),
        }
    }

    pub fn with_recorder(mut self, recorder: Arc<dyn EventRecorder>) -> Self {
        self.recorder = recorder;
        self
    }

    pub fn with_cache(mut self, cache: Arc<CacheController>) -> Self {
        self.cache = cache;
        self
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = user.into();
        self
    }

    /// Settings of a gallery, read through the cache.
    pub fn gallery_settings(&self, gallery: GalleryId) -> Result<Arc<GallerySettings>, ConfigError> {
        self.cache.gallery_settings(self.settings.as_ref(), gallery)
    }

    /// Encoder runner for a gallery's settings.
    pub fn encoder(&self, settings: &GallerySettings) -> EncoderRunner {
        EncoderRunner::from_settings(settings, self.recorder.clone())
    }
}
