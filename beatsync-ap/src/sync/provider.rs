//! Music service capabilities
//!
//! The watcher consumes two capabilities: "what is playing now" and "audio
//! features for a track id". A real service implements both; tests script
//! them independently.
//!
//! `ProviderSlot` is the injected session holder. It starts empty and is
//! filled (or replaced) whenever credentials become available. A session the
//! service rejects is dropped until the next one is installed.

use crate::error::ProviderError;
use async_trait::async_trait;
use beatsync_common::TrackIdentity;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// What the service reports as playing
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NowPlaying {
    pub track: TrackIdentity,
    pub is_playing: bool,
}

/// Tempo and key as reported by the service (not yet validated)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AudioFeatures {
    pub tempo_bpm: f64,
    /// Pitch class, None when the service has no key estimate
    pub pitch_class: Option<i32>,
}

#[async_trait]
pub trait NowPlayingProvider: Send + Sync {
    /// Current track, or None when nothing is playing
    async fn currently_playing(&self) -> Result<Option<NowPlaying>, ProviderError>;
}

#[async_trait]
pub trait AudioFeaturesProvider: Send + Sync {
    /// Features for `track_id`, or None when the service does not know it
    async fn features_for(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError>;
}

/// A service offering both capabilities
pub trait MusicService: NowPlayingProvider + AudioFeaturesProvider {}

impl<T: NowPlayingProvider + AudioFeaturesProvider> MusicService for T {}

/// Swappable music service session
#[derive(Default)]
pub struct ProviderSlot {
    service: RwLock<Option<Arc<dyn MusicService>>>,
    installs: AtomicU64,
}

impl ProviderSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a new session, replacing any previous one
    pub async fn install(&self, service: Arc<dyn MusicService>) {
        *self.service.write().await = Some(service);
        let count = self.installs.fetch_add(1, Ordering::Relaxed) + 1;
        info!("Music service session installed (#{})", count);
    }

    /// Drop `service` if it is still the installed session; calls fail with
    /// `NotAuthorized` until the next install
    async fn revoke(&self, service: &Arc<dyn MusicService>) {
        let mut slot = self.service.write().await;
        if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, service)) {
            *slot = None;
            warn!("Music service rejected the session; waiting for a new token");
        }
    }

    pub async fn is_installed(&self) -> bool {
        self.service.read().await.is_some()
    }

    /// Number of sessions installed since startup
    pub fn installs(&self) -> u64 {
        self.installs.load(Ordering::Relaxed)
    }

    async fn current(&self) -> Result<Arc<dyn MusicService>, ProviderError> {
        self.service
            .read()
            .await
            .clone()
            .ok_or(ProviderError::NotAuthorized)
    }
}

#[async_trait]
impl NowPlayingProvider for ProviderSlot {
    async fn currently_playing(&self) -> Result<Option<NowPlaying>, ProviderError> {
        // Guard released before the network call
        let service = self.current().await?;
        let result = service.currently_playing().await;
        if matches!(result, Err(ProviderError::Unauthorized)) {
            self.revoke(&service).await;
        }
        result
    }
}

#[async_trait]
impl AudioFeaturesProvider for ProviderSlot {
    async fn features_for(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
        let service = self.current().await?;
        let result = service.features_for(track_id).await;
        if matches!(result, Err(ProviderError::Unauthorized)) {
            self.revoke(&service).await;
        }
        result
    }
}
