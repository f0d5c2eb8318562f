//! Track watcher
//!
//! One `poll()` samples the now-playing provider once and turns what it sees
//! into at most one [`WatcherEvent`]:
//!
//! | Observation                        | Event          |
//! |------------------------------------|----------------|
//! | nothing playing, cursor set        | `Stopped`      |
//! | new track id, features found       | `TrackChanged` |
//! | same track id, tempo known, engine stopped | `Resume` |
//! | anything else                      | none           |
//!
//! Provider errors are logged and counted; the poll simply ends and the next
//! one starts from the same cursor. The cursor advances to a new track only
//! once its features lookup succeeds.

use crate::error::ProviderError;
use crate::metronome::{EngineSnapshot, WatcherEvent};
use crate::sync::provider::{AudioFeatures, AudioFeaturesProvider, NowPlayingProvider};
use beatsync_common::{KeySignature, Tempo, TrackIdentity};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::{mpsc, watch, RwLock};
use tracing::{debug, info, warn};

/// After the threshold, still warn on every Nth consecutive failure
const FAILURE_WARN_EVERY: u64 = 20;

/// Last track the watcher acted on
#[derive(Debug, Default)]
struct PollCursor {
    last: Option<TrackIdentity>,
    /// Set only when `TrackChanged` was raised for `last`
    tempo_known: bool,
}

impl PollCursor {
    fn is_current(&self, track: &TrackIdentity) -> bool {
        self.last.as_ref().is_some_and(|last| last.same_track(track))
    }
}

/// Poll counters for diagnostics
#[derive(Debug, Clone, Default, Serialize)]
pub struct WatcherStats {
    pub polls: u64,
    pub failures: u64,
    pub consecutive_failures: u64,
    pub last_error: Option<String>,
    pub last_track: Option<TrackIdentity>,
}

pub struct TrackWatcher {
    now_playing: Arc<dyn NowPlayingProvider>,
    features: Arc<dyn AudioFeaturesProvider>,
    engine: watch::Receiver<EngineSnapshot>,
    events_tx: mpsc::UnboundedSender<WatcherEvent>,
    cursor: PollCursor,
    stats: Arc<RwLock<WatcherStats>>,
    failure_log_threshold: u64,
}

impl TrackWatcher {
    pub fn new(
        now_playing: Arc<dyn NowPlayingProvider>,
        features: Arc<dyn AudioFeaturesProvider>,
        engine: watch::Receiver<EngineSnapshot>,
        events_tx: mpsc::UnboundedSender<WatcherEvent>,
        failure_log_threshold: u32,
    ) -> Self {
        Self {
            now_playing,
            features,
            engine,
            events_tx,
            cursor: PollCursor::default(),
            stats: Arc::new(RwLock::new(WatcherStats::default())),
            failure_log_threshold: u64::from(failure_log_threshold),
        }
    }

    /// Shared handle to the poll counters
    pub fn stats(&self) -> Arc<RwLock<WatcherStats>> {
        Arc::clone(&self.stats)
    }

    /// Sample the provider once; returns (and sends) the event raised, if any
    pub async fn poll(&mut self) -> Option<WatcherEvent> {
        self.stats.write().await.polls += 1;

        let event = match self.observe().await {
            Ok(event) => {
                self.record_success().await;
                event
            }
            Err(e) => {
                self.record_failure(e).await;
                None
            }
        };

        if let Some(event) = &event {
            debug!("Watcher raised {}", event.name());
            if self.events_tx.send(event.clone()).is_err() {
                debug!("Watcher event dropped: controller gone");
            }
        }
        event
    }

    async fn observe(&mut self) -> Result<Option<WatcherEvent>, ProviderError> {
        let playing = self
            .now_playing
            .currently_playing()
            .await?
            .filter(|p| p.is_playing);

        let Some(playing) = playing else {
            return Ok(self.cursor.last.take().map(|track| {
                debug!(track_id = %track.id, "Track no longer playing");
                WatcherEvent::Stopped
            }));
        };

        if self.cursor.is_current(&playing.track) {
            if !self.cursor.tempo_known {
                return Ok(None);
            }
            let engine = self.engine.borrow();
            return Ok((!engine.running && !engine.held).then_some(WatcherEvent::Resume));
        }

        let track = playing.track;
        let Some(features) = self.features.features_for(&track.id).await? else {
            info!(track_id = %track.id, "No audio features for {}; keeping current tempo", track);
            self.commit(track, false).await;
            return Ok(None);
        };

        let (tempo, key) = derive_tempo_and_key(&features)?;
        self.commit(track.clone(), true).await;
        Ok(Some(WatcherEvent::TrackChanged { track, tempo, key }))
    }

    async fn commit(&mut self, track: TrackIdentity, tempo_known: bool) {
        self.stats.write().await.last_track = Some(track.clone());
        self.cursor.last = Some(track);
        self.cursor.tempo_known = tempo_known;
    }

    async fn record_success(&self) {
        let mut stats = self.stats.write().await;
        if stats.consecutive_failures > 0 {
            info!(
                "Music service reachable again after {} failed polls",
                stats.consecutive_failures
            );
            stats.consecutive_failures = 0;
        }
    }

    async fn record_failure(&self, error: ProviderError) {
        let mut stats = self.stats.write().await;
        stats.failures += 1;
        stats.consecutive_failures += 1;
        stats.last_error = Some(error.to_string());

        let n = stats.consecutive_failures;
        let hint = match error {
            ProviderError::Unauthorized | ProviderError::NotAuthorized => {
                " (supply a token via POST /sync/token)"
            }
            _ => "",
        };

        if n <= self.failure_log_threshold {
            warn!("Poll failed ({} in a row): {}{}", n, error, hint);
        } else if n % FAILURE_WARN_EVERY == 0 {
            warn!("Poll still failing after {} attempts: {}{}", n, error, hint);
        } else {
            debug!("Poll failed ({} in a row): {}", n, error);
        }
    }
}

/// Validate provider features into a tempo and an optional key
///
/// Tempos are rounded to whole bpm and clamped into the supported range.
/// A key outside 0..=11 is dropped with a warning.
pub fn derive_tempo_and_key(
    features: &AudioFeatures,
) -> Result<(Tempo, Option<KeySignature>), ProviderError> {
    let tempo = Tempo::from_reported(features.tempo_bpm)
        .map_err(|e| ProviderError::Malformed(e.to_string()))?;

    let key = match features.pitch_class {
        None => None,
        Some(pitch_class) => match KeySignature::from_pitch_class(pitch_class) {
            Ok(key) => Some(key),
            Err(e) => {
                warn!("Ignoring key from music service: {}", e);
                None
            }
        },
    };

    Ok((tempo, key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn features(tempo_bpm: f64, pitch_class: Option<i32>) -> AudioFeatures {
        AudioFeatures {
            tempo_bpm,
            pitch_class,
        }
    }

    #[test]
    fn test_tempo_is_rounded() {
        let (tempo, _) = derive_tempo_and_key(&features(119.6, None)).unwrap();
        assert_eq!(tempo.bpm(), 120);
        let (tempo, _) = derive_tempo_and_key(&features(89.4, None)).unwrap();
        assert_eq!(tempo.bpm(), 89);
    }

    #[test]
    fn test_tempo_outside_range_is_clamped() {
        let (slow, _) = derive_tempo_and_key(&features(8.0, None)).unwrap();
        assert_eq!(slow.bpm(), Tempo::MIN_BPM);
        let (fast, _) = derive_tempo_and_key(&features(999.0, None)).unwrap();
        assert_eq!(fast.bpm(), Tempo::MAX_BPM);
    }

    #[test]
    fn test_unusable_tempo_is_malformed() {
        assert!(matches!(
            derive_tempo_and_key(&features(0.0, Some(1))),
            Err(ProviderError::Malformed(_))
        ));
        assert!(matches!(
            derive_tempo_and_key(&features(f64::NAN, Some(1))),
            Err(ProviderError::Malformed(_))
        ));
    }

    #[test]
    fn test_key_mapping() {
        let (_, key) = derive_tempo_and_key(&features(100.0, Some(1))).unwrap();
        assert_eq!(key.map(|k| k.name()), Some("C#"));
        let (_, key) = derive_tempo_and_key(&features(100.0, Some(11))).unwrap();
        assert_eq!(key.map(|k| k.name()), Some("B"));
        let (_, key) = derive_tempo_and_key(&features(100.0, Some(12))).unwrap();
        assert_eq!(key, None);
    }

    #[test]
    fn test_cursor_matches_by_id_only() {
        let cursor = PollCursor {
            last: Some(TrackIdentity::new("a", "Old name", "Old artist")),
            tempo_known: true,
        };
        assert!(cursor.is_current(&TrackIdentity::new("a", "New name", "New artist")));
        assert!(!cursor.is_current(&TrackIdentity::new("b", "Old name", "Old artist")));
    }
}
