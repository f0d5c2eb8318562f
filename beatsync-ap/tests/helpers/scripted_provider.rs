//! Scripted music service
//!
//! `currently_playing` replays a list of steps, one per call; once the list
//! runs out the last step repeats. Features are looked up in a table.

use async_trait::async_trait;
use beatsync_ap::sync::{AudioFeatures, AudioFeaturesProvider, NowPlaying, NowPlayingProvider};
use beatsync_ap::ProviderError;
use beatsync_common::TrackIdentity;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// One `currently_playing` answer
#[derive(Debug, Clone)]
pub enum Step {
    Playing(TrackIdentity),
    Paused(TrackIdentity),
    Nothing,
    Fail(ProviderError),
}

impl Step {
    pub fn playing(id: &str) -> Self {
        Step::Playing(track(id))
    }
}

pub fn track(id: &str) -> TrackIdentity {
    TrackIdentity::new(id, format!("Song {}", id), format!("Artist {}", id))
}

pub struct ScriptedProvider {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Step>,
    features: HashMap<String, AudioFeatures>,
    /// Errors returned by the next features lookups for a track, in order
    feature_failures: Mutex<HashMap<String, VecDeque<ProviderError>>>,
    now_playing_calls: AtomicU64,
    features_calls: AtomicU64,
}

impl ScriptedProvider {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(Step::Nothing),
            features: HashMap::new(),
            feature_failures: Mutex::new(HashMap::new()),
            now_playing_calls: AtomicU64::new(0),
            features_calls: AtomicU64::new(0),
        }
    }

    /// Features for `id`: tempo and optional pitch class
    pub fn with_features(mut self, id: &str, tempo_bpm: f64, pitch_class: Option<i32>) -> Self {
        self.features.insert(
            id.to_string(),
            AudioFeatures {
                tempo_bpm,
                pitch_class,
            },
        );
        self
    }

    /// Fail the next features lookup for `id` with `error`
    pub fn failing_features_once(self, id: &str, error: ProviderError) -> Self {
        self.feature_failures
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_default()
            .push_back(error);
        self
    }

    /// Append more steps to the script
    pub fn push(&self, step: Step) {
        self.steps.lock().unwrap().push_back(step);
    }

    pub fn now_playing_calls(&self) -> u64 {
        self.now_playing_calls.load(Ordering::SeqCst)
    }

    pub fn features_calls(&self) -> u64 {
        self.features_calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let next = self.steps.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = next {
            *last = step;
        }
        last.clone()
    }
}

#[async_trait]
impl NowPlayingProvider for ScriptedProvider {
    async fn currently_playing(&self) -> Result<Option<NowPlaying>, ProviderError> {
        self.now_playing_calls.fetch_add(1, Ordering::SeqCst);
        match self.next_step() {
            Step::Playing(track) => Ok(Some(NowPlaying {
                track,
                is_playing: true,
            })),
            Step::Paused(track) => Ok(Some(NowPlaying {
                track,
                is_playing: false,
            })),
            Step::Nothing => Ok(None),
            Step::Fail(error) => Err(error),
        }
    }
}

#[async_trait]
impl AudioFeaturesProvider for ScriptedProvider {
    async fn features_for(&self, track_id: &str) -> Result<Option<AudioFeatures>, ProviderError> {
        self.features_calls.fetch_add(1, Ordering::SeqCst);

        let failure = self
            .feature_failures
            .lock()
            .unwrap()
            .get_mut(track_id)
            .and_then(|queue| queue.pop_front());
        if let Some(error) = failure {
            return Err(error);
        }

        Ok(self.features.get(track_id).copied())
    }
}
