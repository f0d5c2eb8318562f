//! Metronome controller
//!
//! Sole owner of the engine state. Every change (manual edits from the API,
//! watcher events, lookups) goes through one of the entry points below, each
//! of which holds the state lock for the whole transition, including the
//! clock call. The clock and the watcher never write engine state.
//!
//! Readers get a copy of the state through a `watch` channel; the watcher
//! uses it to decide whether a `Resume` makes sense.
//!
//! The entry points are synchronous because `BeatClock::stop` blocks until
//! the tick thread has quiesced. Async callers go through `spawn_blocking`.

use crate::audio::SoundPlayback;
use crate::error::Result;
use crate::metronome::clock::BeatClock;
use crate::metronome::events::WatcherEvent;
use crate::state::SharedState;
use beatsync_common::events::{BeatsyncEvent, TempoSource};
use beatsync_common::{KeySignature, Tempo, TrackIdentity};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

/// Authoritative engine state
#[derive(Debug, Clone)]
struct EngineState {
    running: bool,
    tempo: Tempo,
    key: Option<KeySignature>,
    /// Track the current tempo came from, if any
    track: Option<TrackIdentity>,
    /// Set by a manual stop; blocks `Resume` until the track changes
    hold: bool,
}

impl EngineState {
    fn new(tempo: Tempo) -> Self {
        Self {
            running: false,
            tempo,
            key: None,
            track: None,
            hold: false,
        }
    }

    fn snapshot(&self) -> EngineSnapshot {
        EngineSnapshot {
            running: self.running,
            tempo: self.tempo,
            key: self.key,
            key_name: self.key.map(|k| k.name().to_string()),
            track: self.track.clone(),
            held: self.hold,
        }
    }
}

/// Read-only copy of the engine state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EngineSnapshot {
    pub running: bool,
    pub tempo: Tempo,
    pub key: Option<KeySignature>,
    pub key_name: Option<String>,
    pub track: Option<TrackIdentity>,
    /// True after a manual stop until the next track change or manual start
    pub held: bool,
}

pub struct MetronomeController {
    clock: BeatClock,
    state: Mutex<EngineState>,
    snapshot_tx: watch::Sender<EngineSnapshot>,
    shared: Arc<SharedState>,
}

impl MetronomeController {
    /// Create a stopped controller at `initial` tempo with no key
    pub fn new(
        sound: Arc<dyn SoundPlayback>,
        initial: Tempo,
        shared: Arc<SharedState>,
    ) -> Result<Self> {
        let clock = BeatClock::new(sound, initial)?;
        let state = EngineState::new(initial);
        let (snapshot_tx, _) = watch::channel(state.snapshot());

        Ok(Self {
            clock,
            state: Mutex::new(state),
            snapshot_tx,
            shared,
        })
    }

    fn lock(&self) -> MutexGuard<'_, EngineState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish(&self, state: &EngineState) {
        self.snapshot_tx.send_replace(state.snapshot());
    }

    /// Receiver that always holds the latest snapshot
    pub fn subscribe(&self) -> watch::Receiver<EngineSnapshot> {
        self.snapshot_tx.subscribe()
    }

    pub fn snapshot(&self) -> EngineSnapshot {
        self.lock().snapshot()
    }

    /// Ticks fired since startup
    pub fn beats(&self) -> u64 {
        self.clock.beats()
    }

    pub fn is_running(&self) -> bool {
        self.lock().running
    }

    /// Apply a tempo typed by the user.
    ///
    /// Unparseable or out-of-range input is dropped and the tempo left as it
    /// was; returns the applied tempo on success.
    pub fn on_manual_tempo_edit(&self, raw: &str) -> Option<Tempo> {
        let tempo = match Tempo::parse(raw) {
            Ok(tempo) => tempo,
            Err(e) => {
                debug!("Rejected manual tempo {:?}: {}", raw, e);
                return None;
            }
        };

        let mut state = self.lock();
        state.tempo = tempo;
        self.clock.retune(tempo);
        self.publish(&state);
        drop(state);

        info!("Manual tempo set to {}", tempo);
        self.shared.broadcast_event(BeatsyncEvent::TempoChanged {
            bpm: tempo.bpm(),
            source: TempoSource::Manual,
            timestamp: chrono::Utc::now(),
        });
        Some(tempo)
    }

    pub fn on_manual_start(&self) {
        let mut state = self.lock();
        state.hold = false;
        let started = self.start_locked(&mut state);
        self.publish(&state);
        drop(state);

        if started {
            self.broadcast_running(true);
        }
    }

    /// Stop and hold: a `Resume` will not restart until the track changes
    pub fn on_manual_stop(&self) {
        let mut state = self.lock();
        state.hold = true;
        let stopped = self.stop_locked(&mut state);
        self.publish(&state);
        drop(state);

        if stopped {
            info!("Metronome stopped by user (held until next track change)");
            self.broadcast_running(false);
        }
    }

    /// New track: adopt its tempo and key and make sure we are ticking
    pub fn on_track_changed(&self, track: TrackIdentity, tempo: Tempo, key: Option<KeySignature>) {
        let mut state = self.lock();
        let tempo_changed = state.tempo != tempo;

        info!(
            track_id = %track.id,
            "Now playing {} at {} (key {})",
            track,
            tempo,
            key.map(|k| k.name()).unwrap_or("unknown")
        );

        state.tempo = tempo;
        state.key = key;
        state.track = Some(track.clone());
        state.hold = false;
        self.clock.retune(tempo);
        let started = self.start_locked(&mut state);
        self.publish(&state);
        drop(state);

        let timestamp = chrono::Utc::now();
        self.shared.broadcast_event(BeatsyncEvent::TrackChanged {
            track_id: track.id,
            name: track.name,
            artist: track.artist,
            bpm: tempo.bpm(),
            key: key.map(|k| k.name().to_string()),
            timestamp,
        });
        if tempo_changed {
            self.shared.broadcast_event(BeatsyncEvent::TempoChanged {
                bpm: tempo.bpm(),
                source: TempoSource::Track,
                timestamp,
            });
        }
        if started {
            self.broadcast_running(true);
        }
    }

    /// Nothing playing: stop, keep the last tempo and key
    pub fn on_track_stopped(&self) {
        let mut state = self.lock();
        state.track = None;
        let stopped = self.stop_locked(&mut state);
        self.publish(&state);
        drop(state);

        info!("Playback stopped on music service");
        self.shared.broadcast_event(BeatsyncEvent::TrackStopped {
            timestamp: chrono::Utc::now(),
        });
        if stopped {
            self.broadcast_running(false);
        }
    }

    /// Same track still playing while we are stopped: restart unless held
    pub fn on_resume(&self) {
        let mut state = self.lock();
        if state.hold {
            debug!("Ignoring resume: metronome held by manual stop");
            return;
        }
        let started = self.start_locked(&mut state);
        self.publish(&state);
        drop(state);

        if started {
            info!("Resumed metronome for current track");
            self.broadcast_running(true);
        }
    }

    /// Tempo and key from a one-shot lookup. Retunes, never starts.
    pub fn apply_lookup(&self, tempo: Tempo, key: Option<KeySignature>) {
        let mut state = self.lock();
        state.tempo = tempo;
        state.key = key;
        self.clock.retune(tempo);
        self.publish(&state);
        drop(state);

        info!("Lookup applied: {}", tempo);
        self.shared.broadcast_event(BeatsyncEvent::TempoChanged {
            bpm: tempo.bpm(),
            source: TempoSource::Lookup,
            timestamp: chrono::Utc::now(),
        });
    }

    /// Dispatch a watcher event
    pub fn apply(&self, event: WatcherEvent) {
        debug!("Applying watcher event: {}", event.name());
        match event {
            WatcherEvent::TrackChanged { track, tempo, key } => {
                self.on_track_changed(track, tempo, key)
            }
            WatcherEvent::Stopped => self.on_track_stopped(),
            WatcherEvent::Resume => self.on_resume(),
        }
    }

    /// Force a stop and join the clock thread. Idempotent.
    pub fn shutdown(&self) {
        let mut state = self.lock();
        self.clock.shutdown();
        state.running = false;
        self.publish(&state);
        info!("Metronome controller shut down");
    }

    /// Apply watcher events until the sender side closes
    pub async fn run_event_pump(self: Arc<Self>, mut rx: mpsc::UnboundedReceiver<WatcherEvent>) {
        while let Some(event) = rx.recv().await {
            let controller = Arc::clone(&self);
            if let Err(e) = tokio::task::spawn_blocking(move || controller.apply(event)).await {
                error!("Watcher event handler failed: {}", e);
            }
        }
        debug!("Watcher event channel closed");
    }

    fn start_locked(&self, state: &mut EngineState) -> bool {
        if state.running {
            return false;
        }
        state.running = self.clock.start(state.tempo);
        state.running
    }

    fn stop_locked(&self, state: &mut EngineState) -> bool {
        if !state.running {
            return false;
        }
        self.clock.stop();
        state.running = false;
        true
    }

    fn broadcast_running(&self, running: bool) {
        self.shared.broadcast_event(BeatsyncEvent::MetronomeStateChanged {
            running,
            timestamp: chrono::Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullPlayback;

    fn controller() -> MetronomeController {
        MetronomeController::new(
            Arc::new(NullPlayback),
            Tempo::DEFAULT,
            Arc::new(SharedState::new()),
        )
        .unwrap()
    }

    fn track(id: &str) -> TrackIdentity {
        TrackIdentity::new(id, "Song", "Artist")
    }

    #[test]
    fn test_initial_state() {
        let controller = controller();
        let snapshot = controller.snapshot();
        assert!(!snapshot.running);
        assert_eq!(snapshot.tempo.bpm(), 60);
        assert_eq!(snapshot.key, None);
        assert!(!snapshot.held);
    }

    #[test]
    fn test_rejected_tempo_leaves_state_alone() {
        let controller = controller();
        assert!(controller.on_manual_tempo_edit("abc").is_none());
        assert!(controller.on_manual_tempo_edit("0").is_none());
        assert!(controller.on_manual_tempo_edit("-5").is_none());
        assert_eq!(controller.snapshot().tempo.bpm(), 60);
    }

    #[test]
    fn test_manual_stop_holds_until_track_change() {
        let controller = controller();
        controller.on_manual_start();
        controller.on_manual_stop();
        assert!(controller.snapshot().held);

        controller.on_resume();
        assert!(!controller.is_running());

        let key = KeySignature::from_pitch_class(1).ok();
        controller.on_track_changed(track("b"), Tempo::new(90).unwrap(), key);
        let snapshot = controller.snapshot();
        assert!(snapshot.running);
        assert!(!snapshot.held);
        assert_eq!(snapshot.key_name.as_deref(), Some("C#"));

        controller.shutdown();
    }

    #[test]
    fn test_lookup_does_not_start() {
        let controller = controller();
        controller.apply_lookup(Tempo::new(140).unwrap(), None);
        let snapshot = controller.snapshot();
        assert_eq!(snapshot.tempo.bpm(), 140);
        assert!(!snapshot.running);
    }

    #[test]
    fn test_snapshot_channel_follows_state() {
        let controller = controller();
        let rx = controller.subscribe();
        controller.on_manual_start();
        assert!(rx.borrow().running);
        controller.shutdown();
        assert!(!rx.borrow().running);
    }
}
