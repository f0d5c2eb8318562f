//! Internal watcher events (not exposed via SSE)
//!
//! The track watcher reports what it observed on the music service; the
//! controller decides what that means for the engine. These events are
//! converted to `beatsync_common::events::BeatsyncEvent` before broadcasting.

use beatsync_common::{KeySignature, Tempo, TrackIdentity};

/// Watcher → controller events
///
/// **Design Note:** the watcher never touches engine state. It only sends
/// these one-way messages; the controller is the single writer.
#[derive(Debug, Clone, PartialEq)]
pub enum WatcherEvent {
    /// A different track started playing
    ///
    /// # Fields
    /// * `track` - Identity of the new track
    /// * `tempo` - Rounded tempo from the audio features lookup
    /// * `key` - Key signature, None when the service does not know it
    TrackChanged {
        track: TrackIdentity,
        tempo: Tempo,
        key: Option<KeySignature>,
    },

    /// Nothing is playing any more
    Stopped,

    /// The same track is still playing but the engine is stopped
    ///
    /// Restart at the known tempo without another features lookup.
    Resume,
}

impl WatcherEvent {
    /// Short name for logging
    pub fn name(&self) -> &'static str {
        match self {
            WatcherEvent::TrackChanged { .. } => "TrackChanged",
            WatcherEvent::Stopped => "Stopped",
            WatcherEvent::Resume => "Resume",
        }
    }
}
