//! Event types for the beatsync event stream
//!
//! These are the externally visible events (SSE). Internal watcher → controller
//! messages live in `beatsync_ap::metronome::events`.

use serde::{Deserialize, Serialize};

/// What caused a tempo change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TempoSource {
    /// Typed in by the user
    Manual,
    /// Derived from a newly detected track
    Track,
    /// One-shot features lookup for a given track id
    Lookup,
}

/// beatsync event types
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BeatsyncEvent {
    /// Metronome started or stopped
    MetronomeStateChanged {
        running: bool,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// Active tempo changed
    TempoChanged {
        bpm: u32,
        source: TempoSource,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new track was detected on the music service
    TrackChanged {
        track_id: String,
        name: String,
        artist: String,
        bpm: u32,
        /// Key name ("C#"), None when unknown
        key: Option<String>,
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// The music service reports nothing playing
    TrackStopped {
        timestamp: chrono::DateTime<chrono::Utc>,
    },

    /// A new music service session was installed
    SyncAuthorized {
        timestamp: chrono::DateTime<chrono::Utc>,
    },
}

impl BeatsyncEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            BeatsyncEvent::MetronomeStateChanged { .. } => "MetronomeStateChanged",
            BeatsyncEvent::TempoChanged { .. } => "TempoChanged",
            BeatsyncEvent::TrackChanged { .. } => "TrackChanged",
            BeatsyncEvent::TrackStopped { .. } => "TrackStopped",
            BeatsyncEvent::SyncAuthorized { .. } => "SyncAuthorized",
        }
    }
}
