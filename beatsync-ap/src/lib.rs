//! # beatsync Audio Player Library (beatsync-ap)
//!
//! Metronome engine that can follow the tempo of the track playing on a
//! music service.
//!
//! **Purpose:** Tick at a configurable tempo, poll the music service for the
//! current track, retune on track changes, and expose HTTP/SSE control.
//!
//! **Architecture:** a dedicated clock thread (`metronome::BeatClock`) drives a
//! cpal tick output; a tokio poll task (`sync::PollScheduler`) feeds watcher
//! events to the single-owner `metronome::MetronomeController`.

pub mod api;
pub mod audio;
pub mod error;
pub mod metronome;
pub mod state;
pub mod sync;

pub use error::{Error, PlaybackError, ProviderError, Result};
pub use state::SharedState;
