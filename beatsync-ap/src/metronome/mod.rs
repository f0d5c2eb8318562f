//! Metronome engine
//!
//! - `clock`: the tick thread (start/stop/retune)
//! - `controller`: single owner of engine state, applies manual and watcher changes
//! - `events`: watcher → controller messages

pub mod clock;
pub mod controller;
pub mod events;

pub use clock::BeatClock;
pub use controller::{EngineSnapshot, MetronomeController};
pub use events::WatcherEvent;
