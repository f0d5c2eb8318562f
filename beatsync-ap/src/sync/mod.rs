//! Music service synchronisation
//!
//! - `provider`: capability traits and the swappable session slot
//! - `spotify`: Spotify Web API implementation
//! - `watcher`: turns now-playing samples into watcher events
//! - `scheduler`: runs the watcher on a fixed period

pub mod provider;
pub mod scheduler;
pub mod spotify;
pub mod watcher;

pub use provider::{
    AudioFeatures, AudioFeaturesProvider, MusicService, NowPlaying, NowPlayingProvider,
    ProviderSlot,
};
pub use scheduler::PollScheduler;
pub use spotify::{SpotifyClient, SpotifySettings};
pub use watcher::{derive_tempo_and_key, TrackWatcher, WatcherStats};
