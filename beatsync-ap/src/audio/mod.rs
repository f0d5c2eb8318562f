//! Tick sound generation and output
//!
//! - `tick`: load or synthesize the click sample
//! - `resampler`: match the sample to the device rate
//! - `output`: cpal device thread that plays the click on demand

pub mod output;
pub mod resampler;
pub mod tick;

pub use output::TickOutput;
pub use tick::TickSample;

use crate::error::PlaybackError;

/// Something that can make one audible tick.
///
/// Called from the clock thread once per beat. Implementations must return
/// quickly; an error skips this tick only.
pub trait SoundPlayback: Send + Sync {
    fn play(&self) -> Result<(), PlaybackError>;
}

/// Silent sink, used when running without an audio device
#[derive(Debug, Default)]
pub struct NullPlayback;

impl SoundPlayback for NullPlayback {
    fn play(&self) -> Result<(), PlaybackError> {
        Ok(())
    }
}
