//! Musical value types shared by the clock, the watcher and the API
//!
//! - [`Tempo`]: validated beats-per-minute value
//! - [`KeySignature`]: pitch class 0-11 with its canonical name
//! - [`TrackIdentity`]: opaque track id plus display strings

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Validated tempo in whole beats per minute.
///
/// A `Tempo` can only be built inside [`Tempo::MIN_BPM`]..=[`Tempo::MAX_BPM`],
/// so a clock holding one never runs at zero or negative bpm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Tempo(u32);

impl Tempo {
    /// Slowest accepted tempo
    pub const MIN_BPM: u32 = 20;

    /// Fastest accepted tempo
    pub const MAX_BPM: u32 = 400;

    /// Tempo used when nothing else is known
    pub const DEFAULT: Tempo = Tempo(60);

    /// Create a tempo, rejecting values outside the supported range
    pub fn new(bpm: u32) -> Result<Self> {
        if (Self::MIN_BPM..=Self::MAX_BPM).contains(&bpm) {
            Ok(Self(bpm))
        } else {
            Err(Error::InvalidInput(format!(
                "tempo {} bpm outside {}..={}",
                bpm,
                Self::MIN_BPM,
                Self::MAX_BPM
            )))
        }
    }

    /// Parse free-form user text ("75", " 120 ") into a tempo
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let bpm: u32 = trimmed
            .parse()
            .map_err(|_| Error::InvalidInput(format!("'{}' is not a whole number of bpm", trimmed)))?;
        Self::new(bpm)
    }

    /// Convert a continuous tempo reported by a music service.
    ///
    /// The value is rounded to the nearest integer and clamped into the
    /// supported range. Non-finite and non-positive values are rejected.
    pub fn from_reported(bpm: f64) -> Result<Self> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(Error::InvalidInput(format!("reported tempo {} is not usable", bpm)));
        }
        let rounded = bpm.round().clamp(Self::MIN_BPM as f64, Self::MAX_BPM as f64);
        Ok(Self(rounded as u32))
    }

    /// Beats per minute
    pub fn bpm(self) -> u32 {
        self.0
    }

    /// Time between two ticks: `60000 / bpm` milliseconds
    pub fn beat_interval(self) -> Duration {
        Duration::from_micros(60_000_000 / u64::from(self.0))
    }
}

impl Default for Tempo {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u32> for Tempo {
    type Error = Error;

    fn try_from(bpm: u32) -> Result<Self> {
        Self::new(bpm)
    }
}

impl From<Tempo> for u32 {
    fn from(tempo: Tempo) -> u32 {
        tempo.0
    }
}

impl fmt::Display for Tempo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} bpm", self.0)
    }
}

/// Canonical key names indexed by pitch class
pub const KEY_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Musical key as a pitch class (0 = C ... 11 = B)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct KeySignature(u8);

impl KeySignature {
    /// Build from a pitch class; anything outside 0..=11 is invalid input
    pub fn from_pitch_class(pitch_class: i32) -> Result<Self> {
        if (0..12).contains(&pitch_class) {
            Ok(Self(pitch_class as u8))
        } else {
            Err(Error::InvalidInput(format!(
                "pitch class {} outside 0..=11",
                pitch_class
            )))
        }
    }

    /// Pitch class 0-11
    pub fn pitch_class(self) -> u8 {
        self.0
    }

    /// Canonical name ("C", "C#", ... "B")
    pub fn name(self) -> &'static str {
        KEY_NAMES[self.0 as usize]
    }
}

impl TryFrom<u8> for KeySignature {
    type Error = Error;

    fn try_from(pitch_class: u8) -> Result<Self> {
        Self::from_pitch_class(i32::from(pitch_class))
    }
}

impl From<KeySignature> for u8 {
    fn from(key: KeySignature) -> u8 {
        key.0
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A track as reported by the now-playing source.
///
/// Only `id` takes part in change detection; name and artist are for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackIdentity {
    pub id: String,
    pub name: String,
    pub artist: String,
}

impl TrackIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>, artist: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            artist: artist.into(),
        }
    }

    /// True when both refer to the same recording
    pub fn same_track(&self, other: &TrackIdentity) -> bool {
        self.id == other.id
    }
}

impl fmt::Display for TrackIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} - {}", self.artist, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tempo_range() {
        assert!(Tempo::new(19).is_err());
        assert!(Tempo::new(0).is_err());
        assert_eq!(Tempo::new(20).unwrap().bpm(), 20);
        assert_eq!(Tempo::new(400).unwrap().bpm(), 400);
        assert!(Tempo::new(401).is_err());
    }

    #[test]
    fn test_tempo_parse() {
        assert_eq!(Tempo::parse("75").unwrap().bpm(), 75);
        assert_eq!(Tempo::parse("  120 ").unwrap().bpm(), 120);
        assert!(Tempo::parse("abc").is_err());
        assert!(Tempo::parse("").is_err());
        assert!(Tempo::parse("-5").is_err());
        assert!(Tempo::parse("12.5").is_err());
    }

    #[test]
    fn test_tempo_from_reported_rounds() {
        assert_eq!(Tempo::from_reported(119.6).unwrap().bpm(), 120);
        assert_eq!(Tempo::from_reported(89.4).unwrap().bpm(), 89);
        assert_eq!(Tempo::from_reported(12.0).unwrap().bpm(), Tempo::MIN_BPM);
        assert_eq!(Tempo::from_reported(999.0).unwrap().bpm(), Tempo::MAX_BPM);
        assert!(Tempo::from_reported(0.0).is_err());
        assert!(Tempo::from_reported(f64::NAN).is_err());
    }

    #[test]
    fn test_beat_interval() {
        assert_eq!(Tempo::new(60).unwrap().beat_interval(), Duration::from_millis(1000));
        assert_eq!(Tempo::new(120).unwrap().beat_interval(), Duration::from_millis(500));
        assert_eq!(Tempo::new(400).unwrap().beat_interval(), Duration::from_millis(150));
    }

    #[test]
    fn test_key_names() {
        assert_eq!(KeySignature::from_pitch_class(0).unwrap().name(), "C");
        assert_eq!(KeySignature::from_pitch_class(1).unwrap().name(), "C#");
        assert_eq!(KeySignature::from_pitch_class(3).unwrap().name(), "D#");
        assert_eq!(KeySignature::from_pitch_class(11).unwrap().name(), "B");
    }

    #[test]
    fn test_key_out_of_range_is_validation_error() {
        assert!(matches!(
            KeySignature::from_pitch_class(12),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            KeySignature::from_pitch_class(-1),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_serde_rejects_invalid_values() {
        let tempo: Tempo = serde_json::from_str("90").unwrap();
        assert_eq!(tempo.bpm(), 90);
        assert!(serde_json::from_str::<Tempo>("0").is_err());
        assert!(serde_json::from_str::<KeySignature>("12").is_err());
    }

    #[test]
    fn test_track_identity_compares_by_id() {
        let a = TrackIdentity::new("abc", "Song", "Artist");
        let renamed = TrackIdentity::new("abc", "Song (Remastered)", "Artist");
        let b = TrackIdentity::new("def", "Song", "Artist");
        assert!(a.same_track(&renamed));
        assert!(!a.same_track(&b));
    }
}
