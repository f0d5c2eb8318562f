//! # beatsync Common Library
//!
//! Shared code for the beatsync metronome:
//! - Musical value types (tempo, key signature, track identity)
//! - Event types (BeatsyncEvent enum)
//! - Configuration loading
//! - Credential persistence for the music service

pub mod config;
pub mod credentials;
pub mod error;
pub mod events;
pub mod music;

pub use error::{Error, Result};
pub use music::{KeySignature, Tempo, TrackIdentity};
