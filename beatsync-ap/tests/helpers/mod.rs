//! Test helper modules for beatsync integration tests
//!
//! - sound_capture: fake tick sinks that count or fail
//! - scripted_provider: a music service that replays a fixed script

#![allow(dead_code)]

pub mod scripted_provider;
pub mod sound_capture;

pub use scripted_provider::{ScriptedProvider, Step};
pub use sound_capture::{CountingSound, FailingSound};
