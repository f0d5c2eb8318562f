//! Tick sinks for clock tests
//!
//! Record when ticks happen instead of making noise.

use beatsync_ap::audio::SoundPlayback;
use beatsync_ap::PlaybackError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Counts ticks and remembers when each one happened
pub struct CountingSound {
    ticks: AtomicU64,
    times: Mutex<Vec<Instant>>,
}

impl CountingSound {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            ticks: AtomicU64::new(0),
            times: Mutex::new(Vec::new()),
        })
    }

    pub fn count(&self) -> u64 {
        self.ticks.load(Ordering::SeqCst)
    }

    pub fn times(&self) -> Vec<Instant> {
        self.times.lock().unwrap().clone()
    }

    /// Gaps between consecutive ticks
    pub fn intervals(&self) -> Vec<Duration> {
        self.times()
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .collect()
    }

    pub fn last_tick(&self) -> Option<Instant> {
        self.times.lock().unwrap().last().copied()
    }
}

impl SoundPlayback for CountingSound {
    fn play(&self) -> Result<(), PlaybackError> {
        self.times.lock().unwrap().push(Instant::now());
        self.ticks.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Fails every tick, optionally only the first `fail_first` ones
pub struct FailingSound {
    attempts: AtomicU64,
    fail_first: u64,
}

impl FailingSound {
    pub fn always() -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU64::new(0),
            fail_first: u64::MAX,
        })
    }

    pub fn first(n: u64) -> Arc<Self> {
        Arc::new(Self {
            attempts: AtomicU64::new(0),
            fail_first: n,
        })
    }

    pub fn attempts(&self) -> u64 {
        self.attempts.load(Ordering::SeqCst)
    }
}

impl SoundPlayback for FailingSound {
    fn play(&self) -> Result<(), PlaybackError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            Err(PlaybackError::Busy)
        } else {
            Ok(())
        }
    }
}
