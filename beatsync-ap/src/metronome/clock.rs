//! Beat clock
//!
//! One persistent worker thread per clock, created at construction and parked
//! on a condition variable while stopped. `start`/`stop` flip the requested
//! state and wake the worker; `stop` then blocks until the worker confirms it
//! has left the running loop, so no tick fires after `stop` returns.
//!
//! The tempo lives in an atomic and is read once at the start of each beat.
//! Beat deadlines are accumulated from the previous deadline, not from the
//! end of the previous tick, so the clock does not drift.

use crate::audio::SoundPlayback;
use crate::error::Result;
use beatsync_common::Tempo;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Request {
    Run,
    Stop,
    Shutdown,
}

#[derive(Debug)]
struct ClockControl {
    requested: Request,
    /// True while the worker is inside the running loop
    active: bool,
}

struct ClockShared {
    control: Mutex<ClockControl>,
    wake: Condvar,
    bpm: AtomicU32,
    beats: AtomicU64,
}

impl ClockShared {
    fn lock(&self) -> MutexGuard<'_, ClockControl> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn tempo(&self) -> Tempo {
        Tempo::try_from(self.bpm.load(Ordering::Acquire)).unwrap_or_default()
    }
}

/// Periodic tick driver
pub struct BeatClock {
    shared: Arc<ClockShared>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl BeatClock {
    /// Create a stopped clock and its worker thread
    pub fn new(sound: Arc<dyn SoundPlayback>, initial: Tempo) -> Result<Self> {
        let shared = Arc::new(ClockShared {
            control: Mutex::new(ClockControl {
                requested: Request::Stop,
                active: false,
            }),
            wake: Condvar::new(),
            bpm: AtomicU32::new(initial.bpm()),
            beats: AtomicU64::new(0),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("beat-clock".to_string())
            .spawn(move || run_worker(worker_shared, sound))?;

        debug!("Beat clock created at {}", initial);
        Ok(Self {
            shared,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Start ticking at `tempo`.
    ///
    /// No-op when already running (the tempo is still stored). Returns true
    /// when the clock was actually started.
    pub fn start(&self, tempo: Tempo) -> bool {
        self.shared.bpm.store(tempo.bpm(), Ordering::Release);

        let mut control = self.shared.lock();
        match control.requested {
            Request::Run => false,
            Request::Shutdown => {
                warn!("Ignoring start on a beat clock that has been shut down");
                false
            }
            Request::Stop => {
                control.requested = Request::Run;
                self.shared.wake.notify_all();
                info!("Beat clock started at {}", tempo);
                true
            }
        }
    }

    /// Stop ticking and wait for the worker to leave its running loop.
    ///
    /// Returns true when the clock was running.
    pub fn stop(&self) -> bool {
        let mut control = self.shared.lock();
        let was_running = control.requested == Request::Run;
        if was_running {
            control.requested = Request::Stop;
            self.shared.wake.notify_all();
        }

        // Also covers a stop racing with another caller's stop
        while control.active && control.requested == Request::Stop {
            control = self
                .shared
                .wake
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }

        if was_running {
            info!(
                "Beat clock stopped after {} beats",
                self.shared.beats.load(Ordering::Relaxed)
            );
        }
        was_running
    }

    /// Change the tempo; a running clock picks it up at the next beat
    pub fn retune(&self, tempo: Tempo) {
        let previous = self.shared.bpm.swap(tempo.bpm(), Ordering::AcqRel);
        if previous != tempo.bpm() {
            debug!("Beat clock retuned {} -> {}", previous, tempo.bpm());
        }
    }

    pub fn is_running(&self) -> bool {
        self.shared.lock().requested == Request::Run
    }

    /// Tempo the next beat will use
    pub fn tempo(&self) -> Tempo {
        self.shared.tempo()
    }

    /// Ticks fired since the clock was created
    pub fn beats(&self) -> u64 {
        self.shared.beats.load(Ordering::Relaxed)
    }

    /// Stop for good and join the worker thread. Idempotent.
    pub fn shutdown(&self) {
        {
            let mut control = self.shared.lock();
            control.requested = Request::Shutdown;
            self.shared.wake.notify_all();
        }

        let handle = self
            .worker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Beat clock worker panicked");
            } else {
                debug!("Beat clock worker joined");
            }
        }
    }
}

impl Drop for BeatClock {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_worker(shared: Arc<ClockShared>, sound: Arc<dyn SoundPlayback>) {
    let mut missed: u64 = 0;
    let mut control = shared.lock();

    loop {
        while control.requested == Request::Stop {
            control = shared
                .wake
                .wait(control)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if control.requested == Request::Shutdown {
            break;
        }

        control.active = true;
        let mut next_beat = Instant::now();

        loop {
            // Sleep until the beat, waking early for stop/shutdown
            while control.requested == Request::Run {
                let now = Instant::now();
                if now >= next_beat {
                    break;
                }
                control = shared
                    .wake
                    .wait_timeout(control, next_beat - now)
                    .unwrap_or_else(PoisonError::into_inner)
                    .0;
            }
            if control.requested != Request::Run {
                break;
            }

            let interval = shared.tempo().beat_interval();
            drop(control);

            match sound.play() {
                Ok(()) => {
                    if missed > 0 {
                        info!("Tick playback recovered after {} missed ticks", missed);
                        missed = 0;
                    }
                }
                Err(e) => {
                    missed += 1;
                    if missed == 1 {
                        warn!("Tick skipped: {}", e);
                    } else {
                        debug!("Tick skipped ({} in a row): {}", missed, e);
                    }
                }
            }
            shared.beats.fetch_add(1, Ordering::Relaxed);

            control = shared.lock();
            next_beat += interval;
            let now = Instant::now();
            if next_beat < now {
                // Fell more than a beat behind; don't burst to catch up
                next_beat = now;
            }
        }

        control.active = false;
        shared.wake.notify_all();
    }

    control.active = false;
    shared.wake.notify_all();
    debug!("Beat clock worker exiting");
}
