//! Fixed-period poll task
//!
//! Runs `TrackWatcher::poll` on a tokio interval. Missed ticks are skipped so
//! a slow request never causes a burst of catch-up polls. Cancellation is
//! honoured both between polls and during an in-flight request.

use crate::sync::watcher::TrackWatcher;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

pub struct PollScheduler {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl PollScheduler {
    /// Spawn the poll task. It owns the watcher until stopped.
    pub fn spawn(mut watcher: TrackWatcher, period: Duration, cancel: CancellationToken) -> Self {
        info!("Starting track watcher (poll interval: {}ms)", period.as_millis());

        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = timer.tick() => {}
                }

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = watcher.poll() => {}
                }
            }

            info!("Track watcher stopped");
        });

        Self { cancel, handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    /// Cancel the task and wait for it to exit
    pub async fn stop(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            error!("Poll task failed: {}", e);
        }
    }
}
