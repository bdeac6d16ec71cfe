//! Cooperative stopping and pacing for long-running embedding jobs.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Notify;
use tokio::time::{sleep, Duration};

#[derive(Debug, Default)]
struct StopState {
    stopped: AtomicBool,
    notify: Notify,
}

/// A shared flag asking a pipeline run to stop after its current batch.
///
/// Clones share the same flag. Stopping is one-way.
#[derive(Debug, Clone, Default)]
pub struct StopSignal {
    state: Arc<StopState>,
}

impl StopSignal {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop and wake anyone waiting in [`stopped`](Self::stopped).
    pub fn stop(&self) {
        self.state.stopped.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.state.stopped.load(Ordering::SeqCst)
    }

    /// Resolves once [`stop`](Self::stop) has been called.
    pub async fn stopped(&self) {
        loop {
            let notified = self.state.notify.notified();
            if self.is_stopped() {
                return;
            }
            notified.await;
        }
    }
}

/// Sleeps for a fixed interval between provider calls, cutting the wait
/// short when a stop is requested.
#[derive(Debug, Clone, Copy)]
pub struct Pacer {
    interval: Duration,
}

impl Pacer {
    #[must_use]
    pub const fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Wait for the interval. Returns `false` if the wait was interrupted
    /// by `stop`.
    pub async fn pause(&self, stop: &StopSignal) -> bool {
        if self.interval.is_zero() {
            return !stop.is_stopped();
        }
        tokio::select! {
            () = sleep(self.interval) => !stop.is_stopped(),
            () = stop.stopped() => false,
        }
    }
}
