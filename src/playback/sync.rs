//! Clocks that drive catch-up playback, and the anchor relating wall time
//! to media time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Monotonic time source for the playback engine
pub trait Clock: Send {
    /// Time elapsed since the clock's origin
    fn now(&self) -> Duration;

    /// Block until `deadline` has passed
    fn sleep_until(&self, deadline: Duration);
}

/// Wall clock based on `Instant`
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }

    fn sleep_until(&self, deadline: Duration) {
        let now = self.now();
        if deadline > now {
            std::thread::sleep(deadline - now);
        }
    }
}

/// Simulated clock. Clones share the same time; sleeping jumps ahead.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    nanos: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, to: Duration) {
        self.nanos.store(to.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }

    fn sleep_until(&self, deadline: Duration) {
        self.nanos.fetch_max(deadline.as_nanos() as u64, Ordering::SeqCst);
    }
}

/// Where playback started: recomputed on every play and rate change
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackAnchor {
    /// Clock time when playback started
    pub system_start: Duration,
    /// Media time of the frame playback started at, in milliseconds
    pub frame_time_ms: f64,
    pub rate: f64,
}

impl PlaybackAnchor {
    pub fn new(system_start: Duration, frame_time_ms: f64, rate: f64) -> Self {
        Self { system_start, frame_time_ms, rate }
    }

    /// Media time that should be showing at clock time `now`
    pub fn target_time(&self, now: Duration) -> f64 {
        let elapsed_ms = now.saturating_sub(self.system_start).as_secs_f64() * 1000.0;
        self.frame_time_ms + self.rate * elapsed_ms
    }

    /// Clock time at which media time `ms` is reached
    pub fn system_time_for(&self, ms: f64) -> Duration {
        let wait_ms = ((ms - self.frame_time_ms) / self.rate).max(0.0);
        self.system_start + Duration::from_secs_f64(wait_ms / 1000.0)
    }
}
