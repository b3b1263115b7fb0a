//! Relax/wait capability for driving loops.
//!
//! A driving loop that finds nothing to do calls [`Relax::relax`] instead of
//! spinning. Implementations block for a short while (sleep, wait for a
//! window event, park on a condition).

use std::time::Duration;

/// Blocks the calling thread briefly when no progress is possible.
pub trait Relax: Send + Sync {
    /// Yields the current thread for a short, implementation-defined time.
    fn relax(&self);
}

/// Relax implementation that sleeps for a fixed interval.
#[derive(Debug, Clone, Copy)]
pub struct SleepRelax {
    interval: Duration,
}

impl SleepRelax {
    /// Default sleep interval.
    pub const DEFAULT_INTERVAL: Duration = Duration::from_micros(250);

    /// Creates a relax primitive sleeping for `interval`.
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Returns the sleep interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }
}

impl Default for SleepRelax {
    fn default() -> Self {
        Self::new(Self::DEFAULT_INTERVAL)
    }
}

impl Relax for SleepRelax {
    fn relax(&self) {
        std::thread::sleep(self.interval);
    }
}

impl<F: Fn() + Send + Sync> Relax for F {
    fn relax(&self) {
        self()
    }
}
