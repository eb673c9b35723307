//! # keel-clock
//!
//! Injectable clock abstraction for the scheduler.
//!
//! Components that reason about deadlines take a [`Clock`] instead of
//! calling `Instant::now()` directly, so tests can drive time explicitly.
//! Two implementations are provided:
//!
//! - [`SystemClock`]: delegates to the tokio clock, which means tests that
//!   run under a paused runtime observe the mocked timeline.
//! - [`ManualClock`]: an instant that only moves when told to, for
//!   synchronous unit tests with no runtime at all.

use std::fmt::Debug;
use std::sync::Mutex;
use std::time::Duration;

pub use tokio::time::Instant;

/// A source of the current time.
pub trait Clock: Send + Sync + Debug {
    /// Returns the current instant.
    fn now(&self) -> Instant;
}

impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }
}

/// The real clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// A clock that advances only when explicitly told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Creates a manual clock anchored at the current instant.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Moves the clock forward by `step`.
    pub fn advance(&self, step: Duration) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now += step;
    }

    /// Pins the clock to `instant`.
    pub fn set(&self, instant: Instant) {
        let mut now = self.now.lock().expect("clock mutex poisoned");
        *now = instant;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("clock mutex poisoned")
    }
}
