//! Per-application launch backoff tracking.
//!
//! After a failed launch attempt, re-launches for the same application
//! version are postponed with exponentially growing delays up to a
//! configured ceiling. The tracker is synchronous and owned by its sole
//! caller; it is not shared across tasks.

use std::collections::HashMap;
use std::time::Duration;

use keel_clock::{Clock, Instant};
use keel_id::AppId;
use tracing::debug;

/// The launch parameters of one application version.
#[derive(Debug, Clone)]
pub struct LaunchSpec {
    pub app_id: AppId,

    /// Configuration version; delays are tracked per (app, version).
    pub version: String,

    /// Initial delay after the first failure.
    pub backoff: Duration,

    /// Multiplier applied on each subsequent failure. Values below 1.0
    /// shrink the delay and eventually clear the entry.
    pub backoff_factor: f64,

    /// Ceiling for the grown delay.
    pub max_launch_delay: Duration,
}

#[derive(Debug, Clone, Copy)]
struct Delay {
    deadline: Instant,
    duration: Duration,
}

/// Tracks the earliest next launch attempt per (app, version).
#[derive(Debug)]
pub struct LaunchRateLimiter<C: Clock> {
    clock: C,
    delays: HashMap<(AppId, String), Delay>,
}

impl<C: Clock> LaunchRateLimiter<C> {
    pub fn new(clock: C) -> Self {
        Self {
            clock,
            delays: HashMap::new(),
        }
    }

    /// Returns the earliest instant a launch may be attempted, or now when
    /// no delay is active.
    pub fn get_delay(&self, spec: &LaunchSpec) -> Instant {
        self.delays
            .get(&key(spec))
            .map(|delay| delay.deadline)
            .unwrap_or_else(|| self.clock.now())
    }

    /// Extends the delay after a failed attempt and returns the new
    /// deadline.
    ///
    /// The first failure installs `spec.backoff`; each further failure
    /// multiplies the stored duration by `spec.backoff_factor`, capped at
    /// `spec.max_launch_delay`. A recomputed delay that does not reach into
    /// the future clears the entry instead.
    pub fn add_delay(&mut self, spec: &LaunchSpec) -> Instant {
        let now = self.clock.now();
        let duration = match self.delays.get(&key(spec)) {
            None => spec.backoff,
            Some(current) => grow(current.duration, spec.backoff_factor, spec.max_launch_delay),
        };

        if duration.is_zero() {
            self.delays.remove(&key(spec));
            return now;
        }

        let deadline = now + duration;
        debug!(
            app_id = %spec.app_id,
            version = %spec.version,
            delay_ms = duration.as_millis(),
            "Increased launch delay"
        );
        self.delays.insert(key(spec), Delay { deadline, duration });
        deadline
    }

    /// Clears any delay for the (app, version).
    pub fn reset_delay(&mut self, spec: &LaunchSpec) {
        if self.delays.remove(&key(spec)).is_some() {
            debug!(app_id = %spec.app_id, version = %spec.version, "Reset launch delay");
        }
    }

    /// Number of active entries, pruning expired ones first.
    pub fn active_delays(&mut self) -> usize {
        let now = self.clock.now();
        self.delays.retain(|_, delay| delay.deadline > now);
        self.delays.len()
    }
}

fn key(spec: &LaunchSpec) -> (AppId, String) {
    (spec.app_id, spec.version.clone())
}

/// Grows `current` by `factor` with nanosecond precision, capping overflow
/// and the result at `max`.
fn grow(current: Duration, factor: f64, max: Duration) -> Duration {
    let nanos = current.as_nanos() as f64 * factor;
    if !nanos.is_finite() || nanos >= max.as_nanos() as f64 {
        max
    } else {
        Duration::from_nanos(nanos as u64)
    }
}
