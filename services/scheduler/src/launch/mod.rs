//! Launch scheduling concerns: the per-application backoff tracker.

mod rate_limiter;

pub use rate_limiter::{LaunchRateLimiter, LaunchSpec};
