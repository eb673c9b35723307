//! keel Scheduler Library
//!
//! The scheduler is the offer-matching core of the platform. It consumes
//! resource offers from the external cluster resource manager, fans each
//! offer out over the registered per-application matchers, and returns the
//! aggregated task placements to the offer source.
//!
//! ## Architecture
//!
//! All matching state is owned by a single actor:
//!
//! ```text
//! OfferMatcherManager
//! ├── launch token counter          (global permission to start tasks)
//! ├── matcher set                   (per-application decision modules)
//! └── OfferData(offer id)           (per-offer fan-out state)
//! ```
//!
//! Around it sit the launch rate limiter (per-application backoff,
//! consulted by the launch pipeline) and the admission-gated management
//! API.
//!
//! ## Modules
//!
//! - `actors`: single-consumer mailbox actor runtime
//! - `matcher`: the matcher contract and the manager actor
//! - `launch`: per-application launch backoff tracking
//! - `api`: axum routes, admission gate, health probes

pub mod actors;
pub mod api;
pub mod config;
pub mod launch;
pub mod matcher;
pub mod state;

// Re-export commonly used types
pub use config::Config;
pub use launch::{LaunchRateLimiter, LaunchSpec};
pub use matcher::manager::{ManagerConfig, ManagerHandle, ManagerStatus, OfferMatcherManager};
pub use matcher::{MatchError, MatchedTasks, MatcherId, OfferMatcher, TaskInfo, TaskSource, TaskWithSource};
