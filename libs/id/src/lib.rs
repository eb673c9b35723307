//! # keel-id
//!
//! Typed, prefixed identifiers for the scheduler.
//!
//! Every internally minted ID uses the format `{prefix}_{ulid}`, e.g.
//! `app_01HV4Z3MXNKPQR9HSTZ7WCLD4E`. The prefix makes IDs self-describing
//! in logs, the ULID makes them time-ordered and unique, and the newtype
//! wrapper keeps different resource kinds from being mixed up.
//!
//! Identifiers minted by external systems (offer IDs from the cluster
//! resource manager, matcher names) are opaque strings and live with their
//! owning modules, not here.

mod error;
mod macros;
mod types;

pub use error::IdError;
pub use types::*;

/// Re-export ulid for consumers that need raw ULID operations
pub use ulid::Ulid;
