//! Typed ID definitions for scheduler resources.

use crate::define_id;

// Applications are the unit the rate limiter and matchers key on.
define_id!(AppId, "app");

// Request IDs are minted per API request for tracing.
define_id!(RequestId, "req");
