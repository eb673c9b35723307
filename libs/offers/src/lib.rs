//! # keel-offers
//!
//! The resource-offer data model shared by the scheduler and its matchers.
//!
//! An [`Offer`] is an opaque ID plus a bundle of [`Resource`]s published by
//! the external cluster resource manager. The scheduler never interprets
//! resource names; the only operation it needs is shape-wise subtraction,
//! which this crate implements for all three value shapes (scalar, ranges,
//! set).

mod offer;
mod resource;

pub use offer::{Offer, OfferId};
pub use resource::{Resource, ResourceValue, ValueRange, SCALAR_EPSILON};
