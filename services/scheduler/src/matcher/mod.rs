//! Offer matching: the matcher contract and the manager that drives it.
//!
//! A matcher is a per-application decision module: given an offer and a
//! deadline, it proposes zero or more task placements. The
//! [`manager::OfferMatcherManager`] owns the fan-out of each incoming offer
//! over the current matcher set.

pub mod manager;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keel_clock::Instant;
use keel_id::AppId;
use keel_offers::{Offer, OfferId, Resource};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable matcher identity, supplied by the matcher itself.
///
/// Membership in the manager's matcher set is keyed on this value, not on
/// object identity; a matcher that reconnects under the same ID replaces
/// its previous registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatcherId(String);

impl MatcherId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MatcherId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for MatcherId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// A prospective task description.
#[derive(Debug, Clone)]
pub struct TaskInfo {
    /// Task name for logging.
    pub name: String,

    /// The application this task belongs to.
    pub app_id: AppId,

    /// Resources the task would consume from the offer.
    pub resources: Vec<Resource>,
}

/// One-shot commit/reject capability attached to each placement.
///
/// The manager calls [`TaskSource::reject`] at most once, when it declines
/// a placement (token or cap exhaustion). Placements the manager commits
/// are confirmed downstream by the launch pipeline, outside this module.
pub trait TaskSource: Send + Sync {
    /// Declines the placement. Must tolerate being the only call ever made.
    fn reject(&self);
}

/// A placement: a task plus its commit/reject capability.
#[derive(Clone)]
pub struct TaskWithSource {
    pub task: TaskInfo,
    pub source: Arc<dyn TaskSource>,
}

impl TaskWithSource {
    pub fn new(task: TaskInfo, source: Arc<dyn TaskSource>) -> Self {
        Self { task, source }
    }
}

impl fmt::Debug for TaskWithSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskWithSource")
            .field("task", &self.task)
            .finish_non_exhaustive()
    }
}

/// Reply to a single offer: the offer it answers plus the placements.
#[derive(Debug)]
pub struct MatchedTasks {
    pub offer_id: OfferId,
    pub tasks: Vec<TaskWithSource>,
}

impl MatchedTasks {
    /// An empty reply for `offer_id`.
    pub fn none(offer_id: OfferId) -> Self {
        Self {
            offer_id,
            tasks: Vec::new(),
        }
    }
}

/// Errors a matcher can produce.
///
/// The manager maps every matcher error to an empty reply; these variants
/// exist so matchers can log something meaningful.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("matcher unavailable: {0}")]
    Unavailable(String),

    #[error("matcher failed: {0}")]
    Failed(String),
}

/// A per-application decision module consulted for each offer.
#[async_trait]
pub trait OfferMatcher: Send + Sync {
    /// Stable identifier used for set membership.
    fn id(&self) -> MatcherId;

    /// Proposes placements for `offer`, replying before `deadline`.
    ///
    /// Contract: the manager applies no per-matcher timeout beyond the
    /// offer-wide deadline. A reply arriving after the offer is finished is
    /// dropped without its placements being rejected; a matcher that sees
    /// no commit for a proposed placement owns rejecting it itself.
    async fn match_offer(&self, deadline: Instant, offer: Offer)
        -> Result<MatchedTasks, MatchError>;
}
