//! The offer matcher manager.
//!
//! One actor owns the whole offer-matching state: the launch token counter,
//! the matcher set, and the per-offer fan-out queues. For each accepted
//! offer it consults matchers one at a time in a shuffled rotation,
//! accumulating placements until the deadline, the per-offer task cap, the
//! token budget, or the matcher queue runs out, whichever comes first.
//!
//! Matcher queries and the deadline timer are fire-and-forget tasks that
//! deliver their outcome back to the mailbox as `MatchedTasks` messages, so
//! the actor never blocks inside a handler.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use keel_clock::{Clock, Instant};
use keel_offers::{Offer, OfferId};
use rand::seq::SliceRandom;
use serde::Serialize;
use tokio::sync::{oneshot, watch};
use tracing::{debug, info, warn};

use crate::actors::{self, Actor, ActorContext, ActorError, ActorHandle, ActorRef};
use crate::matcher::{MatchedTasks, MatcherId, OfferMatcher, TaskWithSource};

/// Manager configuration.
#[derive(Debug, Clone)]
pub struct ManagerConfig {
    /// Hard cap on placements per offer.
    pub max_tasks_per_offer: usize,

    /// Mailbox capacity.
    pub mailbox_size: usize,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            max_tasks_per_offer: 100,
            mailbox_size: 1024,
        }
    }
}

/// Messages handled by the manager.
pub enum ManagerMessage {
    /// Replace the launch token counter.
    SetLaunchTokens(u64),

    /// Adjust the launch token counter; saturates at zero.
    AddLaunchTokens(i64),

    /// Add a matcher, or replace the registration with the same ID.
    AddMatcher {
        matcher: Arc<dyn OfferMatcher>,
        ack: oneshot::Sender<MatcherId>,
    },

    /// Remove a matcher from future rotations.
    RemoveMatcher {
        id: MatcherId,
        ack: oneshot::Sender<MatcherId>,
    },

    /// Ask for placements on an offer; exactly one reply is sent.
    MatchOffer {
        deadline: Instant,
        offer: Offer,
        reply: oneshot::Sender<MatchedTasks>,
    },

    /// A matcher reply or the deadline timeout for an in-flight offer.
    MatchedTasks(MatchedTasks),

    /// Introspection snapshot.
    GetStatus(oneshot::Sender<ManagerStatus>),
}

impl fmt::Debug for ManagerMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SetLaunchTokens(n) => write!(f, "SetLaunchTokens({n})"),
            Self::AddLaunchTokens(n) => write!(f, "AddLaunchTokens({n})"),
            Self::AddMatcher { matcher, .. } => write!(f, "AddMatcher({})", matcher.id()),
            Self::RemoveMatcher { id, .. } => write!(f, "RemoveMatcher({id})"),
            Self::MatchOffer { offer, .. } => write!(f, "MatchOffer({})", offer.id),
            Self::MatchedTasks(reply) => {
                write!(f, "MatchedTasks({}, {} tasks)", reply.offer_id, reply.tasks.len())
            }
            Self::GetStatus(_) => write!(f, "GetStatus"),
        }
    }
}

/// Snapshot of the manager's counters.
#[derive(Debug, Clone, Serialize)]
pub struct ManagerStatus {
    pub launch_tokens: u64,
    pub matcher_count: usize,
    pub offers_in_flight: usize,
    pub offers_wanted: bool,
}

/// Per-offer fan-out state.
struct OfferData {
    offer: Offer,
    deadline: Instant,
    reply: oneshot::Sender<MatchedTasks>,
    matcher_queue: VecDeque<Arc<dyn OfferMatcher>>,
    tasks: Vec<TaskWithSource>,
    in_flight: Option<Arc<dyn OfferMatcher>>,
}

/// The manager actor. Construct with [`OfferMatcherManager::spawn`].
pub struct OfferMatcherManager {
    clock: Arc<dyn Clock>,
    max_tasks_per_offer: usize,
    launch_tokens: u64,
    matchers: Vec<(MatcherId, Arc<dyn OfferMatcher>)>,
    offers: HashMap<OfferId, OfferData>,
    offers_wanted_tx: watch::Sender<bool>,
    self_handle: ActorHandle<ManagerMessage>,
}

impl OfferMatcherManager {
    /// Spawns the manager actor and returns its public handle.
    pub fn spawn(config: ManagerConfig, clock: Arc<dyn Clock>) -> (ManagerHandle, ActorRef) {
        let (handle, rx) = actors::mailbox::<ManagerMessage>(
            "offer_matcher_manager",
            config.mailbox_size,
        );
        let (offers_wanted_tx, offers_wanted_rx) = watch::channel(false);

        let actor = Self {
            clock,
            max_tasks_per_offer: config.max_tasks_per_offer,
            launch_tokens: 0,
            matchers: Vec::new(),
            offers: HashMap::new(),
            offers_wanted_tx,
            self_handle: handle.clone(),
        };

        let actor_ref = actors::spawn(actor, rx, handle.actor_id().to_string());

        (
            ManagerHandle {
                handle,
                offers_wanted: offers_wanted_rx,
            },
            actor_ref,
        )
    }

    /// Offers are wanted iff at least one matcher is registered and launch
    /// tokens remain.
    fn wants_offers(&self) -> bool {
        !self.matchers.is_empty() && self.launch_tokens > 0
    }

    fn update_offers_wanted(&self) {
        let wanted = self.wants_offers();
        let previous = self.offers_wanted_tx.send_replace(wanted);
        if previous != wanted {
            debug!(wanted, "Offers-wanted signal changed");
        }
    }

    fn add_matcher(&mut self, matcher: Arc<dyn OfferMatcher>, ack: oneshot::Sender<MatcherId>) {
        let id = matcher.id();

        if let Some(pos) = self.matchers.iter().position(|(known, _)| *known == id) {
            self.matchers[pos].1 = matcher;
            debug!(matcher_id = %id, "Updated matcher registration");
        } else {
            info!(matcher_id = %id, "Added matcher");
            // A new matcher joins the ongoing round of every in-flight
            // offer so it can be consulted if capacity remains.
            for data in self.offers.values_mut() {
                data.matcher_queue.push_back(matcher.clone());
            }
            self.matchers.push((id.clone(), matcher));
        }

        self.update_offers_wanted();
        let _ = ack.send(id);
    }

    fn remove_matcher(&mut self, id: MatcherId, ack: oneshot::Sender<MatcherId>) {
        let before = self.matchers.len();
        self.matchers.retain(|(known, _)| *known != id);
        if self.matchers.len() < before {
            info!(matcher_id = %id, "Removed matcher");
        } else {
            debug!(matcher_id = %id, "Remove requested for unknown matcher");
        }

        // In-flight queries and already-queued rotations are not cancelled;
        // removal only affects future offers.
        self.update_offers_wanted();
        let _ = ack.send(id);
    }

    fn start_match(
        &mut self,
        deadline: Instant,
        offer: Offer,
        reply: oneshot::Sender<MatchedTasks>,
    ) {
        let offer_id = offer.id.clone();

        if !self.wants_offers() {
            debug!(offer_id = %offer_id, "Offers are not wanted, replying without placements");
            let _ = reply.send(MatchedTasks::none(offer_id));
            return;
        }

        if self.offers.contains_key(&offer_id) {
            warn!(offer_id = %offer_id, "Offer is already being processed, replying without placements");
            let _ = reply.send(MatchedTasks::none(offer_id));
            return;
        }

        let mut rotation: Vec<Arc<dyn OfferMatcher>> =
            self.matchers.iter().map(|(_, m)| m.clone()).collect();
        rotation.shuffle(&mut rand::rng());

        debug!(
            offer_id = %offer_id,
            matchers = rotation.len(),
            "Processing offer"
        );

        self.offers.insert(
            offer_id.clone(),
            OfferData {
                offer,
                deadline,
                reply,
                matcher_queue: rotation.into(),
                tasks: Vec::new(),
                in_flight: None,
            },
        );

        // The timeout path: an empty reply scheduled for the deadline,
        // indistinguishable from a matcher reply. Whatever arrives first
        // drives the offer to completion.
        let timeout_tx = self.self_handle.clone();
        let timeout_id = offer_id.clone();
        tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            let _ = timeout_tx
                .send(ManagerMessage::MatchedTasks(MatchedTasks::none(timeout_id)))
                .await;
        });

        self.schedule_next_matcher_or_finish(&offer_id);
    }

    /// The dispatch step: finish the offer if a budget is exhausted,
    /// otherwise send the next queued matcher a query.
    fn schedule_next_matcher_or_finish(&mut self, offer_id: &OfferId) {
        let now = self.clock.now();
        let max_tasks = self.max_tasks_per_offer;
        let tokens = self.launch_tokens;

        let dispatch = {
            let Some(data) = self.offers.get_mut(offer_id) else {
                return;
            };

            if now >= data.deadline {
                warn!(
                    offer_id = %offer_id,
                    accepted = data.tasks.len(),
                    "Deadline reached before matcher rotation finished"
                );
                None
            } else if data.tasks.len() >= max_tasks {
                debug!(offer_id = %offer_id, "Task cap for this offer reached");
                None
            } else if tokens == 0 {
                info!(offer_id = %offer_id, "Out of launch tokens");
                None
            } else {
                match data.matcher_queue.pop_front() {
                    None => {
                        debug!(offer_id = %offer_id, "Matcher rotation exhausted");
                        None
                    }
                    Some(matcher) => {
                        data.in_flight = Some(matcher.clone());
                        Some((matcher, data.deadline, data.offer.clone()))
                    }
                }
            }
        };

        let Some((matcher, deadline, offer)) = dispatch else {
            self.finish_offer(offer_id);
            return;
        };

        let matcher_id = matcher.id();
        let query_id = offer_id.clone();
        let reply_tx = self.self_handle.clone();
        tokio::spawn(async move {
            let reply = match matcher.match_offer(deadline, offer).await {
                Ok(reply) => reply,
                Err(e) => {
                    warn!(
                        offer_id = %query_id,
                        matcher_id = %matcher_id,
                        error = %e,
                        "Matcher failed, continuing without placements"
                    );
                    MatchedTasks::none(query_id)
                }
            };
            let _ = reply_tx.send(ManagerMessage::MatchedTasks(reply)).await;
        });
    }

    /// Handles a `MatchedTasks` message: a matcher reply or the deadline
    /// timeout. Accepts the admissible prefix, rejects the rest, then runs
    /// the dispatch step again.
    fn on_matched_tasks(&mut self, incoming: MatchedTasks) {
        let offer_id = incoming.offer_id;

        let Some(data) = self.offers.get_mut(&offer_id) else {
            if incoming.tasks.is_empty() {
                debug!(offer_id = %offer_id, "Ignoring empty reply for finished offer");
            } else {
                warn!(
                    offer_id = %offer_id,
                    tasks = incoming.tasks.len(),
                    "Dropping late reply for unknown offer"
                );
            }
            return;
        };

        let replying_matcher = data.in_flight.take();

        let admissible = (self.launch_tokens as usize)
            .min(incoming.tasks.len())
            .min(self.max_tasks_per_offer.saturating_sub(data.tasks.len()));

        let mut accepted = incoming.tasks;
        let rejected = accepted.split_off(admissible);

        for placement in &rejected {
            placement.source.reject();
        }

        if !accepted.is_empty() {
            data.offer = data
                .offer
                .after_consuming(accepted.iter().flat_map(|t| t.task.resources.iter()));
            self.launch_tokens -= accepted.len() as u64;

            debug!(
                offer_id = %offer_id,
                accepted = accepted.len(),
                rejected = rejected.len(),
                tokens_left = self.launch_tokens,
                "Accepted placements"
            );

            data.tasks.extend(accepted);

            // A matcher that produced something may have more to offer;
            // it rejoins the tail of the rotation. A matcher that
            // produced nothing is done for this offer.
            if let Some(matcher) = replying_matcher {
                data.matcher_queue.push_back(matcher);
            }
        } else if !rejected.is_empty() {
            debug!(
                offer_id = %offer_id,
                rejected = rejected.len(),
                "No remaining capacity, rejected all placements from reply"
            );
        }

        self.update_offers_wanted();
        self.schedule_next_matcher_or_finish(&offer_id);
    }

    /// Sends the accumulated placements to the offer source and drops the
    /// per-offer state. Exactly one reply leaves here per accepted offer.
    fn finish_offer(&mut self, offer_id: &OfferId) {
        if let Some(data) = self.offers.remove(offer_id) {
            let OfferData { reply, tasks, .. } = data;
            debug!(offer_id = %offer_id, placements = tasks.len(), "Offer finished");
            if reply
                .send(MatchedTasks {
                    offer_id: offer_id.clone(),
                    tasks,
                })
                .is_err()
            {
                debug!(offer_id = %offer_id, "Offer source went away before the reply");
            }
        }
    }

    fn status(&self) -> ManagerStatus {
        ManagerStatus {
            launch_tokens: self.launch_tokens,
            matcher_count: self.matchers.len(),
            offers_in_flight: self.offers.len(),
            offers_wanted: self.wants_offers(),
        }
    }
}

#[async_trait]
impl Actor for OfferMatcherManager {
    type Message = ManagerMessage;

    fn name(&self) -> &str {
        "offer_matcher_manager"
    }

    async fn handle(
        &mut self,
        msg: ManagerMessage,
        _ctx: &mut ActorContext,
    ) -> Result<bool, ActorError> {
        match msg {
            ManagerMessage::SetLaunchTokens(tokens) => {
                self.launch_tokens = tokens;
                self.update_offers_wanted();
            }
            ManagerMessage::AddLaunchTokens(delta) => {
                self.launch_tokens = if delta >= 0 {
                    self.launch_tokens.saturating_add(delta as u64)
                } else {
                    self.launch_tokens.saturating_sub(delta.unsigned_abs())
                };
                self.update_offers_wanted();
            }
            ManagerMessage::AddMatcher { matcher, ack } => self.add_matcher(matcher, ack),
            ManagerMessage::RemoveMatcher { id, ack } => self.remove_matcher(id, ack),
            ManagerMessage::MatchOffer {
                deadline,
                offer,
                reply,
            } => self.start_match(deadline, offer, reply),
            ManagerMessage::MatchedTasks(reply) => self.on_matched_tasks(reply),
            ManagerMessage::GetStatus(reply) => {
                let _ = reply.send(self.status());
            }
        }
        Ok(true)
    }
}

/// Cloneable public handle to the manager actor.
#[derive(Clone)]
pub struct ManagerHandle {
    handle: ActorHandle<ManagerMessage>,
    offers_wanted: watch::Receiver<bool>,
}

impl ManagerHandle {
    /// Replaces the launch token counter.
    pub async fn set_launch_tokens(&self, tokens: u64) -> Result<(), ActorError> {
        self.handle.send(ManagerMessage::SetLaunchTokens(tokens)).await
    }

    /// Adjusts the launch token counter. The counter saturates at zero.
    pub async fn add_launch_tokens(&self, delta: i64) -> Result<(), ActorError> {
        self.handle.send(ManagerMessage::AddLaunchTokens(delta)).await
    }

    /// Registers a matcher and waits for the acknowledgement.
    pub async fn add_matcher(
        &self,
        matcher: Arc<dyn OfferMatcher>,
    ) -> Result<MatcherId, ActorError> {
        let (ack, ack_rx) = oneshot::channel();
        self.handle
            .send(ManagerMessage::AddMatcher { matcher, ack })
            .await?;
        ack_rx.await.map_err(|_| ActorError::ActorStopped)
    }

    /// Deregisters a matcher and waits for the acknowledgement.
    pub async fn remove_matcher(&self, id: MatcherId) -> Result<MatcherId, ActorError> {
        let (ack, ack_rx) = oneshot::channel();
        self.handle
            .send(ManagerMessage::RemoveMatcher { id, ack })
            .await?;
        ack_rx.await.map_err(|_| ActorError::ActorStopped)
    }

    /// Requests placements for `offer` and waits for the single reply.
    pub async fn match_offer(
        &self,
        deadline: Instant,
        offer: Offer,
    ) -> Result<MatchedTasks, ActorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.handle
            .send(ManagerMessage::MatchOffer {
                deadline,
                offer,
                reply,
            })
            .await?;
        reply_rx.await.map_err(|_| ActorError::ActorStopped)
    }

    /// Snapshot of the manager's counters.
    pub async fn status(&self) -> Result<ManagerStatus, ActorError> {
        let (reply, reply_rx) = oneshot::channel();
        self.handle.send(ManagerMessage::GetStatus(reply)).await?;
        reply_rx.await.map_err(|_| ActorError::ActorStopped)
    }

    /// Receiver for the wanted-offers signal. Duplicate values may be
    /// observed; treat the signal as idempotent.
    pub fn offers_wanted(&self) -> watch::Receiver<bool> {
        self.offers_wanted.clone()
    }

    /// Returns true if the manager actor is gone.
    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}
