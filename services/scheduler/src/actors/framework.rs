//! Core actor types and the message loop.
//!
//! Provides the fundamental building blocks for the actor runtime:
//! - `Actor` trait for defining actor behavior
//! - `ActorHandle` for sending messages to actors
//! - `mailbox`/`spawn` for wiring an actor to its message loop
//!
//! An actor owns its mutable state and processes messages strictly one at
//! a time; the only way in is its mailbox. Fire-and-forget work (timers,
//! queries to other components) is spawned as tasks that deliver their
//! outcome back to the mailbox as ordinary messages.

use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info};

// =============================================================================
// Core Traits
// =============================================================================

/// Marker trait for actor messages.
pub trait Message: Send + Debug + 'static {}

impl<T: Send + Debug + 'static> Message for T {}

/// The Actor trait defines behavior for an actor.
#[async_trait]
pub trait Actor: Send + 'static {
    /// The message type this actor handles.
    type Message: Message;

    /// Actor name for logging.
    fn name(&self) -> &str;

    /// Handle a single message.
    ///
    /// Returns `Ok(true)` to continue, `Ok(false)` to stop, or `Err` on failure.
    async fn handle(
        &mut self,
        msg: Self::Message,
        ctx: &mut ActorContext,
    ) -> Result<bool, ActorError>;

    /// Called when the actor starts.
    async fn on_start(&mut self, _ctx: &mut ActorContext) -> Result<(), ActorError> {
        Ok(())
    }

    /// Called when the actor is about to stop.
    async fn on_stop(&mut self, _ctx: &mut ActorContext) {
        // Default: no cleanup
    }
}

/// Context provided to actors during message handling.
pub struct ActorContext {
    /// Actor's unique ID.
    pub actor_id: String,

    /// Shutdown signal receiver.
    pub shutdown: watch::Receiver<bool>,

    /// Message counter.
    pub messages_processed: u64,

    /// Last message processing time.
    pub last_message_at: Option<Instant>,
}

impl ActorContext {
    fn new(actor_id: String, shutdown: watch::Receiver<bool>) -> Self {
        Self {
            actor_id,
            shutdown,
            messages_processed: 0,
            last_message_at: None,
        }
    }

    /// Check if shutdown has been signaled.
    pub fn is_shutdown(&self) -> bool {
        *self.shutdown.borrow()
    }
}

// =============================================================================
// Errors
// =============================================================================

/// Errors that can occur in actors.
#[derive(Debug, Error)]
pub enum ActorError {
    /// Transient error; the actor keeps running.
    #[error("transient error: {0}")]
    Transient(String),

    /// Permanent error; the actor stops.
    #[error("permanent error: {0}")]
    Permanent(String),

    /// Actor mailbox is full.
    #[error("mailbox full")]
    MailboxFull,

    /// Actor has stopped.
    #[error("actor stopped")]
    ActorStopped,
}

// =============================================================================
// Actor Handle
// =============================================================================

/// Handle for sending messages to an actor.
pub struct ActorHandle<M: Message> {
    tx: mpsc::Sender<M>,
    actor_id: String,
}

impl<M: Message> Clone for ActorHandle<M> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
            actor_id: self.actor_id.clone(),
        }
    }
}

impl<M: Message> ActorHandle<M> {
    /// Send a message to the actor, waiting for mailbox space.
    pub async fn send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.send(msg).await.map_err(|_| ActorError::ActorStopped)
    }

    /// Try to send a message without blocking.
    pub fn try_send(&self, msg: M) -> Result<(), ActorError> {
        self.tx.try_send(msg).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => ActorError::MailboxFull,
            mpsc::error::TrySendError::Closed(_) => ActorError::ActorStopped,
        })
    }

    /// Get the actor ID.
    pub fn actor_id(&self) -> &str {
        &self.actor_id
    }

    /// Returns true if the actor's mailbox is gone.
    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Creates a mailbox for an actor, returning the send handle and the
/// receiving end to pass to [`spawn`].
pub fn mailbox<M: Message>(name: &str, capacity: usize) -> (ActorHandle<M>, mpsc::Receiver<M>) {
    let (tx, rx) = mpsc::channel(capacity);
    let actor_id = format!("{}_{}", name, next_actor_seq());
    (ActorHandle { tx, actor_id }, rx)
}

// =============================================================================
// Actor Ref
// =============================================================================

/// Reference to a running actor task.
pub struct ActorRef {
    /// Actor ID.
    pub actor_id: String,

    task_handle: tokio::task::JoinHandle<()>,
    shutdown_tx: watch::Sender<bool>,
}

impl ActorRef {
    /// Signal the actor to stop.
    pub fn stop(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Check if the actor task is still running.
    pub fn is_running(&self) -> bool {
        !self.task_handle.is_finished()
    }

    /// Abort the actor task immediately.
    pub fn abort(&self) {
        self.task_handle.abort();
    }
}

/// Spawn an actor onto the runtime, consuming the receiver created by
/// [`mailbox`].
pub fn spawn<A: Actor>(actor: A, rx: mpsc::Receiver<A::Message>, actor_id: String) -> ActorRef {
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let loop_id = actor_id.clone();
    let task_handle = tokio::spawn(async move {
        run_actor_loop(actor, rx, shutdown_rx, loop_id).await;
    });

    ActorRef {
        actor_id,
        task_handle,
        shutdown_tx,
    }
}

// =============================================================================
// Actor Loop
// =============================================================================

async fn run_actor_loop<A: Actor>(
    mut actor: A,
    mut rx: mpsc::Receiver<A::Message>,
    mut shutdown: watch::Receiver<bool>,
    actor_id: String,
) {
    let mut ctx = ActorContext::new(actor_id.clone(), shutdown.clone());

    if let Err(e) = actor.on_start(&mut ctx).await {
        error!(actor_id = %actor_id, error = %e, "Actor failed to start");
        return;
    }

    debug!(actor_id = %actor_id, "Actor started");

    // Once the shutdown sender is gone the actor can only stop via its
    // mailbox closing; the guard keeps the select from spinning on the
    // dead watch channel.
    let mut shutdown_connected = true;

    loop {
        tokio::select! {
            biased;

            changed = shutdown.changed(), if shutdown_connected => {
                match changed {
                    Ok(()) => {
                        if *shutdown.borrow() {
                            info!(actor_id = %actor_id, "Actor received shutdown signal");
                            break;
                        }
                    }
                    Err(_) => shutdown_connected = false,
                }
            }

            msg = rx.recv() => {
                match msg {
                    Some(msg) => {
                        ctx.messages_processed += 1;
                        ctx.last_message_at = Some(Instant::now());

                        match actor.handle(msg, &mut ctx).await {
                            Ok(true) => {}
                            Ok(false) => {
                                info!(actor_id = %actor_id, "Actor requested stop");
                                break;
                            }
                            Err(e) => {
                                error!(actor_id = %actor_id, error = %e, "Actor error");
                                if matches!(e, ActorError::Permanent(_)) {
                                    break;
                                }
                            }
                        }
                    }
                    None => {
                        debug!(actor_id = %actor_id, "Actor mailbox closed");
                        break;
                    }
                }
            }
        }
    }

    actor.on_stop(&mut ctx).await;

    info!(
        actor_id = %actor_id,
        messages_processed = ctx.messages_processed,
        "Actor stopped"
    );
}

// =============================================================================
// Helpers
// =============================================================================

static ACTOR_SEQ: AtomicU64 = AtomicU64::new(0);

fn next_actor_seq() -> u64 {
    ACTOR_SEQ.fetch_add(1, Ordering::SeqCst)
}

// =============================================================================
// Tests
// =============================================================================
