//! Single-consumer mailbox actor runtime.
//!
//! The scheduler's mutable state lives inside actors that process one
//! message at a time; everything outside communicates through cloneable
//! handles. See `framework` for the building blocks.

mod framework;

pub use framework::{
    mailbox, spawn, Actor, ActorContext, ActorError, ActorHandle, ActorRef, Message,
};
