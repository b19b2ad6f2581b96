//! Actor-based concurrency system with message passing and supervision.
//!
//! This module provides the actor model of Strand, including:
//!
//! - Named actors, each with a private state and a dedicated thread
//! - Message passing via mailboxes, replies arriving as deferred results
//! - An arbiter owning per-application monitors and their workers

pub mod action;
pub mod cell;
pub mod context;
pub mod mailbox;
pub mod send;
pub mod spec;
pub mod supervisor;
pub mod system;

mod registry;

// Re-export key types from the actor modules
pub use action::Actions;
pub use cell::{ActorInfo, ActorKind, ActorRef, ActorStatus};
pub use context::get_actor;
pub use mailbox::{Mailbox, MailboxError, Request};
pub use send::{notify, send, send_with_timeout, ARBITER, MONITOR};
pub use spec::{ActorSpec, Spawnable};
pub use supervisor::Application;
pub use system::{ActorSystem, ActorSystemConfig};
