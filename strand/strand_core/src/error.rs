//! Error types for the Strand actor runtime.
//!
//! This module defines the error hierarchy used throughout the system. The
//! errors are organized by subsystem, with each subsystem having its own
//! error type.
//!
//! The root error type, `Error`, can wrap any of the subsystem-specific
//! errors. It is `Clone` because a captured failure may be observed by any
//! number of holders of the same deferred result, and each of them receives
//! its own copy of the error.

use std::time::Duration;
use thiserror::Error;

/// Root error type for the Strand system.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// A value had the wrong type for the requested operation
    #[error("Type error: {0}")]
    Type(String),

    /// A value had the right type but an unacceptable content
    #[error("Value error: {0}")]
    Value(String),

    /// An awaited operation did not complete in time
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// A continuation, handler or coroutine panicked
    #[error("Panic: {0}")]
    Panic(String),

    /// Deferred result misuse
    #[error("Deferred error: {0}")]
    Deferred(#[from] DeferredError),

    /// Actor system and messaging errors
    #[error("Concurrency error: {0}")]
    Concurrency(#[from] ConcurrencyError),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// General runtime errors
    #[error("Runtime error: {0}")]
    Runtime(String),
}

impl Error {
    /// Whether this error is the timeout kind injected by the scheduler.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization(error.to_string())
    }
}

/// Errors raised by misuse of a deferred result.
///
/// These are programming errors: they are surfaced immediately to the
/// offending caller and never retried.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeferredError {
    /// The deferred result already holds its terminal outcome
    #[error("deferred already resolved")]
    AlreadyResolved,

    /// The deferred result was force-resolved by an expired timeout
    #[error("deferred already timed out")]
    TimedOut,

    /// The outcome was requested before the deferred result resolved
    #[error("deferred result is still pending")]
    Pending,

    /// A blocking wait was attempted from inside an actor loop
    #[error("blocking wait from inside actor {0} would deadlock its loop")]
    WouldBlock(String),
}

/// Errors related to actors and message delivery.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConcurrencyError {
    /// No live actor is registered under the given name
    #[error("Actor not found: {0}")]
    ActorNotFound(String),

    /// The name was already claimed by an actor of this system
    #[error("Actor name already used: {0}")]
    DuplicateActor(String),

    /// The target actor has no handler for the requested action
    #[error("Actor {actor} has no action {action}")]
    ActionNotFound {
        /// Name of the target actor
        actor: String,

        /// Name of the requested action
        action: String,
    },

    /// The action registry of an actor failed validation
    #[error("Invalid actions for actor {actor}: {reason}")]
    InvalidActions {
        /// Name of the actor being constructed
        actor: String,

        /// What was wrong with the registry
        reason: String,
    },

    /// An operation requiring an actor context ran outside of one
    #[error("Not running inside an actor")]
    NoActorContext,

    /// The caller has no owning monitor to address as `monitor`
    #[error("Actor {0} has no monitor")]
    NoMonitor(String),

    /// Actor mailbox is full
    #[error("Actor mailbox full: {0}")]
    MailboxFull(String),

    /// The actor stopped before handling the request
    #[error("Actor stopped: {0}")]
    ActorStopped(String),

    /// Failed to spawn the actor thread
    #[error("Actor spawn failed: {0}")]
    SpawnFailed(String),

    /// No application is registered under the given name
    #[error("Application not found: {0}")]
    ApplicationNotFound(String),

    /// Actor system is shutting down
    #[error("Actor system shutting down")]
    SystemShuttingDown,
}

/// Result type used throughout the Strand system.
pub type Result<T> = std::result::Result<T, Error>;
