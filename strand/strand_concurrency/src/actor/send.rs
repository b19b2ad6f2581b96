//! Request routing between actors.
//!
//! A target is either a registered actor name or one of two relative
//! names: `"arbiter"` for the root of the system and `"monitor"` for the
//! sender's monitor. Routing problems are reported synchronously to the
//! caller; everything after a successful enqueue arrives through the reply
//! deferred.

use std::sync::Arc;
use std::time::Duration;

use log::{debug, trace};
use strand_core::{ConcurrencyError, Error, RequestId, Value};

use super::context;
use super::mailbox::{Reply, Request};
use super::system::SystemShared;
use super::{ActorKind, ActorRef};
use crate::deferred::Deferred;

/// Name of the root actor of every system.
pub const ARBITER: &str = "arbiter";

/// Relative name of the sender's monitor.
pub const MONITOR: &str = "monitor";

pub(crate) fn route(
    system: &Arc<SystemShared>,
    sender: Option<&ActorRef>,
    target: &str,
    action: &str,
    args: Vec<Value>,
    timeout: Option<Duration>,
) -> Result<Deferred, Error> {
    let recipient = resolve(system, sender, target)?;
    if !recipient.is_alive() {
        return Err(ConcurrencyError::ActorNotFound(target.to_string()).into());
    }

    let deferred = Deferred::new();
    let request = Request {
        id: RequestId::new(),
        action: action.to_string(),
        args,
        reply: Reply::new(deferred.clone(), sender.cloned(), recipient.name()),
    };
    trace!(
        "{} -> {}: {} ({})",
        sender.map(ActorRef::name).unwrap_or("<external>"),
        recipient.name(),
        action,
        request.id.short()
    );
    recipient.try_send(request)?;

    if let Some(timeout) = timeout {
        deferred.set_timeout(timeout);
    }
    Ok(deferred)
}

fn resolve(
    system: &Arc<SystemShared>,
    sender: Option<&ActorRef>,
    target: &str,
) -> Result<ActorRef, ConcurrencyError> {
    match target {
        ARBITER => system
            .arbiter()
            .ok_or_else(|| ConcurrencyError::ActorNotFound(ARBITER.to_string())),
        MONITOR => {
            let sender = sender.ok_or(ConcurrencyError::NoActorContext)?;
            match sender.kind() {
                ActorKind::Monitor => Ok(sender.clone()),
                ActorKind::Worker => {
                    let owner = sender
                        .owner()
                        .ok_or_else(|| ConcurrencyError::NoMonitor(sender.name().to_string()))?;
                    system
                        .registry
                        .get(owner)
                        .ok_or_else(|| ConcurrencyError::ActorNotFound(owner.to_string()))
                }
                ActorKind::Arbiter => Err(ConcurrencyError::NoMonitor(sender.name().to_string())),
            }
        }
        name => system
            .registry
            .get(name)
            .ok_or_else(|| ConcurrencyError::ActorNotFound(name.to_string())),
    }
}

/// Swallow whatever `deferred` settles with.
pub(crate) fn discard(deferred: Deferred) {
    deferred.subscribe(Box::new(|outcome| {
        if let Err(failure) = outcome {
            failure.mute();
            debug!("Notification failed: {}", failure);
        }
    }));
}

fn current() -> Result<ActorRef, Error> {
    context::get_actor().ok_or_else(|| ConcurrencyError::NoActorContext.into())
}

/// Send a request from the actor running on this thread.
///
/// Fails with [`ConcurrencyError::NoActorContext`] outside an actor; use
/// [`ActorSystem::send`](super::ActorSystem::send) there instead.
pub fn send(target: &str, action: &str, args: Vec<Value>) -> Result<Deferred, Error> {
    current()?.send(target, action, args)
}

/// [`send`] with a timeout forcing the reply to fail.
pub fn send_with_timeout(
    target: &str,
    action: &str,
    args: Vec<Value>,
    timeout: Duration,
) -> Result<Deferred, Error> {
    current()?.send_with_timeout(target, action, args, timeout)
}

/// Fire-and-forget [`send`].
pub fn notify(target: &str, action: &str, args: Vec<Value>) -> Result<(), Error> {
    current()?.notify(target, action, args)
}
