//! Actor mailbox implementation for message passing.
//!
//! Every actor owns one mailbox. It carries requests from other actors,
//! internal tasks (continuations that must run on the actor's thread) and
//! the stop signal, all consumed in arrival order by the actor loop.
//!
//! Capacity bounds requests only. Tasks are resumptions of work the actor
//! already accepted, so refusing them would strand that work.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crossbeam_channel::{unbounded, Receiver, SendError, Sender};
use log::trace;
use parking_lot::RwLock;
use strand_core::{ConcurrencyError, RequestId, Value};
use thiserror::Error;

use super::{context, ActorRef};
use crate::deferred::{Deferred, Failure, Outcome};

/// Error when sending to a mailbox
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MailboxError {
    /// The mailbox is full (bounded capacity reached)
    #[error("mailbox is full")]
    Full,
    /// The mailbox has been closed or the actor is stopped
    #[error("mailbox is closed")]
    Closed,
}

pub(crate) type Task = Box<dyn FnOnce() + Send + 'static>;

/// Where the outcome of a request goes.
///
/// The reply deferred is settled on the sender's thread when the sender is
/// an actor. A reply dropped without being delivered fails its deferred,
/// so a request lost with a stopping actor never leaves a caller waiting.
pub(crate) struct Reply {
    deferred: Option<Deferred>,
    sender: Option<ActorRef>,
    target: String,
}

impl Reply {
    pub(crate) fn new(deferred: Deferred, sender: Option<ActorRef>, target: &str) -> Self {
        Self {
            deferred: Some(deferred),
            sender,
            target: target.to_string(),
        }
    }

    pub(crate) fn deliver(mut self, outcome: Outcome) {
        if let Some(deferred) = self.deferred.take() {
            match self.sender.take() {
                Some(sender) if !context::is_current(&sender) => {
                    sender.run_soon(move || deferred.settle(outcome))
                }
                _ => deferred.settle(outcome),
            }
        }
    }

    // The caller learned about the problem synchronously.
    fn disarm(&mut self) {
        self.deferred = None;
    }
}

impl Drop for Reply {
    fn drop(&mut self) {
        if self.deferred.is_some() {
            let failure = Failure::new(ConcurrencyError::ActorStopped(self.target.clone()));
            let reply = Reply {
                deferred: self.deferred.take(),
                sender: self.sender.take(),
                target: std::mem::take(&mut self.target),
            };
            reply.deliver(Err(failure));
        }
    }
}

/// A request for an actor to run one of its actions.
pub struct Request {
    /// Identifier used in log lines
    pub id: RequestId,

    /// Name of the action to run
    pub action: String,

    /// Positional arguments
    pub args: Vec<Value>,

    pub(crate) reply: Reply,
}

impl fmt::Debug for Request {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Request")
            .field("id", &self.id)
            .field("action", &self.action)
            .field("args", &self.args)
            .finish()
    }
}

/// What an actor loop consumes.
pub(crate) enum Envelope {
    Request(Request),
    Task(Task),
    Stop,
}

/// A handle to an actor's mailbox
#[derive(Clone)]
pub struct Mailbox {
    // Channel for sending envelopes to the actor
    sender: Sender<Envelope>,
    // Maximum number of queued requests
    capacity: usize,
    // Requests accepted but not yet dequeued by the actor loop
    requests: Arc<AtomicUsize>,
    // Actor name for debugging and monitoring
    actor_name: String,
    // Set once the actor stopped consuming; held for reading while sending
    closed: Arc<RwLock<bool>>,
}

impl Mailbox {
    /// Create a new mailbox with the specified request capacity
    pub(crate) fn new(capacity: usize, actor_name: impl Into<String>) -> (Self, Receiver<Envelope>) {
        let (sender, receiver) = unbounded();
        let mailbox = Self {
            sender,
            capacity,
            requests: Arc::new(AtomicUsize::new(0)),
            actor_name: actor_name.into(),
            closed: Arc::new(RwLock::new(false)),
        };
        (mailbox, receiver)
    }

    /// Queue a request without blocking.
    ///
    /// On failure the request is dropped without touching its reply; the
    /// error is the caller's answer.
    pub(crate) fn try_send(&self, mut request: Request) -> Result<(), MailboxError> {
        let closed = self.closed.read();
        if *closed {
            request.reply.disarm();
            return Err(MailboxError::Closed);
        }
        let reserved = self
            .requests
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |queued| {
                (queued < self.capacity).then_some(queued + 1)
            });
        if reserved.is_err() {
            request.reply.disarm();
            return Err(MailboxError::Full);
        }

        trace!(
            "Mailbox {}: queueing request {} ({})",
            self.actor_name,
            request.id.short(),
            request.action
        );
        match self.sender.send(Envelope::Request(request)) {
            Ok(()) => Ok(()),
            Err(SendError(envelope)) => {
                self.requests.fetch_sub(1, Ordering::AcqRel);
                if let Envelope::Request(mut request) = envelope {
                    request.reply.disarm();
                }
                Err(MailboxError::Closed)
            }
        }
    }

    /// Queue a task, handing it back if the actor is gone.
    pub(crate) fn post(&self, task: Task) -> Result<(), Task> {
        let closed = self.closed.read();
        if *closed {
            return Err(task);
        }
        match self.sender.send(Envelope::Task(task)) {
            Ok(()) => Ok(()),
            Err(SendError(Envelope::Task(task))) => Err(task),
            Err(SendError(_)) => Ok(()),
        }
    }

    /// Ask the actor loop to stop after what is already queued.
    pub(crate) fn stop(&self) -> Result<(), MailboxError> {
        if *self.closed.read() {
            return Err(MailboxError::Closed);
        }
        self.sender
            .send(Envelope::Stop)
            .map_err(|_| MailboxError::Closed)
    }

    /// Account for an envelope the actor loop took off the channel.
    pub(crate) fn received(&self, envelope: &Envelope) {
        if let Envelope::Request(_) = envelope {
            self.requests.fetch_sub(1, Ordering::AcqRel);
        }
    }

    /// Refuse everything from now on.
    ///
    /// Once this returns, nothing else lands in the channel, so draining it
    /// afterwards sees every envelope ever accepted.
    pub(crate) fn close(&self) {
        *self.closed.write() = true;
    }

    /// Number of queued envelopes
    pub fn len(&self) -> usize {
        self.sender.len()
    }

    /// Number of queued requests, the figure bounded by the capacity
    pub fn queued_requests(&self) -> usize {
        self.requests.load(Ordering::Acquire)
    }

    /// Whether nothing is queued
    pub fn is_empty(&self) -> bool {
        self.sender.is_empty()
    }

    /// Get the request capacity of the mailbox
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Get the actor name associated with this mailbox
    pub fn actor_name(&self) -> &str {
        &self.actor_name
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("actor_name", &self.actor_name)
            .field("capacity", &self.capacity)
            .field("queued", &self.len())
            .field("requests", &self.queued_requests())
            .finish()
    }
}
