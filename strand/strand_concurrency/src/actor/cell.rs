//! Actors and their loops.
//!
//! Each actor runs on a dedicated thread named after it and consumes its
//! mailbox strictly in order: requests run one handler at a time against
//! the actor's private state, tasks resume work (coroutines, replies) the
//! actor already owns. Nothing in an actor's state is ever touched from
//! another thread.

use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

use crossbeam_channel::Receiver;
use log::{debug, error, info, trace, warn};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strand_core::value::to_value;
use strand_core::{ActorId, ConcurrencyError, Error, RequestId, Value};

use super::mailbox::{Envelope, Mailbox, MailboxError, Reply, Request, Task};
use super::send;
use super::spec::{Behavior, Spawnable};
use super::system::{ActorSystem, SystemShared};
use super::context;
use crate::deferred::{maybe_async, Async, Deferred, Failure, Outcome};
use crate::sync::AtomicCounter;

/// Role of an actor in the supervision tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorKind {
    /// Root of the tree, owner of the registry
    Arbiter,
    /// Owner of one application's workers
    Monitor,
    /// Application worker
    Worker,
}

/// Lifecycle state of an actor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActorStatus {
    /// Actor is running its start hook
    Starting,
    /// Actor is processing its mailbox
    Running,
    /// A stop was requested; queued work is being drained
    Stopping,
    /// The loop exited
    Dead,
}

/// A snapshot of an actor, as returned by the `info` action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActorInfo {
    /// Unique name within the system
    pub name: String,
    /// Unique identifier
    pub aid: ActorId,
    /// Role in the tree
    pub kind: ActorKind,
    /// Lifecycle state
    pub status: ActorStatus,
    /// Name of the owning actor
    pub owner: Option<String>,
    /// Application this actor belongs to
    pub app: Option<String>,
    /// Application-defined actions
    pub actions: Vec<String>,
    /// Requests handled so far
    pub processed: usize,
    /// Envelopes waiting in the mailbox
    pub queued: usize,
}

/// Where a new actor goes in the tree.
pub(crate) struct Placement {
    pub(crate) name: String,
    pub(crate) kind: ActorKind,
    pub(crate) owner: Option<String>,
    pub(crate) app: Option<String>,
    pub(crate) cfg: Value,
}

pub(crate) struct ActorCell {
    aid: ActorId,
    name: String,
    kind: ActorKind,
    owner: Option<String>,
    app: Option<String>,
    cfg: Value,
    actions: Vec<String>,
    status: RwLock<ActorStatus>,
    mailbox: Mailbox,
    system: Weak<SystemShared>,
    started: Deferred,
    stopped: Deferred,
    processed: AtomicCounter,
}

/// A handle to a live (or dead) actor.
#[derive(Clone)]
pub struct ActorRef {
    cell: Arc<ActorCell>,
}

impl ActorRef {
    /// Unique name within the system.
    pub fn name(&self) -> &str {
        &self.cell.name
    }

    /// Unique identifier.
    pub fn aid(&self) -> ActorId {
        self.cell.aid
    }

    /// Role in the supervision tree.
    pub fn kind(&self) -> ActorKind {
        self.cell.kind
    }

    /// Name of the owning actor: the monitor for a worker, the arbiter for
    /// a monitor.
    pub fn owner(&self) -> Option<&str> {
        self.cell.owner.as_deref()
    }

    /// Application this actor belongs to.
    pub fn app(&self) -> Option<&str> {
        self.cell.app.as_deref()
    }

    /// Configuration the application was started with.
    pub fn cfg(&self) -> &Value {
        &self.cell.cfg
    }

    /// Current lifecycle state.
    pub fn status(&self) -> ActorStatus {
        *self.cell.status.read()
    }

    /// Whether the actor still accepts requests.
    pub fn is_alive(&self) -> bool {
        matches!(self.status(), ActorStatus::Starting | ActorStatus::Running)
    }

    /// Resolves with the actor's name once its start hook completed.
    pub fn started(&self) -> Deferred {
        self.cell.started.clone()
    }

    /// Resolves once the loop exited.
    pub fn stopped(&self) -> Deferred {
        self.cell.stopped.clone()
    }

    /// A snapshot of this actor.
    pub fn info(&self) -> ActorInfo {
        ActorInfo {
            name: self.cell.name.clone(),
            aid: self.cell.aid,
            kind: self.cell.kind,
            status: self.status(),
            owner: self.cell.owner.clone(),
            app: self.cell.app.clone(),
            actions: self.cell.actions.clone(),
            processed: self.cell.processed.get(),
            queued: self.cell.mailbox.len(),
        }
    }

    /// The system this actor belongs to, while it exists.
    pub fn system(&self) -> Option<ActorSystem> {
        self.cell.system.upgrade().map(ActorSystem::from_shared)
    }

    pub(crate) fn belongs_to(&self, system: &Arc<SystemShared>) -> bool {
        Weak::ptr_eq(&self.cell.system, &Arc::downgrade(system))
    }

    /// Send a request from this actor.
    ///
    /// `target` is a registered name, `"arbiter"`, or `"monitor"` for this
    /// actor's monitor. The reply deferred is settled on this actor's
    /// thread.
    pub fn send(&self, target: &str, action: &str, args: Vec<Value>) -> Result<Deferred, Error> {
        self.route(target, action, args, None)
    }

    /// [`ActorRef::send`] with a timeout forcing the reply to fail.
    pub fn send_with_timeout(
        &self,
        target: &str,
        action: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Deferred, Error> {
        self.route(target, action, args, Some(timeout))
    }

    /// Fire-and-forget request whose reply, even a failure, is discarded.
    pub fn notify(&self, target: &str, action: &str, args: Vec<Value>) -> Result<(), Error> {
        send::discard(self.send(target, action, args)?);
        Ok(())
    }

    fn route(
        &self,
        target: &str,
        action: &str,
        args: Vec<Value>,
        timeout: Option<Duration>,
    ) -> Result<Deferred, Error> {
        let system = self
            .cell
            .system
            .upgrade()
            .ok_or(ConcurrencyError::SystemShuttingDown)?;
        send::route(&system, Some(self), target, action, args, timeout)
    }

    /// Queue `task` to run on this actor's thread after what is queued.
    pub fn call_soon<F>(&self, task: F) -> Result<(), ConcurrencyError>
    where
        F: FnOnce() + Send + 'static,
    {
        self.cell
            .mailbox
            .post(Box::new(task))
            .map_err(|_| ConcurrencyError::ActorStopped(self.cell.name.clone()))
    }

    /// Like [`ActorRef::call_soon`], but a task for a dead actor runs inline
    /// so whatever it settles is not lost.
    pub(crate) fn run_soon<F>(&self, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(task) = self.cell.mailbox.post(Box::new(task)) {
            trace!("Actor {} is gone; running task inline", self.cell.name);
            task();
        }
    }

    /// A deferred following `deferred` whose continuations run on this
    /// actor's thread.
    pub(crate) fn adopt(&self, deferred: &Deferred) -> Deferred {
        let local = Deferred::new();
        let target = local.clone();
        let actor = self.clone();
        deferred.subscribe(Box::new(move |outcome| {
            if context::is_current(&actor) {
                target.settle(outcome);
            } else {
                actor.run_soon(move || target.settle(outcome));
            }
        }));
        local
    }

    pub(crate) fn try_send(&self, request: Request) -> Result<(), ConcurrencyError> {
        self.cell.mailbox.try_send(request).map_err(|e| match e {
            MailboxError::Full => ConcurrencyError::MailboxFull(self.cell.name.clone()),
            MailboxError::Closed => ConcurrencyError::ActorNotFound(self.cell.name.clone()),
        })
    }

    /// Mark as stopping and queue the stop signal behind pending work.
    pub(crate) fn request_stop(&self) {
        {
            let mut status = self.cell.status.write();
            if matches!(*status, ActorStatus::Stopping | ActorStatus::Dead) {
                return;
            }
            *status = ActorStatus::Stopping;
        }
        debug!("Actor {}: stop requested", self.cell.name);
        if self.cell.mailbox.stop().is_err() {
            warn!("Actor {}: mailbox already closed", self.cell.name);
        }
    }

    fn set_status(&self, new_status: ActorStatus) {
        let mut status = self.cell.status.write();
        let old_status = *status;
        // A stop request wins over a late start
        if old_status == ActorStatus::Stopping && new_status == ActorStatus::Running {
            return;
        }
        *status = new_status;
        debug!(
            "Actor {} status change: {:?} -> {:?}",
            self.cell.name, old_status, new_status
        );
    }
}

impl PartialEq for ActorRef {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }
}

impl Eq for ActorRef {}

impl fmt::Debug for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorRef")
            .field("name", &self.cell.name)
            .field("aid", &self.cell.aid.short())
            .field("kind", &self.cell.kind)
            .field("status", &self.status())
            .finish()
    }
}

impl fmt::Display for ActorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.cell.name, self.cell.aid.short())
    }
}

/// Create, register and start an actor.
pub(crate) fn spawn(
    system: &Arc<SystemShared>,
    spawnable: Spawnable,
    placement: Placement,
) -> Result<ActorRef, ConcurrencyError> {
    spawnable.validate(&placement.name)?;
    system.registry.claim(&placement.name)?;

    let (mailbox, receiver) = Mailbox::new(system.config.mailbox_capacity, &placement.name);
    let actor = ActorRef {
        cell: Arc::new(ActorCell {
            aid: ActorId::new(),
            name: placement.name,
            kind: placement.kind,
            owner: placement.owner,
            app: placement.app,
            cfg: placement.cfg,
            actions: spawnable.actions,
            status: RwLock::new(ActorStatus::Starting),
            mailbox,
            system: Arc::downgrade(system),
            started: Deferred::new(),
            stopped: Deferred::new(),
            processed: AtomicCounter::new(0),
        }),
    };

    system.registry.insert(actor.clone());

    let thread_name = format!("{}-{}", system.config.thread_name_prefix, actor.name());
    let behavior = spawnable.behavior;
    let looping = actor.clone();
    let spawned = thread::Builder::new()
        .name(thread_name)
        .spawn(move || run_loop(looping, behavior, receiver));

    if let Err(e) = spawned {
        error!("Failed to spawn actor {}: {}", actor.name(), e);
        actor.set_status(ActorStatus::Dead);
        system.registry.remove(actor.name());
        return Err(ConcurrencyError::SpawnFailed(e.to_string()));
    }

    info!("Spawned {:?} actor {}", actor.kind(), actor);
    Ok(actor)
}

fn run_loop(actor: ActorRef, mut behavior: Box<dyn Behavior>, receiver: Receiver<Envelope>) {
    let _context = context::enter(actor.clone());

    start(&actor, behavior.as_mut());

    while let Ok(envelope) = receiver.recv() {
        actor.cell.mailbox.received(&envelope);
        match envelope {
            Envelope::Request(request) => handle_request(&actor, behavior.as_mut(), request),
            Envelope::Task(task) => run_task(&actor, task),
            Envelope::Stop => break,
        }
    }

    actor.set_status(ActorStatus::Stopping);
    let stop_hook = AssertUnwindSafe(|| behavior.stop(&actor));
    if let Err(payload) = panic::catch_unwind(stop_hook) {
        let failure = Failure::from_panic(payload.as_ref(), Location::caller());
        error!("Actor {}: stop hook failed: {}", actor.name(), failure.observed());
    }

    // Work still queued: tasks settle deferreds others wait on, requests
    // fail through their replies when dropped.
    actor.cell.mailbox.close();
    for envelope in receiver.try_iter() {
        actor.cell.mailbox.received(&envelope);
        if let Envelope::Task(task) = envelope {
            run_task(&actor, task);
        }
    }
    actor.set_status(ActorStatus::Dead);
    drop(receiver);

    retire(&actor);
    debug!(
        "Actor {} stopped after {} requests",
        actor.name(),
        actor.cell.processed.get()
    );
    actor.cell.stopped.settle(Ok(json!(actor.name())));
}

fn start(actor: &ActorRef, behavior: &mut dyn Behavior) {
    let entry = match panic::catch_unwind(AssertUnwindSafe(|| behavior.start(actor))) {
        Ok(entry) => entry,
        Err(payload) => Async::Failure(Failure::from_panic(payload.as_ref(), Location::caller())),
    };

    let ready = actor.clone();
    actor.adopt(&maybe_async(entry).into_deferred()).subscribe(Box::new(move |outcome| {
        match outcome {
            Ok(_) => {
                ready.set_status(ActorStatus::Running);
                ready.cell.started.settle(Ok(json!(ready.name())));
            }
            Err(failure) => {
                error!("Actor {} failed to start: {}", ready.name(), failure);
                ready.cell.started.settle(Err(failure));
                ready.request_stop();
            }
        }
    }));
}

fn handle_request(actor: &ActorRef, behavior: &mut dyn Behavior, request: Request) {
    let Request {
        id,
        action,
        args,
        reply,
    } = request;
    trace!("Actor {}: request {} ({})", actor.name(), id.short(), action);
    actor.cell.processed.increment();

    let handled = panic::catch_unwind(AssertUnwindSafe(|| {
        behavior
            .handle(actor, &action, args.clone())
            .or_else(|| builtin(actor, &action, args))
            .unwrap_or_else(|| {
                Async::from(Error::from(ConcurrencyError::ActionNotFound {
                    actor: actor.name().to_string(),
                    action: action.clone(),
                }))
            })
    }));
    let result = match handled {
        Ok(result) => result,
        Err(payload) => Async::Failure(Failure::from_panic(payload.as_ref(), Location::caller())),
    };

    respond(id, maybe_async(result), reply);
}

fn respond(id: RequestId, result: Async, reply: Reply) {
    match result.ready() {
        Some(outcome) => reply.deliver(outcome),
        None => {
            trace!("Request {} answered asynchronously", id.short());
            result
                .into_deferred()
                .subscribe(Box::new(move |outcome: Outcome| reply.deliver(outcome)));
        }
    }
}

fn run_task(actor: &ActorRef, task: Task) {
    if let Err(payload) = panic::catch_unwind(AssertUnwindSafe(task)) {
        let failure = Failure::from_panic(payload.as_ref(), Location::caller());
        error!("Actor {}: task failed: {}", actor.name(), failure.observed());
    }
}

// Actions every actor answers unless it defines them itself.
fn builtin(actor: &ActorRef, action: &str, args: Vec<Value>) -> Option<Async> {
    match action {
        "ping" => Some(json!("pong").into()),
        "echo" => Some(Value::Array(args).into()),
        "info" => Some(to_value(actor.info()).into()),
        "stop" => Some(
            actor
                .send("arbiter", "kill_actor", vec![json!(actor.name())])
                .into(),
        ),
        "workers" if actor.kind() == ActorKind::Monitor => {
            let system = actor.cell.system.upgrade()?;
            let names: Vec<String> = system
                .registry
                .workers_of(actor.name())
                .iter()
                .map(|worker| worker.name().to_string())
                .collect();
            Some(json!(names).into())
        }
        _ => None,
    }
}

// Stop owned workers and drop the actor from the registry through the
// arbiter, the registry's single writer.
fn retire(actor: &ActorRef) {
    let Some(system) = actor.cell.system.upgrade() else {
        return;
    };
    if actor.kind() == ActorKind::Monitor {
        for worker in system.registry.workers_of(actor.name()) {
            worker.request_stop();
        }
    }

    let name = actor.name().to_string();
    match system.arbiter() {
        Some(arbiter) if arbiter != *actor => {
            let owner = Arc::clone(&system);
            arbiter.run_soon(move || owner.registry.remove(&name));
        }
        _ => system.registry.remove(&name),
    }
}
