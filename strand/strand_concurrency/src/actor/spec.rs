//! Actor definitions.
//!
//! An [`ActorSpec`] bundles an actor's private state with its action
//! registry and optional lifecycle hooks. Converting it into a
//! [`Spawnable`] erases the state type so applications can hand the system
//! heterogeneous actors.

use std::fmt;

use strand_core::{ConcurrencyError, Value};

use super::action::Actions;
use super::ActorRef;
use crate::deferred::Async;

type StartHook<S> = Box<dyn FnOnce(&mut S, &ActorRef) -> Async + Send + 'static>;
type StopHook<S> = Box<dyn FnOnce(&mut S, &ActorRef) + Send + 'static>;

/// State, actions and lifecycle hooks of one actor.
pub struct ActorSpec<S> {
    state: S,
    actions: Actions<S>,
    on_start: Option<StartHook<S>>,
    on_stop: Option<StopHook<S>>,
}

impl<S: Send + 'static> ActorSpec<S> {
    /// A spec with `state` and no actions.
    pub fn new(state: S) -> Self {
        Self {
            state,
            actions: Actions::new(),
            on_start: None,
            on_stop: None,
        }
    }

    /// Replace the action registry.
    pub fn actions(mut self, actions: Actions<S>) -> Self {
        self.actions = actions;
        self
    }

    /// Run `hook` on the actor's thread before it is considered started.
    ///
    /// The actor's `started` deferred follows the hook's result, so a hook
    /// returning a deferred or coroutine delays readiness until it settles.
    pub fn on_start<F, R>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut S, &ActorRef) -> R + Send + 'static,
        R: Into<Async>,
    {
        self.on_start = Some(Box::new(move |state, actor| hook(state, actor).into()));
        self
    }

    /// Run `hook` on the actor's thread once its loop exits.
    pub fn on_stop<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(&mut S, &ActorRef) + Send + 'static,
    {
        self.on_stop = Some(Box::new(hook));
        self
    }
}

impl<S> fmt::Debug for ActorSpec<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSpec")
            .field("actions", &self.actions)
            .field("on_start", &self.on_start.is_some())
            .field("on_stop", &self.on_stop.is_some())
            .finish()
    }
}

/// What the actor loop drives.
pub(crate) trait Behavior: Send {
    fn start(&mut self, actor: &ActorRef) -> Async;

    fn handle(&mut self, actor: &ActorRef, action: &str, args: Vec<Value>) -> Option<Async>;

    fn stop(&mut self, actor: &ActorRef);
}

struct Hosted<S> {
    state: S,
    actions: Actions<S>,
    on_start: Option<StartHook<S>>,
    on_stop: Option<StopHook<S>>,
}

impl<S: Send + 'static> Behavior for Hosted<S> {
    fn start(&mut self, actor: &ActorRef) -> Async {
        match self.on_start.take() {
            Some(hook) => hook(&mut self.state, actor),
            None => Async::Value(Value::Bool(true)),
        }
    }

    fn handle(&mut self, actor: &ActorRef, action: &str, args: Vec<Value>) -> Option<Async> {
        self.actions.dispatch(&mut self.state, actor, action, args)
    }

    fn stop(&mut self, actor: &ActorRef) {
        if let Some(hook) = self.on_stop.take() {
            hook(&mut self.state, actor);
        }
    }
}

/// An actor definition with its state type erased.
pub struct Spawnable {
    pub(crate) behavior: Box<dyn Behavior>,
    pub(crate) actions: Vec<String>,
    problems: Result<(), ConcurrencyError>,
}

impl Spawnable {
    /// Names of the actions this actor defines beyond the built-in ones.
    pub fn actions(&self) -> &[String] {
        &self.actions
    }

    pub(crate) fn validate(&self, name: &str) -> Result<(), ConcurrencyError> {
        match &self.problems {
            Ok(()) => Ok(()),
            Err(ConcurrencyError::InvalidActions { reason, .. }) => {
                Err(ConcurrencyError::InvalidActions {
                    actor: name.to_string(),
                    reason: reason.clone(),
                })
            }
            Err(other) => Err(other.clone()),
        }
    }
}

impl<S: Send + 'static> From<ActorSpec<S>> for Spawnable {
    fn from(spec: ActorSpec<S>) -> Self {
        let problems = spec.actions.validate("");
        let actions = spec.actions.names().to_vec();
        Self {
            behavior: Box::new(Hosted {
                state: spec.state,
                actions: spec.actions,
                on_start: spec.on_start,
                on_stop: spec.on_stop,
            }),
            actions,
            problems,
        }
    }
}

impl fmt::Debug for Spawnable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Spawnable")
            .field("actions", &self.actions)
            .field("valid", &self.problems.is_ok())
            .finish()
    }
}
