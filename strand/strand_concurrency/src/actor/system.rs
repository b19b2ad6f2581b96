//! Actor system for managing actor lifecycles and interactions.
//!
//! The ActorSystem owns the registry, the application catalogue and the
//! arbiter, the root actor every other actor is spawned through. Handles
//! are cheap to clone and share the same system.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use log::{debug, info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use serde_json::json;
use strand_core::{ConcurrencyError, Error, Value};

use super::cell::{self, ActorInfo, ActorKind, ActorRef, Placement};
use super::registry::Registry;
use super::send::{self, ARBITER};
use super::supervisor::{self, Application};
use super::context;
use crate::deferred::Deferred;
use crate::sync::AtomicFlag;

/// Configuration for the actor system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ActorSystemConfig {
    /// Maximum number of queued requests per actor
    pub mailbox_capacity: usize,
    /// Workers spawned for an application that does not choose a number
    pub default_workers: usize,
    /// Prefix of actor thread names
    pub thread_name_prefix: String,
}

impl Default for ActorSystemConfig {
    fn default() -> Self {
        Self {
            mailbox_capacity: 1024,
            default_workers: num_cpus::get(),
            thread_name_prefix: "strand".to_string(),
        }
    }
}

pub(crate) struct SystemShared {
    pub(crate) config: ActorSystemConfig,
    pub(crate) registry: Registry,
    pub(crate) applications: DashMap<String, Arc<dyn Application>>,
    pub(crate) shutting_down: AtomicFlag,
    arbiter: OnceCell<ActorRef>,
}

impl SystemShared {
    pub(crate) fn arbiter(&self) -> Option<ActorRef> {
        self.arbiter.get().cloned()
    }
}

impl Drop for SystemShared {
    fn drop(&mut self) {
        for actor in self.registry.all() {
            actor.request_stop();
        }
    }
}

/// The central actor system that manages actors
#[derive(Clone)]
pub struct ActorSystem {
    shared: Arc<SystemShared>,
}

impl ActorSystem {
    /// Start a system with the default configuration.
    pub fn start() -> Result<Self, Error> {
        Self::with_config(ActorSystemConfig::default())
    }

    /// Start a system and its arbiter.
    pub fn with_config(config: ActorSystemConfig) -> Result<Self, Error> {
        if config.mailbox_capacity == 0 {
            return Err(Error::Config("mailbox_capacity must be positive".into()));
        }

        info!(
            "Creating actor system (mailbox capacity {}, default workers {})",
            config.mailbox_capacity, config.default_workers
        );

        let shared = Arc::new(SystemShared {
            config,
            registry: Registry::default(),
            applications: DashMap::new(),
            shutting_down: AtomicFlag::new(false),
            arbiter: OnceCell::new(),
        });

        let arbiter = cell::spawn(
            &shared,
            supervisor::arbiter(Arc::downgrade(&shared)),
            Placement {
                name: ARBITER.to_string(),
                kind: ActorKind::Arbiter,
                owner: None,
                app: None,
                cfg: Value::Null,
            },
        )?;
        if shared.arbiter.set(arbiter).is_err() {
            return Err(ConcurrencyError::DuplicateActor(ARBITER.to_string()).into());
        }

        Ok(Self { shared })
    }

    pub(crate) fn from_shared(shared: Arc<SystemShared>) -> Self {
        Self { shared }
    }

    /// The configuration this system runs with.
    pub fn config(&self) -> &ActorSystemConfig {
        &self.shared.config
    }

    /// The root actor.
    pub fn arbiter(&self) -> Option<ActorRef> {
        self.shared.arbiter()
    }

    /// Make an application available to [`ActorSystem::run_application`].
    ///
    /// Registering a name again replaces the earlier application for runs
    /// that start afterwards.
    pub fn register_application<A: Application>(&self, application: A) {
        let name = application.name().to_string();
        if self
            .shared
            .applications
            .insert(name.clone(), Arc::new(application))
            .is_some()
        {
            warn!("Application {} registered again; replacing it", name);
        } else {
            debug!("Registered application {}", name);
        }
    }

    /// Whether an application is registered under `name`.
    pub fn has_application(&self, name: &str) -> bool {
        self.shared.applications.contains_key(name)
    }

    /// Register `application` and run it with `cfg`.
    pub fn run<A: Application>(&self, application: A, cfg: Value) -> Result<Deferred, Error> {
        let name = application.name().to_string();
        self.register_application(application);
        self.run_application(&name, cfg)
    }

    /// Ask the arbiter to spawn a registered application's monitor and
    /// workers.
    ///
    /// The deferred resolves with a handle describing the application once
    /// every one of its actors started.
    pub fn run_application(&self, name: &str, cfg: Value) -> Result<Deferred, Error> {
        if !self.has_application(name) {
            return Err(ConcurrencyError::ApplicationNotFound(name.to_string()).into());
        }
        self.send(ARBITER, "run", vec![json!(name), cfg])
    }

    // Requests from a thread running one of this system's actors are sent
    // on its behalf, so the reply lands on that actor's thread.
    fn sender(&self) -> Option<ActorRef> {
        context::get_actor().filter(|actor| actor.belongs_to(&self.shared))
    }

    /// Send a request to `target`.
    pub fn send(&self, target: &str, action: &str, args: Vec<Value>) -> Result<Deferred, Error> {
        send::route(&self.shared, self.sender().as_ref(), target, action, args, None)
    }

    /// [`ActorSystem::send`] with a timeout forcing the reply to fail.
    pub fn send_with_timeout(
        &self,
        target: &str,
        action: &str,
        args: Vec<Value>,
        timeout: Duration,
    ) -> Result<Deferred, Error> {
        let sender = self.sender();
        send::route(&self.shared, sender.as_ref(), target, action, args, Some(timeout))
    }

    /// Fire-and-forget request.
    pub fn notify(&self, target: &str, action: &str, args: Vec<Value>) -> Result<(), Error> {
        send::discard(self.send(target, action, args)?);
        Ok(())
    }

    /// Stop an actor together with the workers it owns.
    ///
    /// Resolves with the names of the actors asked to stop.
    pub fn kill_actor(&self, name: &str) -> Result<Deferred, Error> {
        self.send(ARBITER, "kill_actor", vec![json!(name)])
    }

    /// A live actor by name.
    pub fn actor(&self, name: &str) -> Option<ActorRef> {
        self.shared.registry.get(name)
    }

    /// Snapshots of every registered actor, in name order.
    pub fn actors(&self) -> Vec<ActorInfo> {
        let mut infos: Vec<ActorInfo> = self
            .shared
            .registry
            .all()
            .iter()
            .map(ActorRef::info)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    /// Number of registered actors, the arbiter included.
    pub fn actor_count(&self) -> usize {
        self.shared.registry.len()
    }

    /// Whether a shutdown was requested.
    pub fn is_shutting_down(&self) -> bool {
        self.shared.shutting_down.is_set()
    }

    /// Stop every actor and wait up to `timeout` for the arbiter to exit.
    ///
    /// Must be called from a thread that is not an actor.
    pub fn shutdown(&self, timeout: Duration) -> Result<(), Error> {
        info!("Shutting down actor system");
        let arbiter = match self.arbiter() {
            Some(arbiter) => arbiter,
            None => return Ok(()),
        };

        if arbiter.is_alive() {
            send::discard(self.send(ARBITER, "stop", vec![])?);
        }
        arbiter
            .stopped()
            .wait(timeout)
            .map_err(|failure| failure.into_error())?;

        info!("Actor system shutdown complete");
        Ok(())
    }
}

impl fmt::Debug for ActorSystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActorSystem")
            .field("config", &self.shared.config)
            .field("actors", &self.shared.registry.len())
            .field("shutting_down", &self.is_shutting_down())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ActorSystemConfig {
        ActorSystemConfig {
            mailbox_capacity: 16,
            default_workers: 2,
            thread_name_prefix: "test".to_string(),
        }
    }

    #[test]
    fn test_system_starts_arbiter() {
        let system = ActorSystem::with_config(small()).unwrap();
        let arbiter = system.arbiter().unwrap();
        assert_eq!(arbiter.name(), "arbiter");
        assert_eq!(arbiter.kind(), ActorKind::Arbiter);
        assert_eq!(
            arbiter.started().wait(Duration::from_secs(5)).unwrap(),
            json!("arbiter")
        );
        assert_eq!(system.actor_count(), 1);
        system.shutdown(Duration::from_secs(5)).unwrap();
        assert!(system.is_shutting_down());
    }

    #[test]
    fn test_zero_capacity_is_rejected() {
        let config = ActorSystemConfig {
            mailbox_capacity: 0,
            ..small()
        };
        assert!(matches!(
            ActorSystem::with_config(config),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_unknown_application() {
        let system = ActorSystem::with_config(small()).unwrap();
        let error = system.run_application("missing", Value::Null).unwrap_err();
        assert_eq!(
            error,
            Error::Concurrency(ConcurrencyError::ApplicationNotFound("missing".into()))
        );
        system.shutdown(Duration::from_secs(5)).unwrap();
    }
}
