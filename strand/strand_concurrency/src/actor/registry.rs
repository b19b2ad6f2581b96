//! Name registry of an actor system.
//!
//! Only the arbiter's thread writes to the registry once the system is up;
//! any thread may read. Names are claimed for the lifetime of the system
//! and never handed out twice.

use dashmap::{DashMap, DashSet};
use log::debug;
use strand_core::ConcurrencyError;

use super::{ActorKind, ActorRef};

#[derive(Default)]
pub(crate) struct Registry {
    actors: DashMap<String, ActorRef>,
    claimed: DashSet<String>,
}

impl Registry {
    pub(crate) fn claim(&self, name: &str) -> Result<(), ConcurrencyError> {
        if self.claimed.insert(name.to_string()) {
            Ok(())
        } else {
            Err(ConcurrencyError::DuplicateActor(name.to_string()))
        }
    }

    pub(crate) fn insert(&self, actor: ActorRef) {
        debug!("Registered actor: {} ({:?})", actor.name(), actor.kind());
        self.actors.insert(actor.name().to_string(), actor);
    }

    pub(crate) fn remove(&self, name: &str) {
        if self.actors.remove(name).is_some() {
            debug!("Deregistered actor: {}", name);
        }
    }

    /// The live actor registered under `name`.
    pub(crate) fn get(&self, name: &str) -> Option<ActorRef> {
        self.actors
            .get(name)
            .map(|entry| entry.value().clone())
            .filter(ActorRef::is_alive)
    }

    pub(crate) fn all(&self) -> Vec<ActorRef> {
        self.actors
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Workers owned by the monitor `owner`, in name order.
    pub(crate) fn workers_of(&self, owner: &str) -> Vec<ActorRef> {
        let mut workers: Vec<ActorRef> = self
            .actors
            .iter()
            .filter(|entry| {
                let actor = entry.value();
                actor.kind() == ActorKind::Worker && actor.owner() == Some(owner)
            })
            .map(|entry| entry.value().clone())
            .collect();
        workers.sort_by(|a, b| a.name().cmp(b.name()));
        workers
    }

    pub(crate) fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .actors
            .iter()
            .filter(|entry| entry.value().is_alive())
            .map(|entry| entry.key().clone())
            .collect();
        names.sort();
        names
    }

    pub(crate) fn len(&self) -> usize {
        self.actors.len()
    }
}
