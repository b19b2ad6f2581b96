//! Applications and the arbiter.
//!
//! The arbiter is the root of the supervision tree. It spawns each
//! application as one monitor plus a set of workers owned by that monitor,
//! stops actors on request (a monitor always together with its workers) and
//! drives the shutdown of the whole system. Being the only actor that
//! spawns or retires others, it is also the single writer of the registry.

use std::sync::{Arc, Weak};

use log::{debug, info, warn};
use serde_json::json;
use strand_core::value::{arg, as_str};
use strand_core::{ConcurrencyError, Error, Value};

use super::action::Actions;
use super::cell::{self, ActorKind, ActorRef, Placement};
use super::send::{ARBITER, MONITOR};
use super::spec::{ActorSpec, Spawnable};
use super::system::SystemShared;
use crate::deferred::combinators::all_values;
use crate::deferred::{multi_async, Deferred, Outcome};

/// A group of actors run together under one monitor.
///
/// The monitor is registered under the application's name; workers are
/// named `<app>-worker-<index>`. Both receive the configuration value the
/// application was run with.
pub trait Application: Send + Sync + 'static {
    /// Name of the application and of its monitor.
    fn name(&self) -> &str;

    /// Number of workers, or `None` for the system default.
    ///
    /// A `"workers"` entry in the run configuration takes precedence.
    fn workers(&self) -> Option<usize> {
        None
    }

    /// The monitor actor. Defaults to an actor with only the built-in
    /// actions.
    fn monitor(&self, _cfg: &Value) -> Spawnable {
        ActorSpec::new(()).into()
    }

    /// Worker number `index`.
    fn worker(&self, index: usize, cfg: &Value) -> Spawnable;
}

struct ArbiterState {
    system: Weak<SystemShared>,
}

/// The arbiter's definition.
pub(crate) fn arbiter(system: Weak<SystemShared>) -> Spawnable {
    let actions = Actions::<ArbiterState>::new()
        .action("run", |state, _, args| state.run(args))
        .action("kill_actor", |state, arbiter, args| state.kill_actor(arbiter, args))
        .action("list", |state, _, _| state.list())
        .action("stop", |state, arbiter, _| state.shutdown(arbiter));

    ActorSpec::new(ArbiterState { system })
        .actions(actions)
        .on_stop(|_, arbiter| info!("Arbiter {} stopped", arbiter))
        .into()
}

impl ArbiterState {
    fn system(&self) -> Result<Arc<SystemShared>, Error> {
        self.system
            .upgrade()
            .ok_or_else(|| ConcurrencyError::SystemShuttingDown.into())
    }

    fn run(&mut self, args: Vec<Value>) -> Result<Deferred, Error> {
        let system = self.system()?;
        if system.shutting_down.is_set() {
            return Err(ConcurrencyError::SystemShuttingDown.into());
        }

        let name = as_str(arg(&args, 0)?)?.to_string();
        if name == MONITOR {
            return Err(Error::Value(format!("{} is a reserved actor name", name)));
        }
        let cfg = args.get(1).cloned().unwrap_or(Value::Null);
        let application = system
            .applications
            .get(&name)
            .map(|entry| Arc::clone(entry.value()))
            .ok_or_else(|| ConcurrencyError::ApplicationNotFound(name.clone()))?;

        let count = cfg
            .get("workers")
            .and_then(Value::as_u64)
            .map(|n| n as usize)
            .or_else(|| application.workers())
            .unwrap_or(system.config.default_workers);
        info!("Starting application {} with {} workers", name, count);

        let mut placements = Vec::with_capacity(count + 1);
        placements.push((
            application.monitor(&cfg),
            Placement {
                name: name.clone(),
                kind: ActorKind::Monitor,
                owner: Some(ARBITER.to_string()),
                app: Some(name.clone()),
                cfg: cfg.clone(),
            },
        ));
        for index in 0..count {
            placements.push((
                application.worker(index, &cfg),
                Placement {
                    name: format!("{}-worker-{}", name, index),
                    kind: ActorKind::Worker,
                    owner: Some(name.clone()),
                    app: Some(name.clone()),
                    cfg: cfg.clone(),
                },
            ));
        }

        let mut spawned: Vec<ActorRef> = Vec::with_capacity(placements.len());
        for (spawnable, placement) in placements {
            match cell::spawn(&system, spawnable, placement) {
                Ok(actor) => spawned.push(actor),
                Err(e) => {
                    warn!("Application {} failed to start: {}", name, e);
                    for actor in &spawned {
                        actor.request_stop();
                    }
                    return Err(e.into());
                }
            }
        }

        let started: Vec<Deferred> = spawned.iter().map(ActorRef::started).collect();

        Ok(multi_async(started).add_callback(move |outcomes| match all_values(outcomes) {
            Ok(_) => {
                debug!("Application {} ready", name);
                let workers: Vec<&str> = spawned[1..].iter().map(ActorRef::name).collect();
                Ok(json!({
                    "app": name,
                    "monitor": spawned[0].info(),
                    "workers": workers,
                }))
            }
            Err(failure) => {
                for actor in &spawned {
                    actor.request_stop();
                }
                Err(failure)
            }
        }))
    }

    fn kill_actor(&mut self, arbiter: &ActorRef, args: Vec<Value>) -> Result<Deferred, Error> {
        let system = self.system()?;
        let name = as_str(arg(&args, 0)?)?;
        if name == ARBITER {
            return self.shutdown(arbiter);
        }

        let target = system
            .registry
            .get(name)
            .ok_or_else(|| ConcurrencyError::ActorNotFound(name.to_string()))?;
        let mut doomed = vec![target.clone()];
        if target.kind() == ActorKind::Monitor {
            doomed.extend(system.registry.workers_of(name));
        }

        Ok(stop_all(doomed))
    }

    fn list(&mut self) -> Result<Value, Error> {
        Ok(json!(self.system()?.registry.names()))
    }

    fn shutdown(&mut self, arbiter: &ActorRef) -> Result<Deferred, Error> {
        let system = self.system()?;
        if !system.shutting_down.try_set() {
            debug!("Shutdown already in progress");
        }

        let others: Vec<ActorRef> = system
            .registry
            .all()
            .into_iter()
            .filter(|actor| actor != arbiter)
            .collect();
        info!("Stopping {} actors", others.len());

        let arbiter = arbiter.clone();
        Ok(stop_all(others).add_callback(move |names: Value| {
            arbiter.request_stop();
            names
        }))
    }
}

// Resolves with the stopped names once every actor's loop exited.
fn stop_all(actors: Vec<ActorRef>) -> Deferred {
    for actor in &actors {
        actor.request_stop();
    }
    let names: Vec<String> = actors.iter().map(|a| a.name().to_string()).collect();
    debug!("Stopping actors: {:?}", names);
    multi_async(actors.iter().map(ActorRef::stopped)).add_callback(move |outcomes: Vec<Outcome>| {
        for failure in outcomes.iter().filter_map(|outcome| outcome.as_ref().err()) {
            debug!("Actor stopped with failure: {}", failure);
            failure.mute();
        }
        json!(names)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actor::{ActorSystem, ActorSystemConfig};
    use std::time::Duration;

    struct Idle;

    impl Application for Idle {
        fn name(&self) -> &str {
            "idle"
        }

        fn workers(&self) -> Option<usize> {
            Some(2)
        }

        fn worker(&self, _index: usize, _cfg: &Value) -> Spawnable {
            ActorSpec::new(()).into()
        }
    }

    const WAIT: Duration = Duration::from_secs(5);

    fn system() -> ActorSystem {
        ActorSystem::with_config(ActorSystemConfig {
            mailbox_capacity: 64,
            default_workers: 1,
            thread_name_prefix: "supervisor-test".to_string(),
        })
        .unwrap()
    }

    #[test]
    fn test_run_spawns_monitor_and_workers() {
        let system = system();
        let handle = system.run(Idle, Value::Null).unwrap().wait(WAIT).unwrap();
        assert_eq!(handle["app"], json!("idle"));
        assert_eq!(handle["monitor"]["name"], json!("idle"));
        assert_eq!(handle["monitor"]["kind"], json!("monitor"));
        assert_eq!(handle["monitor"]["owner"], json!("arbiter"));
        assert_eq!(handle["workers"], json!(["idle-worker-0", "idle-worker-1"]));

        let names = system.send("arbiter", "list", vec![]).unwrap().wait(WAIT).unwrap();
        assert_eq!(
            names,
            json!(["arbiter", "idle", "idle-worker-0", "idle-worker-1"])
        );
        system.shutdown(WAIT).unwrap();
    }

    #[test]
    fn test_workers_override_from_cfg() {
        let system = system();
        let handle = system
            .run(Idle, json!({"workers": 3}))
            .unwrap()
            .wait(WAIT)
            .unwrap();
        assert_eq!(handle["workers"].as_array().unwrap().len(), 3);
        system.shutdown(WAIT).unwrap();
    }

    #[test]
    fn test_kill_monitor_stops_workers() {
        let system = system();
        system.run(Idle, Value::Null).unwrap().wait(WAIT).unwrap();

        let killed = system.kill_actor("idle").unwrap().wait(WAIT).unwrap();
        assert_eq!(killed, json!(["idle", "idle-worker-0", "idle-worker-1"]));
        assert!(system.actor("idle-worker-0").is_none());
        assert!(system.send("idle", "ping", vec![]).is_err());
        system.shutdown(WAIT).unwrap();
    }

    #[test]
    fn test_running_twice_reuses_no_names() {
        let system = system();
        system.run(Idle, Value::Null).unwrap().wait(WAIT).unwrap();
        let failure = system
            .run_application("idle", Value::Null)
            .unwrap()
            .wait(WAIT)
            .unwrap_err();
        assert_eq!(
            failure.error(),
            &Error::Concurrency(ConcurrencyError::DuplicateActor("idle".into()))
        );
        system.shutdown(WAIT).unwrap();
    }
}
