//! Integration tests for the actor tree.
//!
//! These tests run small applications on a real system and verify request
//! ordering, addressing, coroutines spanning several actors, timeouts and
//! the lifecycle of actors from spawn to shutdown.

use std::time::Duration;

use serde_json::json;
use strand_concurrency::actor::{
    self, Actions, ActorKind, ActorRef, ActorSpec, ActorStatus, ActorSystem, ActorSystemConfig,
    Application, Spawnable,
};
use strand_concurrency::deferred::{coroutine, Deferred, Failure, Step};
use strand_concurrency::Value;
use strand_core::value::as_i64;
use strand_core::{ConcurrencyError, DeferredError, Error};

const WAIT: Duration = Duration::from_secs(5);

/// Two counting workers and a monitor collecting reports.
struct Calc;

#[derive(Default)]
struct Tally {
    count: i64,
    // Replies that never settle on their own
    parked: Vec<Deferred>,
}

impl Application for Calc {
    fn name(&self) -> &str {
        "calc"
    }

    fn workers(&self) -> Option<usize> {
        Some(2)
    }

    fn monitor(&self, _cfg: &Value) -> Spawnable {
        ActorSpec::new(Vec::<Value>::new())
            .actions(
                Actions::new()
                    .action("test_result", |results: &mut Vec<Value>, _: &ActorRef, args| {
                        results.push(Value::Array(args));
                        Value::Null
                    })
                    .action("results", |results: &mut Vec<Value>, _: &ActorRef, _| {
                        json!(results.clone())
                    }),
            )
            .into()
    }

    fn worker(&self, _index: usize, _cfg: &Value) -> Spawnable {
        ActorSpec::new(Tally::default())
            .actions(
                Actions::new()
                    .action("increment", |tally: &mut Tally, _: &ActorRef, _| {
                        tally.count += 1;
                        json!(tally.count)
                    })
                    .typed_action("double", |_: &mut Tally, (n,): (i64,)| Ok(n * 2))
                    .action("relay", |_: &mut Tally, actor: &ActorRef, args| {
                        let mut reply = Some(actor.send("calc-worker-1", "double", args));
                        coroutine(move |input| match reply.take() {
                            Some(reply) => Ok(Step::wait_on(reply?)),
                            None => Ok(Step::Return(json!(as_i64(&input.value()?)? + 1))),
                        })
                    })
                    .action("report", |tally: &mut Tally, actor: &ActorRef, _| {
                        let report = vec![json!(actor.name()), json!(tally.count)];
                        actor::notify("monitor", "test_result", report).map(|_| json!(true))
                    })
                    .action("slow", |tally: &mut Tally, _: &ActorRef, _| {
                        let reply = Deferred::new();
                        tally.parked.push(reply.clone());
                        reply
                    })
                    .action("block", |_: &mut Tally, _: &ActorRef, _| -> Result<Value, Failure> {
                        Deferred::<Value>::new().wait(Duration::from_millis(10))
                    })
                    .action("boom", |_: &mut Tally, _: &ActorRef, _| -> Value {
                        panic!("worker exploded")
                    }),
            )
            .into()
    }
}

/// A worker whose start hook fails.
struct Broken;

impl Application for Broken {
    fn name(&self) -> &str {
        "broken"
    }

    fn workers(&self) -> Option<usize> {
        Some(1)
    }

    fn worker(&self, _index: usize, _cfg: &Value) -> Spawnable {
        ActorSpec::new(())
            .on_start(|_: &mut (), _: &ActorRef| Error::Runtime("no disk".into()))
            .into()
    }
}

fn system() -> ActorSystem {
    ActorSystem::with_config(ActorSystemConfig {
        mailbox_capacity: 256,
        default_workers: 1,
        thread_name_prefix: "actor-test".to_string(),
    })
    .unwrap()
}

fn call(system: &ActorSystem, target: &str, action: &str, args: Vec<Value>) -> Value {
    system
        .send(target, action, args)
        .unwrap()
        .wait(WAIT)
        .unwrap()
}

fn calc() -> ActorSystem {
    let system = system();
    system.run(Calc, Value::Null).unwrap().wait(WAIT).unwrap();
    system
}

#[test]
fn test_requests_run_in_arrival_order() {
    let system = calc();

    let replies: Vec<Deferred> = (0..100)
        .map(|_| system.send("calc-worker-0", "increment", vec![]).unwrap())
        .collect();
    let values: Vec<Value> = replies.iter().map(|r| r.wait(WAIT).unwrap()).collect();

    assert_eq!(values, (1..=100).map(|n| json!(n)).collect::<Vec<_>>());
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_unknown_target_fails_synchronously() {
    let system = calc();
    let error = system.send("nobody", "ping", vec![]).unwrap_err();
    assert_eq!(
        error,
        Error::Concurrency(ConcurrencyError::ActorNotFound("nobody".into()))
    );
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_unknown_action_fails_reply() {
    let system = calc();
    let failure = system
        .send("calc-worker-0", "fly", vec![])
        .unwrap()
        .wait(WAIT)
        .unwrap_err();
    assert_eq!(
        failure.error(),
        &Error::Concurrency(ConcurrencyError::ActionNotFound {
            actor: "calc-worker-0".into(),
            action: "fly".into(),
        })
    );
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_builtin_actions() {
    let system = calc();

    assert_eq!(call(&system, "calc-worker-1", "ping", vec![]), json!("pong"));
    assert_eq!(
        call(&system, "calc-worker-1", "echo", vec![json!(1), json!("a")]),
        json!([1, "a"])
    );
    assert_eq!(
        call(&system, "calc", "workers", vec![]),
        json!(["calc-worker-0", "calc-worker-1"])
    );

    let info = call(&system, "calc-worker-1", "info", vec![]);
    assert_eq!(info["kind"], json!("worker"));
    assert_eq!(info["owner"], json!("calc"));
    assert_eq!(info["status"], json!("running"));
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_worker_reports_to_its_monitor() {
    let system = calc();
    call(&system, "calc-worker-0", "increment", vec![]);

    assert_eq!(call(&system, "calc-worker-0", "report", vec![]), json!(true));
    assert_eq!(call(&system, "calc-worker-1", "report", vec![]), json!(true));
    assert_eq!(
        call(&system, "calc", "results", vec![]),
        json!([["calc-worker-0", 1], ["calc-worker-1", 0]])
    );
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_coroutine_awaits_another_actor() {
    let system = calc();
    assert_eq!(
        call(&system, "calc-worker-0", "relay", vec![json!(20)]),
        json!(41)
    );

    let failure = system
        .send("calc-worker-0", "relay", vec![json!("bla")])
        .unwrap()
        .wait(WAIT)
        .unwrap_err();
    assert!(matches!(failure.error(), Error::Serialization(_)));
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_send_with_timeout() {
    let system = calc();
    let reply = system
        .send_with_timeout("calc-worker-0", "slow", vec![], Duration::from_millis(50))
        .unwrap();

    let failure = reply.wait(WAIT).unwrap_err();
    assert!(failure.is_timeout());
    assert!(reply.is_timed_out());

    // The worker is still responsive
    assert_eq!(call(&system, "calc-worker-0", "ping", vec![]), json!("pong"));
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_blocking_inside_actor_is_refused() {
    let system = calc();
    let failure = system
        .send("calc-worker-0", "block", vec![])
        .unwrap()
        .wait(WAIT)
        .unwrap_err();
    assert_eq!(
        failure.error(),
        &Error::Deferred(DeferredError::WouldBlock("calc-worker-0".into()))
    );
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_panicking_action_keeps_actor_alive() {
    let system = calc();
    let failure = system
        .send("calc-worker-1", "boom", vec![])
        .unwrap()
        .wait(WAIT)
        .unwrap_err();
    assert_eq!(failure.error(), &Error::Panic("worker exploded".into()));
    assert_eq!(call(&system, "calc-worker-1", "increment", vec![]), json!(1));
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_failed_start_fails_handle() {
    let system = system();
    let failure = system
        .run(Broken, Value::Null)
        .unwrap()
        .wait(WAIT)
        .unwrap_err();
    assert_eq!(failure.error(), &Error::Runtime("no disk".into()));
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_actor_stops_itself() {
    let system = calc();
    let worker = system.actor("calc-worker-1").unwrap();

    let stopped = call(&system, "calc-worker-1", "stop", vec![]);
    assert_eq!(stopped, json!(["calc-worker-1"]));
    assert_eq!(worker.status(), ActorStatus::Dead);

    let error = system.send("calc-worker-1", "ping", vec![]).unwrap_err();
    assert_eq!(
        error,
        Error::Concurrency(ConcurrencyError::ActorNotFound("calc-worker-1".into()))
    );
    // The sibling is unaffected
    assert_eq!(call(&system, "calc-worker-0", "ping", vec![]), json!("pong"));
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_actors_listing() {
    let system = calc();
    let kinds: Vec<(String, ActorKind)> = system
        .actors()
        .into_iter()
        .map(|info| (info.name, info.kind))
        .collect();
    assert_eq!(
        kinds,
        vec![
            ("arbiter".to_string(), ActorKind::Arbiter),
            ("calc".to_string(), ActorKind::Monitor),
            ("calc-worker-0".to_string(), ActorKind::Worker),
            ("calc-worker-1".to_string(), ActorKind::Worker),
        ]
    );
    system.shutdown(WAIT).unwrap();
}

#[test]
fn test_shutdown_stops_everything() {
    let system = calc();
    let worker = system.actor("calc-worker-0").unwrap();

    system.shutdown(WAIT).unwrap();

    assert!(system.is_shutting_down());
    assert_eq!(worker.status(), ActorStatus::Dead);
    assert_eq!(system.actor_count(), 0);
    assert!(system.send("arbiter", "ping", vec![]).is_err());
    assert!(system.run(Calc, Value::Null).is_err());
}
