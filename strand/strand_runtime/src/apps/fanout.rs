//! Fan-out application.
//!
//! Every worker answers `run_task [n]` by summing the squares `1..=n`, one
//! intermediate deferred per term. Each term is produced on the timer
//! thread after `delay_ms`, so a worker keeps serving other requests while
//! its tasks are suspended. A finished task reports to the application's
//! monitor with `test_result [tag, worker, payload]`; the monitor keeps
//! those reports and answers `results` and `summary`.

use std::time::Duration;

use serde_json::json;
use strand_concurrency::actor::{Actions, ActorRef, ActorSpec, Application, Spawnable, MONITOR};
use strand_concurrency::deferred::{coroutine, Async, Deferred, Failure, Step};
use strand_concurrency::scheduler;
use strand_core::value::{arg, as_i64};
use strand_core::{Error, Value};
use tracing::debug;

/// Name the application and its monitor are registered under.
pub const NAME: &str = "fanout";

const DEFAULT_TAG: &str = "fanout";

/// The fan-out application.
#[derive(Debug, Clone, Default)]
pub struct FanoutApp {
    workers: Option<usize>,
}

impl FanoutApp {
    /// An application using the configured worker count.
    pub fn new() -> Self {
        Self::default()
    }

    /// An application with `workers` workers unless the run configuration
    /// says otherwise.
    pub fn with_workers(workers: usize) -> Self {
        Self {
            workers: Some(workers),
        }
    }
}

impl Application for FanoutApp {
    fn name(&self) -> &str {
        NAME
    }

    fn workers(&self) -> Option<usize> {
        self.workers
    }

    fn monitor(&self, _cfg: &Value) -> Spawnable {
        let actions = Actions::new()
            .action("test_result", |reports: &mut Vec<Report>, _: &ActorRef, args| {
                Report::from_args(&args).map(|report| {
                    reports.push(report);
                    Value::Null
                })
            })
            .action("results", |reports: &mut Vec<Report>, _: &ActorRef, _| {
                json!(reports.iter().map(Report::to_value).collect::<Vec<_>>())
            })
            .action("summary", |reports: &mut Vec<Report>, _: &ActorRef, _| {
                summarize(reports)
            });

        ActorSpec::new(Vec::<Report>::new()).actions(actions).into()
    }

    fn worker(&self, _index: usize, cfg: &Value) -> Spawnable {
        let state = Worker {
            tag: cfg
                .get("tag")
                .and_then(Value::as_str)
                .unwrap_or(DEFAULT_TAG)
                .to_string(),
            delay: Duration::from_millis(cfg.get("delay_ms").and_then(Value::as_u64).unwrap_or(0)),
            completed: 0,
        };

        let actions = Actions::new()
            .action("run_task", |worker: &mut Worker, actor: &ActorRef, args| {
                worker.run_task(actor, args)
            })
            .action("completed", |worker: &mut Worker, _: &ActorRef, _| {
                json!(worker.completed)
            });

        ActorSpec::new(state).actions(actions).into()
    }
}

struct Worker {
    tag: String,
    delay: Duration,
    completed: u64,
}

impl Worker {
    fn run_task(&mut self, actor: &ActorRef, args: Vec<Value>) -> Async {
        let n = match arg(&args, 0).and_then(as_i64) {
            Ok(n) if n >= 0 => n,
            Ok(n) => return Error::Value(format!("run_task expects n >= 0, got {}", n)).into(),
            Err(e) => return e.into(),
        };
        self.completed += 1;

        let actor = actor.clone();
        let tag = self.tag.clone();
        let delay = self.delay;
        let mut term = 0;
        let mut sum = 0;

        coroutine(move |input| -> Result<Step, Failure> {
            if !input.is_start() {
                sum += as_i64(&input.value()?)?;
            }
            if term < n {
                term += 1;
                return Ok(Step::wait_on(square_later(term, delay)));
            }

            let payload = json!({ "n": n, "sum": sum });
            actor.notify(
                MONITOR,
                "test_result",
                vec![json!(tag), json!(actor.name()), payload.clone()],
            )?;
            Ok(Step::Return(payload))
        })
    }
}

// Resolves with `term * term` on the timer thread.
fn square_later(term: i64, delay: Duration) -> Deferred {
    if delay.is_zero() {
        return Deferred::resolved(json!(term * term));
    }

    let square = Deferred::new();
    let pending = square.clone();
    scheduler::global().schedule(delay, move || {
        if let Err(e) = pending.resolve(json!(term * term)) {
            debug!("Square of {} arrived after its deferred settled: {}", term, e);
        }
    });
    square
}

/// A `test_result` notification as kept by the monitor.
#[derive(Debug, Clone, PartialEq)]
struct Report {
    tag: String,
    worker: String,
    payload: Value,
}

impl Report {
    fn from_args(args: &[Value]) -> Result<Self, Error> {
        let text = |index| -> Result<String, Error> {
            let value = arg(args, index)?;
            value
                .as_str()
                .map(str::to_string)
                .ok_or_else(|| Error::Type(format!("expected a string, got {}", value)))
        };

        Ok(Self {
            tag: text(0)?,
            worker: text(1)?,
            payload: args.get(2).cloned().unwrap_or(Value::Null),
        })
    }

    fn to_value(&self) -> Value {
        json!({
            "tag": self.tag,
            "worker": self.worker,
            "payload": self.payload,
        })
    }
}

fn summarize(reports: &[Report]) -> Value {
    let mut per_worker = serde_json::Map::new();
    let mut sum = 0;
    for report in reports {
        let count = per_worker
            .entry(report.worker.clone())
            .or_insert_with(|| json!(0));
        *count = json!(count.as_u64().unwrap_or(0) + 1);
        sum += report.payload.get("sum").and_then(Value::as_i64).unwrap_or(0);
    }

    json!({
        "tasks": reports.len(),
        "sum": sum,
        "workers": per_worker,
    })
}
