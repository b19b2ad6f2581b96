//! Coroutines and their driver.
//!
//! A coroutine is a resumable computation written as a state machine: each
//! call to [`Coroutine::resume`] either asks the driver to wait on something
//! ([`Step::Await`]) or finishes with a value ([`Step::Return`]). The driver
//! feeds back the awaited outcome as the next [`Resume`] input, turning the
//! whole computation into a [`Deferred`].
//!
//! Already-resolved awaits resume synchronously in a loop, so long chains of
//! immediate values never grow the stack. Pending awaits park the driver on
//! a continuation; inside an actor the resumption is delivered through the
//! actor's mailbox, which keeps every step of the coroutine on the actor's
//! own thread.

use std::panic::{self, AssertUnwindSafe, Location};
use std::time::{Duration, Instant};

use log::trace;
use strand_core::{Error, Value};

use super::combinators::Async;
use super::failure::Failure;
use super::{Deferred, Outcome};
use crate::actor::{context, ActorRef};

/// The input a coroutine is resumed with.
#[derive(Debug)]
pub enum Resume {
    /// First resumption, nothing awaited yet
    Start,

    /// The awaited operation produced a value
    Value(Value),

    /// The awaited operation failed
    Failure(Failure),
}

impl Resume {
    /// The resumed value, re-raising a failure.
    ///
    /// Lets a coroutine write `let reply = input.value()?;` and have an
    /// unhandled failure end the coroutine with that failure.
    pub fn value(self) -> Result<Value, Failure> {
        match self {
            Self::Start => Ok(Value::Null),
            Self::Value(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }

    /// Whether this is the first resumption.
    pub fn is_start(&self) -> bool {
        matches!(self, Self::Start)
    }
}

/// What a coroutine asks of its driver.
#[derive(Debug)]
pub enum Step {
    /// Suspend until the operation settles
    Await(Async),

    /// Finish with a value
    Return(Value),
}

impl Step {
    /// Suspend on anything convertible to [`Async`].
    pub fn wait_on(x: impl Into<Async>) -> Self {
        Self::Await(x.into())
    }
}

/// A resumable computation.
pub trait Coroutine: Send + 'static {
    /// Advance to the next suspension point or to completion.
    fn resume(&mut self, input: Resume) -> Result<Step, Failure>;
}

impl<F> Coroutine for F
where
    F: FnMut(Resume) -> Result<Step, Failure> + Send + 'static,
{
    fn resume(&mut self, input: Resume) -> Result<Step, Failure> {
        self(input)
    }
}

/// Wrap a closure state machine as an [`Async`] coroutine value.
pub fn coroutine<F>(body: F) -> Async
where
    F: FnMut(Resume) -> Result<Step, Failure> + Send + 'static,
{
    Async::Coroutine(Box::new(body))
}

/// Driver settings.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DriveOptions {
    /// How many failures at suspension points are tolerated before the
    /// coroutine is aborted; `None` means unlimited, `Some(0)` aborts on the
    /// first one.
    pub max_errors: Option<usize>,

    /// Deadline for the whole coroutine, applied to each suspension
    pub timeout: Option<Duration>,
}

impl DriveOptions {
    /// Set the failure allowance.
    pub fn max_errors(mut self, max_errors: usize) -> Self {
        self.max_errors = Some(max_errors);
        self
    }

    /// Set the overall timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Drive `routine` to completion, returning its output deferred.
pub fn drive(routine: Box<dyn Coroutine>, options: DriveOptions) -> Deferred {
    let output = Deferred::new();
    let driver = Driver {
        routine,
        options,
        errors: 0,
        deadline: options.timeout.map(|timeout| Instant::now() + timeout),
        actor: context::get_actor(),
        output: output.clone(),
    };
    trace!("Driving coroutine into deferred {}", output.id());
    driver.run(Resume::Start);
    output
}

struct Driver {
    routine: Box<dyn Coroutine>,
    options: DriveOptions,
    errors: usize,
    deadline: Option<Instant>,
    actor: Option<ActorRef>,
    output: Deferred,
}

impl Driver {
    fn run(mut self, mut input: Resume) {
        loop {
            let step = {
                let routine = &mut self.routine;
                match panic::catch_unwind(AssertUnwindSafe(|| routine.resume(input))) {
                    Ok(step) => step,
                    Err(payload) => Err(Failure::from_panic(payload.as_ref(), Location::caller())),
                }
            };

            let awaited = match step {
                Ok(Step::Await(awaited)) => awaited,
                Ok(Step::Return(value)) => return self.output.settle(Ok(value)),
                Err(failure) => return self.output.settle(Err(failure)),
            };

            let outcome = match awaited {
                Async::Value(value) => Ok(value),
                Async::Failure(failure) => Err(failure),
                Async::Deferred(deferred) => match deferred.peek() {
                    Some(outcome) => outcome,
                    None => return self.park(deferred),
                },
                Async::Coroutine(nested) => {
                    let options = DriveOptions {
                        max_errors: None,
                        timeout: self.remaining(),
                    };
                    let deferred = drive(nested, options);
                    match deferred.peek() {
                        Some(outcome) => outcome,
                        None => return self.park(deferred),
                    }
                }
            };

            input = match self.deliver(outcome) {
                Some(input) => input,
                None => return,
            };
        }
    }

    fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    // Count failures against the allowance; `None` means the output was
    // settled and the coroutine is abandoned.
    fn deliver(&mut self, outcome: Outcome) -> Option<Resume> {
        match outcome {
            Ok(value) => Some(Resume::Value(value)),
            Err(failure) => {
                self.errors += 1;
                match self.options.max_errors {
                    Some(max_errors) if self.errors > max_errors => {
                        trace!(
                            "Coroutine for deferred {} aborted after {} failures",
                            self.output.id(),
                            self.errors
                        );
                        self.output.settle(Err(failure));
                        None
                    }
                    _ => Some(Resume::Failure(failure)),
                }
            }
        }
    }

    fn park(self, awaited: Deferred) {
        let awaited = match (self.remaining(), self.options.timeout) {
            (Some(remaining), Some(timeout)) => guard(awaited, remaining, timeout),
            _ => awaited,
        };
        let awaited = match &self.actor {
            Some(actor) => actor.adopt(&awaited),
            None => awaited,
        };

        awaited.subscribe(Box::new(move |outcome| {
            let mut driver = self;
            if let Some(input) = driver.deliver(outcome) {
                driver.run(input);
            }
        }));
    }
}

// A deferred following `awaited` that times out once `remaining` elapses.
fn guard(awaited: Deferred, remaining: Duration, timeout: Duration) -> Deferred {
    if remaining.is_zero() {
        return Deferred::failed(Failure::new(Error::Timeout(timeout)));
    }

    let guarded = Deferred::new();
    let target = guarded.clone();
    awaited.subscribe(Box::new(move |outcome| target.settle(outcome)));
    guarded.set_timeout(remaining);
    guarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strand_core::value::as_i64;

    fn add_two(awaited: Deferred) -> Async {
        let mut awaited = Some(awaited);
        coroutine(move |input| match awaited.take() {
            Some(deferred) => Ok(Step::wait_on(deferred)),
            None => {
                let number = as_i64(&input.value()?)?;
                Ok(Step::Return(json!(number + 2)))
            }
        })
    }

    fn into_deferred(x: Async) -> Deferred {
        match x {
            Async::Coroutine(routine) => drive(routine, DriveOptions::default()),
            other => panic!("expected a coroutine, got {:?}", other),
        }
    }

    #[test]
    fn test_coroutine_waits_for_pending_deferred() {
        let input = Deferred::new();
        let output = into_deferred(add_two(input.clone()));

        assert!(output.is_pending());
        input.resolve(json!(1)).unwrap();
        assert_eq!(output.result().unwrap(), json!(3));
    }

    #[test]
    fn test_coroutine_propagates_type_error() {
        let input = Deferred::new();
        let output = into_deferred(add_two(input.clone()));

        input.resolve(json!("bla")).unwrap();
        assert!(matches!(output.failure().unwrap().error(), Error::Type(_)));
    }

    #[test]
    fn test_immediate_values_resume_synchronously() {
        let mut count = 0;
        let output = into_deferred(coroutine(move |input| {
            if !input.is_start() {
                count += as_i64(&input.value()?)?;
            }
            if count >= 10_000 {
                return Ok(Step::Return(json!(count)));
            }
            Ok(Step::wait_on(json!(1)))
        }));

        assert_eq!(output.result().unwrap(), json!(10_000));
    }

    #[test]
    fn test_failure_delivered_to_coroutine() {
        let output = into_deferred(coroutine(|input| match input {
            Resume::Start => Ok(Step::wait_on(Error::Runtime("first".into()))),
            Resume::Failure(failure) => Ok(Step::Return(json!(failure.observed().to_string()))),
            Resume::Value(_) => Ok(Step::Return(json!("unexpected"))),
        }));

        assert_eq!(output.result().unwrap(), json!("Runtime error: first"));
    }

    #[test]
    fn test_max_errors_aborts() {
        let options = DriveOptions::default().max_errors(0);
        let output = drive(
            Box::new(|input: Resume| -> Result<Step, Failure> {
                match input {
                    Resume::Start => Ok(Step::wait_on(Error::Runtime("fatal".into()))),
                    _ => Ok(Step::Return(json!("survived"))),
                }
            }),
            options,
        );

        assert_eq!(output.failure().unwrap().error(), &Error::Runtime("fatal".into()));
    }

    #[test]
    fn test_max_errors_allows_budget() {
        let mut attempts = 0;
        let options = DriveOptions::default().max_errors(2);
        let output = drive(
            Box::new(move |_input: Resume| -> Result<Step, Failure> {
                attempts += 1;
                if attempts <= 2 {
                    Ok(Step::wait_on(Error::Runtime("retry".into())))
                } else {
                    Ok(Step::Return(json!(attempts)))
                }
            }),
            options,
        );

        assert_eq!(output.result().unwrap(), json!(3));
    }

    #[test]
    fn test_timeout_resumes_with_timeout_failure() {
        let never: Deferred = Deferred::new();
        let options = DriveOptions::default().timeout(Duration::from_millis(20));
        let mut awaited = Some(never.clone());
        let output = drive(
            Box::new(move |input: Resume| -> Result<Step, Failure> {
                match awaited.take() {
                    Some(deferred) => Ok(Step::wait_on(deferred)),
                    None => match input {
                        Resume::Failure(failure) if failure.is_timeout() => {
                            failure.mute();
                            Ok(Step::Return(json!("timed out")))
                        }
                        other => Ok(Step::Return(json!(format!("{:?}", other)))),
                    },
                }
            }),
            options,
        );

        assert_eq!(output.wait(Duration::from_secs(2)).unwrap(), json!("timed out"));
    }

    #[test]
    fn test_nested_coroutine() {
        let inner = add_two(Deferred::resolved(json!(5)));
        let mut inner = Some(inner);
        let output = into_deferred(coroutine(move |input| match inner.take() {
            Some(nested) => Ok(Step::Await(nested)),
            None => Ok(Step::Return(input.value()?)),
        }));

        assert_eq!(output.result().unwrap(), json!(7));
    }

    #[test]
    fn test_panicking_coroutine_fails_output() {
        let output = into_deferred(coroutine(|_| -> Result<Step, Failure> {
            panic!("coroutine exploded")
        }));
        assert_eq!(
            output.failure().unwrap().error(),
            &Error::Panic("coroutine exploded".into())
        );
    }
}
