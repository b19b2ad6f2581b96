//! Deferred results.
//!
//! A [`Deferred`] is a placeholder for a value that becomes available later.
//! It holds at most one terminal outcome, either a value or a [`Failure`],
//! and an ordered queue of continuations to run once that outcome exists.
//!
//! Chaining never mutates a deferred: every `add_*` method returns a new
//! deferred for the result of the continuation, and the original keeps its
//! own outcome. Continuations run strictly in registration order. A
//! continuation registered while earlier ones are still running (possibly on
//! another thread) is queued behind them.
//!
//! Continuations may return anything implementing [`Chainable`]: a plain
//! value, a failure, a `Result`, another deferred or an [`Async`] holding a
//! coroutine. Deferred and coroutine results are awaited before the chained
//! deferred settles.

use std::collections::VecDeque;
use std::fmt;
use std::panic::{self, AssertUnwindSafe, Location};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::bounded;
use log::{debug, trace};
use parking_lot::Mutex;
use strand_core::{DeferredError, Error, Value};

pub mod combinators;
pub mod coroutine;
pub mod failure;

pub use combinators::{is_async, maybe_async, maybe_async_with, multi_async, Async};
pub use coroutine::{coroutine, drive, Coroutine, DriveOptions, Resume, Step};
pub use failure::{is_failure, maybe_failure, Failure, Frame};

use crate::actor::context;
use crate::scheduler::timer;
use crate::sync::AtomicSequence;

/// Types a deferred can carry.
pub trait Payload: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> Payload for T {}

/// The terminal outcome of a deferred.
pub type Outcome<T = Value> = Result<T, Failure>;

type Callback<T> = Box<dyn FnOnce(Outcome<T>) + Send + 'static>;

static DEFERRED_IDS: AtomicSequence = AtomicSequence::new(1);

struct State<T> {
    outcome: Option<Outcome<T>>,
    callbacks: VecDeque<Callback<T>>,
    running: bool,
    timed_out: bool,
}

struct Shared<T> {
    id: u64,
    state: Mutex<State<T>>,
}

/// A placeholder for a result that becomes available later.
///
/// Handles are cheap to clone and all clones observe the same outcome.
pub struct Deferred<T = Value> {
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Deferred<T> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T: Payload> Default for Deferred<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Payload> Deferred<T> {
    /// Create a pending deferred.
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                id: DEFERRED_IDS.next(),
                state: Mutex::new(State {
                    outcome: None,
                    callbacks: VecDeque::new(),
                    running: false,
                    timed_out: false,
                }),
            }),
        }
    }

    /// Create a deferred already resolved with `value`.
    pub fn resolved(value: T) -> Self {
        let deferred = Self::new();
        deferred.settle(Ok(value));
        deferred
    }

    /// Create a deferred already resolved with `failure`.
    pub fn failed(failure: Failure) -> Self {
        let deferred = Self::new();
        deferred.settle(Err(failure));
        deferred
    }

    /// Process-unique identifier, used in log lines.
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// Resolve with a value and run the pending continuations.
    ///
    /// Fails with [`DeferredError::AlreadyResolved`] if an outcome is already
    /// set, or [`DeferredError::TimedOut`] if a timeout got there first.
    pub fn resolve(&self, value: T) -> Result<(), DeferredError> {
        self.complete(Ok(value), false)
    }

    /// Alias of [`Deferred::resolve`].
    pub fn callback(&self, value: T) -> Result<(), DeferredError> {
        self.resolve(value)
    }

    /// Resolve with a failure.
    pub fn resolve_failure(&self, failure: Failure) -> Result<(), DeferredError> {
        self.complete(Err(failure), false)
    }

    /// Resolve with an error, captured at the caller's location.
    #[track_caller]
    pub fn resolve_error(&self, error: impl Into<Error>) -> Result<(), DeferredError> {
        let failure = Failure::at(error.into(), Location::caller());
        self.complete(Err(failure), false)
    }

    /// Settle without reporting a second resolution to the caller.
    ///
    /// Used where losing the race against a timeout is expected, such as
    /// late replies. The rejected outcome is dropped with a debug log.
    pub(crate) fn settle(&self, outcome: Outcome<T>) {
        if let Err(error) = self.complete(outcome, false) {
            debug!("Deferred {}: dropping late outcome ({})", self.id(), error);
        }
    }

    fn complete(&self, outcome: Outcome<T>, timed_out: bool) -> Result<(), DeferredError> {
        {
            let mut state = self.shared.state.lock();
            if state.outcome.is_some() {
                if let Err(failure) = &outcome {
                    failure.mute();
                }
                return Err(if state.timed_out {
                    DeferredError::TimedOut
                } else {
                    DeferredError::AlreadyResolved
                });
            }

            state.outcome = Some(outcome);
            state.timed_out = timed_out;
            if state.running || state.callbacks.is_empty() {
                return Ok(());
            }
            state.running = true;
        }

        self.run_callbacks();
        Ok(())
    }

    /// Register a raw continuation receiving the outcome.
    pub(crate) fn subscribe(&self, callback: Callback<T>) {
        {
            let mut state = self.shared.state.lock();
            state.callbacks.push_back(callback);
            if state.outcome.is_none() || state.running {
                return;
            }
            state.running = true;
        }

        self.run_callbacks();
    }

    // Only one thread drains the queue at a time; the lock is released
    // around each continuation so continuations may touch this deferred.
    fn run_callbacks(&self) {
        loop {
            let (callback, outcome) = {
                let mut state = self.shared.state.lock();
                match (state.callbacks.pop_front(), state.outcome.clone()) {
                    (Some(callback), Some(outcome)) => (callback, outcome),
                    (callback, _) => {
                        if let Some(callback) = callback {
                            state.callbacks.push_front(callback);
                        }
                        state.running = false;
                        return;
                    }
                }
            };
            callback(outcome);
        }
    }

    fn chain<U, F>(&self, location: &'static Location<'static>, continuation: F) -> Deferred<U>
    where
        U: Payload,
        F: FnOnce(Outcome<T>, &Deferred<U>) + Send + 'static,
    {
        let chained = Deferred::new();
        let target = chained.clone();
        trace!("Deferred {}: chaining {}", self.id(), chained.id());
        self.subscribe(Box::new(move |outcome| {
            let guard = target.clone();
            let run = AssertUnwindSafe(move || continuation(outcome, &target));
            if let Err(payload) = panic::catch_unwind(run) {
                guard.settle(Err(Failure::from_panic(payload.as_ref(), location)));
            }
        }));
        chained
    }

    /// Run `on_success` with the value once resolved.
    ///
    /// A failure skips `on_success` and propagates, re-wrapped with the
    /// caller's frame, to the returned deferred.
    #[track_caller]
    pub fn add_callback<U, F, R>(&self, on_success: F) -> Deferred<U>
    where
        U: Payload,
        F: FnOnce(T) -> R + Send + 'static,
        R: Chainable<U>,
    {
        let location = Location::caller();
        self.chain(location, move |outcome, target| match outcome {
            Ok(value) => on_success(value).settle_into(target, location),
            Err(failure) => target.settle(Err(failure.with_frame(Frame::at(location)))),
        })
    }

    /// Run `on_failure` with the failure once resolved.
    ///
    /// The failure handed to `on_failure` is muted; returning it (or any
    /// failure) re-raises into the returned deferred. Values pass through.
    #[track_caller]
    pub fn add_errback<F, R>(&self, on_failure: F) -> Deferred<T>
    where
        F: FnOnce(Failure) -> R + Send + 'static,
        R: Chainable<T>,
    {
        let location = Location::caller();
        self.chain(location, move |outcome, target| match outcome {
            Ok(value) => target.settle(Ok(value)),
            Err(failure) => on_failure(failure.observed()).settle_into(target, location),
        })
    }

    /// Register a success and a failure continuation in one step.
    #[track_caller]
    pub fn add_callbacks<U, F, G, R, S>(&self, on_success: F, on_failure: G) -> Deferred<U>
    where
        U: Payload,
        F: FnOnce(T) -> R + Send + 'static,
        G: FnOnce(Failure) -> S + Send + 'static,
        R: Chainable<U>,
        S: Chainable<U>,
    {
        let location = Location::caller();
        self.chain(location, move |outcome, target| match outcome {
            Ok(value) => on_success(value).settle_into(target, location),
            Err(failure) => on_failure(failure.observed()).settle_into(target, location),
        })
    }

    /// Run `on_outcome` with whatever the outcome is.
    #[track_caller]
    pub fn add_both<U, F, R>(&self, on_outcome: F) -> Deferred<U>
    where
        U: Payload,
        F: FnOnce(Outcome<T>) -> R + Send + 'static,
        R: Chainable<U>,
    {
        let location = Location::caller();
        self.chain(location, move |outcome, target| {
            on_outcome(outcome.map_err(Failure::observed)).settle_into(target, location)
        })
    }

    /// A new deferred resolving to the same outcome as this one.
    #[track_caller]
    pub fn then(&self) -> Deferred<T> {
        let location = Location::caller();
        self.chain(location, move |outcome, target| {
            target.settle(outcome.map_err(|failure| failure.with_frame(Frame::at(location))))
        })
    }

    /// The outcome without muting a failure, if resolved.
    pub(crate) fn peek(&self) -> Option<Outcome<T>> {
        self.shared.state.lock().outcome.clone()
    }

    /// The outcome, if resolved.
    ///
    /// Returns immediately. A failure is re-raised as the `Err` and counts as
    /// observed. A pending deferred yields a [`DeferredError::Pending`]
    /// failure.
    pub fn result(&self) -> Result<T, Failure> {
        match self.peek() {
            Some(Ok(value)) => Ok(value),
            Some(Err(failure)) => Err(failure.observed()),
            None => Err(Failure::new(DeferredError::Pending).observed()),
        }
    }

    /// The failure, if this deferred failed. Marks it observed.
    pub fn failure(&self) -> Option<Failure> {
        match self.peek() {
            Some(Err(failure)) => Some(failure.observed()),
            _ => None,
        }
    }

    /// Whether no outcome is set yet.
    pub fn is_pending(&self) -> bool {
        self.shared.state.lock().outcome.is_none()
    }

    /// Whether an outcome is set.
    pub fn is_resolved(&self) -> bool {
        !self.is_pending()
    }

    /// Whether the outcome is a failure.
    pub fn is_failed(&self) -> bool {
        matches!(self.shared.state.lock().outcome, Some(Err(_)))
    }

    /// Whether the outcome was forced by an expired timeout.
    pub fn is_timed_out(&self) -> bool {
        self.shared.state.lock().timed_out
    }

    /// Force a timeout failure if still pending after `timeout`.
    ///
    /// When armed inside an actor, the expiry is delivered through that
    /// actor's mailbox so the failure is observed on the actor's thread.
    pub fn set_timeout(&self, timeout: Duration) {
        let pending = Arc::downgrade(&self.shared);
        let owner = context::get_actor();
        timer::global().schedule(timeout, move || {
            let Some(shared) = pending.upgrade() else {
                return;
            };
            let deferred = Deferred { shared };
            match owner {
                Some(actor) => actor.run_soon(move || deferred.expire(timeout)),
                None => deferred.expire(timeout),
            }
        });
    }

    fn expire(&self, timeout: Duration) {
        if self.is_pending() {
            let failure = Failure::new(Error::Timeout(timeout));
            if self.complete(Err(failure), true).is_ok() {
                debug!("Deferred {}: timed out after {:?}", self.id(), timeout);
            }
        }
    }

    /// Block the calling thread until resolved or `timeout` elapses.
    ///
    /// Only for threads that are not actors. Inside an actor this fails with
    /// [`DeferredError::WouldBlock`] because the loop resolving the awaited
    /// result may be the caller's own.
    pub fn wait(&self, timeout: Duration) -> Result<T, Failure> {
        if let Some(actor) = context::get_actor() {
            let error = DeferredError::WouldBlock(actor.name().to_string());
            return Err(Failure::new(error).observed());
        }

        let (sender, receiver) = bounded(1);
        self.subscribe(Box::new(move |outcome| {
            let _ = sender.send(outcome);
        }));

        match receiver.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(failure)) => Err(failure.observed()),
            Err(_) => Err(Failure::new(Error::Timeout(timeout)).observed()),
        }
    }
}

impl<T: Payload> fmt::Debug for Deferred<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.lock();
        let status = match &state.outcome {
            None => "pending",
            Some(Ok(_)) => "resolved",
            Some(Err(_)) if state.timed_out => "timed out",
            Some(Err(_)) => "failed",
        };
        f.debug_struct("Deferred")
            .field("id", &self.shared.id)
            .field("status", &status)
            .field("callbacks", &state.callbacks.len())
            .finish()
    }
}

/// Anything a continuation may return to settle the chained deferred.
pub trait Chainable<T: Payload> {
    /// Settle `target` with this continuation result.
    fn settle_into(self, target: &Deferred<T>, location: &'static Location<'static>);
}

impl Chainable<Value> for Value {
    fn settle_into(self, target: &Deferred<Value>, _location: &'static Location<'static>) {
        target.settle(Ok(self));
    }
}

impl Chainable<()> for () {
    fn settle_into(self, target: &Deferred<()>, _location: &'static Location<'static>) {
        target.settle(Ok(()));
    }
}

impl Chainable<Vec<Outcome>> for Vec<Outcome> {
    fn settle_into(self, target: &Deferred<Vec<Outcome>>, _location: &'static Location<'static>) {
        target.settle(Ok(self));
    }
}

impl<T: Payload> Chainable<T> for Failure {
    fn settle_into(self, target: &Deferred<T>, location: &'static Location<'static>) {
        target.settle(Err(self.with_frame(Frame::at(location))));
    }
}

impl<T: Payload> Chainable<T> for Error {
    fn settle_into(self, target: &Deferred<T>, location: &'static Location<'static>) {
        target.settle(Err(Failure::at(self, location)));
    }
}

impl<T, E> Chainable<T> for Result<T, E>
where
    T: Payload,
    E: Into<Failure>,
{
    fn settle_into(self, target: &Deferred<T>, location: &'static Location<'static>) {
        match self {
            Ok(value) => target.settle(Ok(value)),
            Err(error) => {
                let failure: Failure = error.into();
                target.settle(Err(failure.with_frame(Frame::at(location))));
            }
        }
    }
}

impl<T: Payload> Chainable<T> for Deferred<T> {
    fn settle_into(self, target: &Deferred<T>, location: &'static Location<'static>) {
        let target = target.clone();
        self.subscribe(Box::new(move |outcome| {
            target.settle(outcome.map_err(|failure| failure.with_frame(Frame::at(location))))
        }));
    }
}

impl Chainable<Value> for Async {
    fn settle_into(self, target: &Deferred<Value>, location: &'static Location<'static>) {
        match self {
            Async::Value(value) => target.settle(Ok(value)),
            Async::Failure(failure) => failure.settle_into(target, location),
            Async::Deferred(deferred) => deferred.settle_into(target, location),
            Async::Coroutine(routine) => {
                drive(routine, DriveOptions::default()).settle_into(target, location)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;
    use std::sync::Arc;
    use std::thread;
    use strand_core::value::as_i64;

    #[test]
    fn test_resolve_once() {
        let deferred = Deferred::new();
        assert!(deferred.is_pending());
        deferred.resolve(json!(1)).unwrap();

        assert_eq!(deferred.resolve(json!(2)), Err(DeferredError::AlreadyResolved));
        assert_eq!(deferred.result().unwrap(), json!(1));
    }

    #[test]
    fn test_result_of_pending_is_failure() {
        let deferred: Deferred = Deferred::new();
        let failure = deferred.result().unwrap_err();
        assert_eq!(failure.error(), &Error::Deferred(DeferredError::Pending));
    }

    #[test]
    fn test_callbacks_run_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let deferred: Deferred = Deferred::new();

        for index in 0..3 {
            let seen = Arc::clone(&seen);
            deferred.add_callback(move |value| {
                seen.lock().push((index, value));
            });
        }
        assert!(seen.lock().is_empty());

        deferred.resolve(json!("done")).unwrap();
        let seen = seen.lock();
        assert_eq!(
            *seen,
            vec![(0, json!("done")), (1, json!("done")), (2, json!("done"))]
        );
    }

    #[test]
    fn test_callback_on_resolved_runs_immediately() {
        let deferred = Deferred::resolved(json!(4));
        let doubled: Deferred = deferred.add_callback(|value| json!(as_i64(&value).unwrap() * 2));
        assert_eq!(doubled.result().unwrap(), json!(8));
        assert_eq!(deferred.result().unwrap(), json!(4));
    }

    #[test]
    fn test_chaining_into_another_deferred() {
        let first: Deferred = Deferred::new();
        let summed = Deferred::new();
        let target = summed.clone();
        first.add_callback(move |value| target.callback(json!(as_i64(&value).unwrap() + 2)));

        first.resolve(json!(1)).unwrap();
        assert_eq!(summed.result().unwrap(), json!(3));
    }

    #[test]
    fn test_type_error_becomes_failure() {
        let first: Deferred = Deferred::new();
        let second: Deferred = first.add_callback(|value| as_i64(&value).map(|n| json!(n + 2)));

        first.resolve(json!("bla")).unwrap();
        assert_eq!(first.result().unwrap(), json!("bla"));

        let failure = second.failure().unwrap();
        assert!(matches!(failure.error(), Error::Type(_)));
    }

    #[test]
    fn test_failure_skips_callbacks_until_errback() {
        let source: Deferred = Deferred::new();
        let skipped: Deferred = source.add_callback(|_| json!("unreachable"));
        let recovered = skipped.add_errback(|failure| json!(failure.to_string()));

        source.resolve_error(Error::Runtime("boom".into())).unwrap();

        assert!(skipped.is_failed());
        assert_eq!(recovered.result().unwrap(), json!("Runtime error: boom"));
        assert!(skipped.failure().unwrap().trace().len() >= 2);
    }

    #[test]
    fn test_errback_can_reraise() {
        let source: Deferred = Deferred::failed(Failure::new(Error::Value("bad".into())));
        let reraised = source.add_errback(|failure| failure);
        let failure = reraised.failure().unwrap();
        assert_eq!(failure.error(), &Error::Value("bad".into()));
    }

    #[test]
    fn test_add_both_sees_either_outcome() {
        let ok: Deferred = Deferred::resolved(json!(1));
        let described: Deferred = ok.add_both(|outcome| json!(outcome.is_ok()));
        assert_eq!(described.result().unwrap(), json!(true));

        let failed: Deferred = Deferred::failed(Failure::new(Error::Runtime("x".into())));
        let described: Deferred = failed.add_both(|outcome| json!(outcome.is_ok()));
        assert_eq!(described.result().unwrap(), json!(false));
    }

    #[test]
    fn test_add_callbacks() {
        let source: Deferred = Deferred::failed(Failure::new(Error::Runtime("x".into())));
        let handled: Deferred =
            source.add_callbacks(|_| json!("success"), |_| json!("handled"));
        assert_eq!(handled.result().unwrap(), json!("handled"));
    }

    #[test]
    fn test_then_mirrors_outcome() {
        let source: Deferred = Deferred::new();
        let mirror = source.then();
        source.resolve(json!("x")).unwrap();
        assert_eq!(mirror.result().unwrap(), json!("x"));

        let source: Deferred = Deferred::new();
        let mirror = source.then();
        source.resolve_error(Error::Runtime("y".into())).unwrap();
        assert_eq!(mirror.failure().unwrap().error(), &Error::Runtime("y".into()));
    }

    #[test]
    fn test_then_branch_leaves_source_untouched() {
        let source: Deferred = Deferred::new();
        let branch: Deferred = source
            .then()
            .add_callback(|value| as_i64(&value).map(|n| json!(n + 2)));

        source.callback(json!(1)).unwrap();
        assert_eq!(source.result().unwrap(), json!(1));
        assert_eq!(branch.result().unwrap(), json!(3));
    }

    #[test]
    fn test_failing_then_branch_keeps_source_value() {
        let sink: Deferred = Deferred::new();
        let on_value = sink.clone();
        let on_failure = sink.clone();

        let source: Deferred = Deferred::new();
        let branch: Deferred = source
            .then()
            .add_callback(move |value| {
                as_i64(&value).map(|n| {
                    on_value.callback(json!(n + 2)).unwrap();
                    json!(n + 2)
                })
            })
            .add_errback(move |failure: Failure| {
                on_failure.resolve_failure(failure.clone()).unwrap();
                failure
            });

        source.callback(json!("bla")).unwrap();
        assert!(matches!(sink.failure().unwrap().error(), Error::Type(_)));
        assert_eq!(source.result().unwrap(), json!("bla"));
        assert!(matches!(branch.failure().unwrap().error(), Error::Type(_)));
    }

    #[test]
    fn test_linear_chain_composes() {
        let source: Deferred = Deferred::new();
        let chained: Deferred = source
            .add_callback(|value| as_i64(&value).map(|n| json!(n * 10)))
            .add_callback(|value| as_i64(&value).map(|n| json!(n + 1)));

        source.callback(json!(1)).unwrap();
        assert_eq!(chained.result().unwrap(), json!(11));
        assert_eq!(source.result().unwrap(), json!(1));
    }

    #[test]
    fn test_panicking_callback_becomes_failure() {
        let source: Deferred = Deferred::resolved(json!(1));
        let exploded: Deferred = source.add_callback(|_| -> Value { panic!("kaboom") });
        let failure = exploded.failure().unwrap();
        assert_eq!(failure.error(), &Error::Panic("kaboom".into()));
    }

    #[test]
    fn test_continuation_returning_pending_deferred() {
        let source: Deferred = Deferred::resolved(json!(1));
        let inner: Deferred = Deferred::new();
        let awaited = inner.clone();
        let chained: Deferred = source.add_callback(move |_| awaited);

        assert!(chained.is_pending());
        inner.resolve(json!("late")).unwrap();
        assert_eq!(chained.result().unwrap(), json!("late"));
    }

    #[test]
    fn test_resolution_from_another_thread() {
        let deferred: Deferred = Deferred::new();
        let chained: Deferred = deferred.add_callback(|value| value);
        let resolver = deferred.clone();

        thread::spawn(move || resolver.resolve(json!(42)).unwrap())
            .join()
            .unwrap();

        assert_eq!(chained.wait(Duration::from_secs(1)).unwrap(), json!(42));
    }

    #[test]
    fn test_wait_times_out() {
        let deferred: Deferred = Deferred::new();
        let failure = deferred.wait(Duration::from_millis(20)).unwrap_err();
        assert!(failure.is_timeout());
        assert!(deferred.is_pending());
    }

    #[test]
    fn test_set_timeout_forces_failure() {
        let deferred: Deferred = Deferred::new();
        deferred.set_timeout(Duration::from_millis(20));

        let failure = deferred.wait(Duration::from_secs(2)).unwrap_err();
        assert!(failure.is_timeout());
        assert!(deferred.is_timed_out());
        assert_eq!(deferred.resolve(json!(1)), Err(DeferredError::TimedOut));
    }

    #[test]
    fn test_set_timeout_is_noop_once_resolved() {
        let deferred: Deferred = Deferred::new();
        deferred.set_timeout(Duration::from_millis(10));
        deferred.resolve(json!("fast")).unwrap();

        thread::sleep(Duration::from_millis(40));
        assert_eq!(deferred.result().unwrap(), json!("fast"));
        assert!(!deferred.is_timed_out());
    }

    #[test]
    fn test_typed_payloads() {
        let counted: Deferred<usize> = Deferred::new();
        let label: Deferred = counted.add_callback(|count: usize| json!(format!("{} items", count)));
        counted.resolve(3).unwrap();
        assert_eq!(label.result().unwrap(), json!("3 items"));
    }
}
