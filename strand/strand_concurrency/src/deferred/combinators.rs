//! Normalizing and combining asynchronous results.
//!
//! Handlers and coroutines produce an [`Async`]: an immediate value, a
//! failure, a deferred or a coroutine still to be driven. The helpers here
//! turn any of those into a uniform shape and combine several of them.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::Mutex;
use strand_core::{Error, Value};

use super::coroutine::{drive, Coroutine, DriveOptions};
use super::failure::Failure;
use super::{Deferred, Outcome};

/// Any result a handler, continuation or coroutine may produce.
pub enum Async {
    /// Immediate value
    Value(Value),

    /// Immediate failure
    Failure(Failure),

    /// Result that may settle later
    Deferred(Deferred),

    /// Computation still to be driven
    Coroutine(Box<dyn Coroutine>),
}

impl Async {
    /// Normalize into a deferred, driving a coroutine if needed.
    pub fn into_deferred(self) -> Deferred {
        match self {
            Self::Value(value) => Deferred::resolved(value),
            Self::Failure(failure) => Deferred::failed(failure),
            Self::Deferred(deferred) => deferred,
            Self::Coroutine(routine) => drive(routine, DriveOptions::default()),
        }
    }

    /// The immediate outcome, if there is one.
    pub fn ready(&self) -> Option<Outcome> {
        match self {
            Self::Value(value) => Some(Ok(value.clone())),
            Self::Failure(failure) => Some(Err(failure.clone())),
            Self::Deferred(deferred) => deferred.peek(),
            Self::Coroutine(_) => None,
        }
    }
}

impl fmt::Debug for Async {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Self::Failure(failure) => f.debug_tuple("Failure").field(failure).finish(),
            Self::Deferred(deferred) => f.debug_tuple("Deferred").field(deferred).finish(),
            Self::Coroutine(_) => f.write_str("Coroutine(..)"),
        }
    }
}

impl From<Value> for Async {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

impl From<Failure> for Async {
    fn from(failure: Failure) -> Self {
        Self::Failure(failure)
    }
}

impl From<Error> for Async {
    #[track_caller]
    fn from(error: Error) -> Self {
        Self::Failure(Failure::at(error, Location::caller()))
    }
}

impl From<Deferred> for Async {
    fn from(deferred: Deferred) -> Self {
        Self::Deferred(deferred)
    }
}

impl From<Box<dyn Coroutine>> for Async {
    fn from(routine: Box<dyn Coroutine>) -> Self {
        Self::Coroutine(routine)
    }
}

impl<E: Into<Failure>> From<Result<Value, E>> for Async {
    fn from(result: Result<Value, E>) -> Self {
        match result {
            Ok(value) => Self::Value(value),
            Err(error) => Self::Failure(error.into()),
        }
    }
}

impl<E: Into<Failure>> From<Result<Deferred, E>> for Async {
    fn from(result: Result<Deferred, E>) -> Self {
        match result {
            Ok(deferred) => Self::Deferred(deferred),
            Err(error) => Self::Failure(error.into()),
        }
    }
}

/// Normalize `x`: coroutines are driven and become deferreds, everything
/// else is returned unchanged.
pub fn maybe_async(x: impl Into<Async>) -> Async {
    maybe_async_with(x, DriveOptions::default())
}

/// [`maybe_async`] with explicit driver settings for coroutines.
pub fn maybe_async_with(x: impl Into<Async>, options: DriveOptions) -> Async {
    match x.into() {
        Async::Coroutine(routine) => Async::Deferred(drive(routine, options)),
        other => other,
    }
}

/// True iff `x` is a deferred still waiting for its outcome.
pub fn is_async(x: &Async) -> bool {
    matches!(x, Async::Deferred(deferred) if deferred.is_pending())
}

/// Wait for every item and collect their outcomes in input order.
///
/// Failures do not short-circuit: each one takes its position in the
/// resulting list and is muted there, since the list hands it over to the
/// caller. An empty input resolves immediately to an empty list.
pub fn multi_async<I, T>(items: I) -> Deferred<Vec<Outcome>>
where
    I: IntoIterator<Item = T>,
    T: Into<Async>,
{
    let pending: Vec<Deferred> = items
        .into_iter()
        .map(|item| maybe_async(item).into_deferred())
        .collect();

    let combined = Deferred::new();
    if pending.is_empty() {
        combined.settle(Ok(Vec::new()));
        return combined;
    }

    let collected = Arc::new(Mutex::new(Collected {
        slots: vec![None; pending.len()],
        remaining: pending.len(),
    }));

    for (index, deferred) in pending.into_iter().enumerate() {
        let collected = Arc::clone(&collected);
        let combined = combined.clone();
        deferred.subscribe(Box::new(move |outcome| {
            let finished = {
                let mut collected = collected.lock();
                collected.slots[index] = Some(outcome);
                collected.remaining -= 1;
                if collected.remaining == 0 {
                    Some(collected.slots.drain(..).flatten().collect::<Vec<_>>())
                } else {
                    None
                }
            };
            if let Some(outcomes) = finished {
                combined.settle(Ok(outcomes));
            }
        }));
    }

    combined
}

struct Collected {
    slots: Vec<Option<Outcome>>,
    remaining: usize,
}

/// Chain helper turning a list of outcomes into a plain value list,
/// re-raising the first failure. Later failures count as observed.
///
/// ```
/// use serde_json::json;
/// use strand_concurrency::deferred::{multi_async, Deferred};
/// use strand_concurrency::deferred::combinators::all_values;
///
/// let combined: Deferred = multi_async(vec![json!(1), json!(2)]).add_callback(all_values);
/// assert_eq!(combined.result().unwrap(), json!([1, 2]));
/// ```
pub fn all_values(outcomes: Vec<Outcome>) -> Result<Value, Failure> {
    let mut values = Vec::with_capacity(outcomes.len());
    let mut raised = None;
    for outcome in outcomes {
        match outcome {
            Ok(value) => values.push(value),
            Err(failure) if raised.is_none() => raised = Some(failure),
            Err(failure) => failure.mute(),
        }
    }
    match raised {
        Some(failure) => Err(failure),
        None => Ok(Value::Array(values)),
    }
}
