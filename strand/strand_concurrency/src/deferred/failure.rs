//! Failure capture.
//!
//! A [`Failure`] wraps an [`Error`] together with the trace of execution
//! contexts it travelled through, so that an error raised anywhere can move
//! through deferred chains and coroutines exactly like an ordinary value.
//!
//! Failures are immutable once constructed. Propagating one to the next link
//! of a chain re-wraps it with an additional [`Frame`] and mutes the source,
//! so responsibility for reporting moves forward with the copy. A failure
//! whose last handle is dropped without anyone muting it is logged as an
//! unhandled failure.

use std::any::Any;
use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::error;
use serde::Serialize;
use strand_core::{ConcurrencyError, DeferredError, Error};

use super::combinators::Async;
use crate::actor::context;
use crate::sync::AtomicFlag;

/// One execution context a failure was created or re-raised in.
#[derive(Debug, Clone, Serialize)]
pub struct Frame {
    /// Name of the actor executing at that point, if any
    pub actor: Option<String>,

    /// Source location as `file:line:column`
    pub location: String,

    /// When the frame was captured
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    /// Capture a frame at the caller's location.
    #[track_caller]
    pub fn here() -> Self {
        Self::at(Location::caller())
    }

    /// Capture a frame at a known location.
    pub fn at(location: &'static Location<'static>) -> Self {
        Self {
            actor: context::current_actor_name(),
            location: format!(
                "{}:{}:{}",
                location.file(),
                location.line(),
                location.column()
            ),
            timestamp: Utc::now(),
        }
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.actor {
            Some(actor) => write!(f, "{} in {}", self.location, actor),
            None => write!(f, "{}", self.location),
        }
    }
}

struct Captured {
    error: Error,
    trace: Vec<Frame>,
    muted: AtomicFlag,
}

impl Drop for Captured {
    fn drop(&mut self) {
        if !self.muted.is_set() {
            let trace = self
                .trace
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(" <- ");
            error!("Unhandled failure: {} [{}]", self.error, trace);
        }
    }
}

/// An error captured as a value.
///
/// Cloning a failure is cheap and every clone shares the muted flag: muting
/// any clone marks the failure as observed.
#[derive(Clone)]
pub struct Failure {
    inner: Arc<Captured>,
}

impl Failure {
    /// Capture `error` with a frame at the caller's location.
    #[track_caller]
    pub fn new(error: impl Into<Error>) -> Self {
        Self::at(error.into(), Location::caller())
    }

    pub(crate) fn at(error: Error, location: &'static Location<'static>) -> Self {
        Self::with_trace(error, vec![Frame::at(location)])
    }

    fn with_trace(error: Error, trace: Vec<Frame>) -> Self {
        Self {
            inner: Arc::new(Captured {
                error,
                trace,
                muted: AtomicFlag::new(false),
            }),
        }
    }

    /// Capture a panic payload as a failure.
    pub(crate) fn from_panic(
        payload: &(dyn Any + Send),
        location: &'static Location<'static>,
    ) -> Self {
        Self::at(Error::Panic(panic_message(payload)), location)
    }

    /// Re-wrap this failure with one more context frame.
    ///
    /// The returned failure is a new, unmuted value; `self` is muted because
    /// the copy now carries the responsibility of being handled.
    pub fn with_frame(&self, frame: Frame) -> Self {
        self.mute();
        let mut trace = self.inner.trace.clone();
        trace.push(frame);
        Self::with_trace(self.inner.error.clone(), trace)
    }

    /// The wrapped error.
    pub fn error(&self) -> &Error {
        &self.inner.error
    }

    /// The frames this failure was created and re-raised in, oldest first.
    pub fn trace(&self) -> &[Frame] {
        &self.inner.trace
    }

    /// Mark this failure as observed.
    pub fn mute(&self) {
        self.inner.muted.set();
    }

    /// Mute and return self.
    pub fn observed(self) -> Self {
        self.mute();
        self
    }

    /// Whether somebody observed this failure.
    pub fn is_muted(&self) -> bool {
        self.inner.muted.is_set()
    }

    /// Whether this failure is the timeout kind.
    pub fn is_timeout(&self) -> bool {
        self.inner.error.is_timeout()
    }

    /// Consume the failure, returning a copy of the wrapped error.
    pub fn into_error(self) -> Error {
        self.mute();
        self.inner.error.clone()
    }
}

impl fmt::Debug for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Failure")
            .field("error", &self.inner.error)
            .field("frames", &self.inner.trace.len())
            .field("muted", &self.is_muted())
            .finish()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.error)
    }
}

impl std::error::Error for Failure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.inner.error)
    }
}

impl From<Error> for Failure {
    #[track_caller]
    fn from(error: Error) -> Self {
        Self::at(error, Location::caller())
    }
}

impl From<DeferredError> for Failure {
    #[track_caller]
    fn from(error: DeferredError) -> Self {
        Self::at(error.into(), Location::caller())
    }
}

impl From<ConcurrencyError> for Failure {
    #[track_caller]
    fn from(error: ConcurrencyError) -> Self {
        Self::at(error.into(), Location::caller())
    }
}

/// Normalize `x`, wrapping a raised error into a [`Failure`].
///
/// A failure is returned unchanged, an [`Error`] (or an `Err` result) is
/// captured with the current context frame, anything else is returned as is.
pub fn maybe_failure(x: impl Into<Async>) -> Async {
    x.into()
}

/// True iff `x` is a failure.
pub fn is_failure(x: &Async) -> bool {
    matches!(x, Async::Failure(_))
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "<unknown panic>".to_string()
    }
}
