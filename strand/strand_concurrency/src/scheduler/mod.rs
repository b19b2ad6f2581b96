//! Time-based scheduling.
//!
//! Timeouts on deferreds and coroutine deadlines are armed on a single
//! process-wide timer thread.

pub mod timer;

pub use timer::{global, Timer};
