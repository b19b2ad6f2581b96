//! Synchronization primitives shared across actor threads.

pub mod atomic;

pub use atomic::{AtomicCounter, AtomicFlag, AtomicSequence};
