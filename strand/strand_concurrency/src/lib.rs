#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

//! # Strand Concurrency
//!
//! The cooperative execution engine and actor tree of Strand.
//!
//! This crate provides:
//!
//! - Deferred results with chained continuations and captured failures
//! - A coroutine driver expressing sequential logic over deferred results
//! - Named actors exchanging requests by name, supervised by an arbiter
//! - A process-wide timer for request and coroutine timeouts
//!
//! ## Example
//!
//! ```
//! use std::time::Duration;
//! use serde_json::json;
//! use strand_concurrency::actor::{Actions, ActorSpec, ActorSystem, Application, Spawnable};
//! use strand_concurrency::Value;
//!
//! struct Counter;
//!
//! impl Application for Counter {
//!     fn name(&self) -> &str {
//!         "counter"
//!     }
//!
//!     fn workers(&self) -> Option<usize> {
//!         Some(1)
//!     }
//!
//!     fn worker(&self, _index: usize, _cfg: &Value) -> Spawnable {
//!         ActorSpec::new(0i64)
//!             .actions(Actions::new().typed_action("add", |count: &mut i64, (n,): (i64,)| {
//!                 *count += n;
//!                 Ok(*count)
//!             }))
//!             .into()
//!     }
//! }
//!
//! let system = ActorSystem::start().unwrap();
//! system.run(Counter, json!(null)).unwrap().wait(Duration::from_secs(5)).unwrap();
//!
//! let reply = system.send("counter-worker-0", "add", vec![json!(2)]).unwrap();
//! assert_eq!(reply.wait(Duration::from_secs(5)).unwrap(), json!(2));
//! system.shutdown(Duration::from_secs(5)).unwrap();
//! ```
//!
//! ## Integration with Other Strand Crates
//!
//! - **strand_core**: Errors, identifiers and the value model
//! - **strand_runtime**: Configuration, logging and bundled applications

/// Actors, mailboxes and the supervision tree
pub mod actor;

/// Deferred results, failures, coroutines and combinators
pub mod deferred;

/// Time-based scheduling
pub mod scheduler;

/// Synchronization primitives shared across actor threads
pub mod sync;

// Re-export key types for easier access
pub use actor::{get_actor, notify, send, send_with_timeout, ActorRef, ActorSystem, Application};
pub use deferred::{
    coroutine, is_async, is_failure, maybe_async, maybe_failure, multi_async, Async, Deferred,
    Failure, Outcome, Resume, Step,
};
pub use strand_core::Value;
