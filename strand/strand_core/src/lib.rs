//! # Strand Core
//!
//! `strand_core` provides the fundamental building blocks shared by every
//! Strand crate: the error hierarchy, strongly typed identifiers, the dynamic
//! value model and a handful of small utilities.
//!
//! ## Core Principles
//!
//! Strand is an application-process concurrency runtime:
//!
//! 1. **Actor Isolation**: Work is organised as a tree of named actors (an
//!    arbiter, one monitor per application and that monitor's workers). Each
//!    actor owns its state and executes strictly sequentially.
//!
//! 2. **Message Passing Only**: Actors never share state. They address each
//!    other by name and exchange requests whose replies arrive as deferred
//!    results.
//!
//! 3. **Failures Are Values**: Any error raised while producing a result is
//!    captured and travels through result chains and coroutines exactly like
//!    an ordinary value until somebody handles it.
//!
//! ## Crate Structure
//!
//! - **error**: Error types for all Strand components
//! - **id**: Strongly-typed identifier types
//! - **value**: The dynamic value carried by deferred results and messages
//! - **utils**: Utility types such as log levels

pub mod error;
pub mod id;
pub mod utils;
pub mod value;

// Re-export key types for convenience
pub use error::{ConcurrencyError, DeferredError, Error, Result};
pub use id::{ActorId, Id, RequestId};
pub use utils::LogLevel;
pub use value::Value;
