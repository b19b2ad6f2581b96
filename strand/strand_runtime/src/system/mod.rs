//! System management for the Strand runtime
//!
//! This module provides components for system bootstrap, configuration,
//! and shutdown operations.

pub mod bootstrap;
pub mod config;
pub mod shutdown;

// Re-export key types for convenience
pub use bootstrap::{BootstrapError, BootstrapPhase, System};
pub use config::{ApplicationConfig, ConfigError, RuntimeConfig};
pub use shutdown::{ShutdownError, ShutdownManager};
