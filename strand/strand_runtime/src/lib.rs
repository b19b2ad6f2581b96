//! Strand Runtime - Process runtime for the Strand actor system
//!
//! This crate ties the actor engine to a process: configuration loading,
//! logging, the bootstrap sequence that starts the arbiter, running
//! applications and the graceful shutdown of the whole actor tree.

pub mod apps;
pub mod logging;
pub mod system;

use std::path::Path;

use anyhow::{Context, Result};
use strand_concurrency::actor::{ActorInfo, ActorSystem, Application};
use strand_concurrency::deferred::{Deferred, Failure};
use strand_core::Value;
use tracing::info;

pub use system::config::RuntimeConfig;

/// Runtime facade that provides a unified interface to the Strand runtime.
pub struct Runtime {
    /// System component for bootstrap and shutdown
    pub system: system::bootstrap::System,
}

impl Runtime {
    /// Create a new Runtime instance
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        info!("Initializing Strand Runtime");

        let system = system::bootstrap::System::new(config)?;

        info!("Strand Runtime initialized successfully");

        Ok(Self { system })
    }

    /// Create a runtime from a configuration file, or the defaults
    pub fn from_path(config_path: Option<&Path>) -> Result<Self> {
        let config = RuntimeConfig::load(config_path)?;
        Self::new(config)
    }

    /// The runtime configuration
    pub fn config(&self) -> &RuntimeConfig {
        self.system.config()
    }

    /// Start the runtime
    pub fn start(&self) -> Result<()> {
        info!("Starting Strand Runtime");

        self.system.bootstrap()?;

        info!("Strand Runtime started successfully");

        Ok(())
    }

    /// The running actor system
    pub fn actors(&self) -> Result<&ActorSystem> {
        self.system.actor_system()
    }

    /// Make an application available to [`Runtime::run_application`]
    pub fn register_application<A: Application>(&self, application: A) {
        self.system.register_application(application);
    }

    /// Run a registered application with its configured settings
    ///
    /// Blocks until the monitor and every worker started, bounded by the
    /// shutdown timeout, and returns the application handle.
    pub fn run_application(&self, name: &str) -> Result<Value> {
        let cfg = self.config().application_cfg(name);
        info!(app = name, "Running application");

        let started = self.actors()?.run_application(name, cfg)?;
        wait(&started, self.config())
            .with_context(|| format!("Application {} failed to start", name))
    }

    /// Register and run `application`
    pub fn run<A: Application>(&self, application: A) -> Result<Value> {
        let name = application.name().to_string();
        self.register_application(application);
        self.run_application(&name)
    }

    /// Send a request, applying the configured send timeout if any
    pub fn send(&self, target: &str, action: &str, args: Vec<Value>) -> Result<Deferred> {
        let actors = self.actors()?;
        let reply = match self.config().send_timeout() {
            Some(timeout) => actors.send_with_timeout(target, action, args, timeout)?,
            None => actors.send(target, action, args)?,
        };
        Ok(reply)
    }

    /// Send a request and block for its reply
    pub fn request(&self, target: &str, action: &str, args: Vec<Value>) -> Result<Value> {
        let reply = self.send(target, action, args)?;
        wait(&reply, self.config()).with_context(|| format!("{} on {} failed", action, target))
    }

    /// Live actors, sorted by name
    pub fn list_actors(&self) -> Result<Vec<ActorInfo>> {
        Ok(self.actors()?.actors())
    }

    /// Gracefully shut down the runtime
    pub fn shutdown(&self) -> Result<()> {
        info!("Shutting down Strand Runtime");

        self.system.shutdown()?;

        info!("Strand Runtime shut down successfully");

        Ok(())
    }
}

// Bounded like shutdown so a stuck actor cannot hang the caller.
fn wait(deferred: &Deferred, config: &RuntimeConfig) -> Result<Value> {
    Ok(deferred
        .wait(config.shutdown_timeout())
        .map_err(Failure::into_error)?)
}
