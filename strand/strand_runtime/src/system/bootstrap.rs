//! System Bootstrap for Strand Runtime
//!
//! Handles system initialization and bootstrap sequence.

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use strand_concurrency::actor::{ActorSystem, Application};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::RuntimeConfig;
use super::shutdown::ShutdownManager;
use crate::apps::FanoutApp;

/// Errors that can occur during bootstrap
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// A phase did not complete
    #[error("Phase {0:?} bootstrap failed: {1}")]
    PhaseFailed(BootstrapPhase, String),

    /// A component was used before the phase creating it ran
    #[error("Dependency {0} not initialized")]
    DependencyNotInitialized(String),

    /// The system was bootstrapped already
    #[error("System already bootstrapped")]
    AlreadyBootstrapped,

    /// The configuration was rejected
    #[error("Configuration error: {0}")]
    ConfigError(String),
}

/// Bootstrap phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapPhase {
    /// Phase 0: Configuration checks
    Core = 0,

    /// Phase 1: Actor system and arbiter
    Actors = 1,

    /// Phase 2: Application registration
    Applications = 2,

    /// System is fully bootstrapped
    Complete = 3,
}

type Registration = Box<dyn FnOnce(&ActorSystem) + Send>;

/// State of the system
pub struct System {
    /// System configuration
    config: RuntimeConfig,

    /// Last completed bootstrap phase
    phase: Mutex<Option<BootstrapPhase>>,

    /// Actor system, created in phase 1
    actors: OnceCell<ActorSystem>,

    /// Registrations deferred until the actor system exists
    pending: Mutex<Vec<Registration>>,

    /// Shutdown manager
    shutdown_manager: Arc<ShutdownManager>,
}

impl System {
    /// Create a new system
    pub fn new(config: RuntimeConfig) -> Result<Self> {
        let shutdown_manager = Arc::new(ShutdownManager::new(config.shutdown_timeout()));
        Ok(Self {
            config,
            phase: Mutex::new(None),
            actors: OnceCell::new(),
            pending: Mutex::new(Vec::new()),
            shutdown_manager,
        })
    }

    /// The configuration this system was created with
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// The last bootstrap phase that completed
    pub fn phase(&self) -> Option<BootstrapPhase> {
        *self.phase.lock()
    }

    /// Bootstrap the system
    pub fn bootstrap(&self) -> Result<()> {
        if self.phase().is_some() {
            return Err(BootstrapError::AlreadyBootstrapped.into());
        }
        info!("Starting system bootstrap");

        // Phase 0: Configuration checks
        self.bootstrap_phase_0()?;
        self.complete(BootstrapPhase::Core);

        // Phase 1: Actor system and arbiter
        self.bootstrap_phase_1()?;
        self.complete(BootstrapPhase::Actors);

        // Phase 2: Application registration
        self.bootstrap_phase_2()?;
        self.complete(BootstrapPhase::Applications);

        self.complete(BootstrapPhase::Complete);
        info!("System bootstrap complete");

        Ok(())
    }

    fn complete(&self, phase: BootstrapPhase) {
        debug!("Bootstrap phase {:?} complete", phase);
        *self.phase.lock() = Some(phase);
    }

    /// Phase 0: Configuration checks
    fn bootstrap_phase_0(&self) -> Result<()> {
        info!("Bootstrap Phase 0: Configuration checks");

        self.config
            .validate()
            .map_err(|e| BootstrapError::ConfigError(e.to_string()))?;

        for name in self.config.applications.keys() {
            if name == "monitor" || name == "arbiter" {
                return Err(BootstrapError::ConfigError(format!(
                    "{} is a reserved actor name",
                    name
                ))
                .into());
            }
        }

        Ok(())
    }

    /// Phase 1: Actor system and arbiter
    fn bootstrap_phase_1(&self) -> Result<()> {
        info!("Bootstrap Phase 1: Actor system");

        let system = ActorSystem::with_config(self.config.actor_system())
            .map_err(|e| BootstrapError::PhaseFailed(BootstrapPhase::Actors, e.to_string()))?;

        if self.actors.set(system).is_err() {
            return Err(BootstrapError::AlreadyBootstrapped.into());
        }

        Ok(())
    }

    /// Phase 2: Application registration
    fn bootstrap_phase_2(&self) -> Result<()> {
        info!("Bootstrap Phase 2: Applications");

        let system = self.actor_system()?;
        system.register_application(FanoutApp::new());
        for register in self.pending.lock().drain(..) {
            register(system);
        }

        for name in self.config.applications.keys() {
            if !system.has_application(name) {
                warn!("Configured application {} is not registered", name);
            }
        }

        Ok(())
    }

    /// Register an application, now or once the actor system exists
    pub fn register_application<A: Application>(&self, application: A) {
        match self.actors.get() {
            Some(system) => system.register_application(application),
            None => self
                .pending
                .lock()
                .push(Box::new(move |system: &ActorSystem| {
                    system.register_application(application)
                })),
        }
    }

    /// Shut down the system
    pub fn shutdown(&self) -> Result<()> {
        info!("Shutting down system");

        match self.actors.get() {
            Some(system) => self.shutdown_manager.request_shutdown(system)?,
            None => warn!("Actor system not started, nothing to shut down"),
        }

        info!("System shutdown complete");

        Ok(())
    }

    /// Get the actor system
    pub fn actor_system(&self) -> Result<&ActorSystem> {
        self.actors.get().ok_or_else(|| {
            BootstrapError::DependencyNotInitialized("ActorSystem".to_string()).into()
        })
    }

    /// Get the shutdown manager
    pub fn get_shutdown_manager(&self) -> Arc<ShutdownManager> {
        Arc::clone(&self.shutdown_manager)
    }
}
