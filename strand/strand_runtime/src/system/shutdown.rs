//! Shutdown Manager for Strand Runtime
//!
//! Handles graceful shutdown of the actor tree in two phases: every
//! application monitor is killed together with its workers, then the
//! arbiter stops whatever is left and exits. Both phases share one
//! deadline.

use std::time::{Duration, Instant};

use anyhow::Result;
use serde_json::json;
use strand_concurrency::actor::{ActorKind, ActorSystem};
use strand_concurrency::deferred::multi_async;
use strand_concurrency::sync::AtomicFlag;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors that can occur during shutdown
#[derive(Debug, Error)]
pub enum ShutdownError {
    /// The actors did not stop within the shutdown timeout
    #[error("Shutdown timeout after {0:?}")]
    Timeout(Duration),

    /// Stopping an actor failed
    #[error("Actor shutdown failed: {0}")]
    ActorFailed(String),

    /// Another shutdown is running
    #[error("Shutdown already in progress")]
    AlreadyInProgress,
}

/// Manager for system shutdown
pub struct ShutdownManager {
    /// Deadline for the whole shutdown
    timeout: Duration,

    /// Whether shutdown is in progress
    in_progress: AtomicFlag,
}

impl ShutdownManager {
    /// Create a new shutdown manager
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            in_progress: AtomicFlag::new(false),
        }
    }

    /// Whether a shutdown was requested
    pub fn is_shutting_down(&self) -> bool {
        self.in_progress.is_set()
    }

    /// Request a graceful shutdown of `system`
    pub fn request_shutdown(&self, system: &ActorSystem) -> Result<()> {
        info!("Initiating graceful shutdown");

        if !self.in_progress.try_set() {
            warn!("Shutdown already in progress");
            return Err(ShutdownError::AlreadyInProgress.into());
        }

        let deadline = Instant::now() + self.timeout;

        // Phase 1: applications
        let monitors: Vec<String> = system
            .actors()
            .into_iter()
            .filter(|info| info.kind == ActorKind::Monitor)
            .map(|info| info.name)
            .collect();
        debug!("Stopping {} applications", monitors.len());

        let mut kills = Vec::with_capacity(monitors.len());
        for name in &monitors {
            match system.kill_actor(name) {
                Ok(killed) => kills.push(killed),
                // Already stopped on its own
                Err(e) => debug!("Skipping monitor {}: {}", name, e),
            }
        }

        let outcomes = multi_async(kills)
            .wait(remaining(deadline))
            .map_err(|_| ShutdownError::Timeout(self.timeout))?;
        for outcome in outcomes {
            if let Err(failure) = outcome {
                warn!("Application did not stop cleanly: {}", failure.observed());
            }
        }

        // Phase 2: everything else, then the arbiter
        system
            .shutdown(remaining(deadline))
            .map_err(|e| {
                if e.is_timeout() {
                    ShutdownError::Timeout(self.timeout)
                } else {
                    ShutdownError::ActorFailed(e.to_string())
                }
            })?;

        info!(stopped = %json!(monitors), "Shutdown complete");
        Ok(())
    }
}

fn remaining(deadline: Instant) -> Duration {
    deadline.saturating_duration_since(Instant::now())
}
