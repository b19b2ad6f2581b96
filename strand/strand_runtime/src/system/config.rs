//! Configuration for Strand Runtime
//!
//! Handles loading and managing runtime configuration.

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use strand_concurrency::actor::ActorSystemConfig;
use strand_core::{LogLevel, Value};
use thiserror::Error;
use tracing::{info, warn};

/// Errors that can occur in configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ParseFailed(String),

    /// A value is out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Per-application settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplicationConfig {
    /// Number of workers, overriding the application's own choice
    #[serde(default)]
    pub workers: Option<usize>,

    /// Configuration value handed to the application's actors
    #[serde(default)]
    pub cfg: Value,
}

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Log level, overridden by the `STRAND_LOG` environment variable
    #[serde(default)]
    pub log_level: LogLevel,

    /// Maximum number of queued requests per actor
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,

    /// Workers for applications that do not choose; defaults to the CPU count
    #[serde(default)]
    pub default_workers: Option<usize>,

    /// Default timeout (milliseconds) applications use for their requests
    #[serde(default)]
    pub send_timeout_ms: Option<u64>,

    /// Shutdown timeout (seconds)
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u32,

    /// Application settings by name
    #[serde(default)]
    pub applications: HashMap<String, ApplicationConfig>,

    /// Additional configuration
    #[serde(default)]
    pub extra: HashMap<String, Value>,
}

fn default_mailbox_capacity() -> usize {
    1024
}

fn default_shutdown_timeout() -> u32 {
    30
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::default(),
            mailbox_capacity: default_mailbox_capacity(),
            default_workers: None,
            send_timeout_ms: None,
            shutdown_timeout: default_shutdown_timeout(),
            applications: HashMap::new(),
            extra: HashMap::new(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a file
    ///
    /// Files ending in `.toml` are read as TOML, anything else as JSON. A
    /// missing file yields the defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // Start with default configuration
        let mut config = RuntimeConfig::default();

        // If a path is provided, try to load from it
        if let Some(path) = path {
            info!("Loading configuration from {}", path.display());

            if !path.exists() {
                warn!("Configuration file not found: {}", path.display());
                return Ok(config);
            }

            let content = fs::read_to_string(path).context(format!(
                "Failed to read configuration file: {}",
                path.display()
            ))?;

            config = Self::parse(&content, path)
                .context(format!("Failed to parse configuration file: {}", path.display()))?;
        } else {
            info!("No configuration file specified, using defaults");
        }

        // Validate the configuration
        config.validate()?;

        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let is_toml = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("toml"))
            .unwrap_or(false);

        if is_toml {
            toml::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
        } else {
            serde_json::from_str(content).map_err(|e| ConfigError::ParseFailed(e.to_string()))
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.mailbox_capacity == 0 {
            return Err(ConfigError::Invalid("Mailbox capacity cannot be zero".to_string()).into());
        }

        if self.shutdown_timeout == 0 {
            return Err(ConfigError::Invalid("Shutdown timeout cannot be zero".to_string()).into());
        }

        if self.default_workers == Some(0) {
            return Err(ConfigError::Invalid("Default workers cannot be zero".to_string()).into());
        }

        if self.send_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid("Send timeout cannot be zero".to_string()).into());
        }

        for (name, app) in &self.applications {
            if app.workers == Some(0) {
                warn!("Application {} is configured with no workers", name);
            }
        }

        Ok(())
    }

    /// Merge with another configuration
    pub fn merge(&mut self, other: RuntimeConfig) {
        self.log_level = other.log_level;

        if other.mailbox_capacity > 0 {
            self.mailbox_capacity = other.mailbox_capacity;
        }

        if other.default_workers.is_some() {
            self.default_workers = other.default_workers;
        }

        if other.send_timeout_ms.is_some() {
            self.send_timeout_ms = other.send_timeout_ms;
        }

        if other.shutdown_timeout > 0 {
            self.shutdown_timeout = other.shutdown_timeout;
        }

        for (name, config) in other.applications {
            self.applications.insert(name, config);
        }

        for (key, value) in other.extra {
            self.extra.insert(key, value);
        }
    }

    /// Shutdown timeout as a duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(u64::from(self.shutdown_timeout))
    }

    /// Default request timeout, if configured
    pub fn send_timeout(&self) -> Option<Duration> {
        self.send_timeout_ms.map(Duration::from_millis)
    }

    /// Settings of the actor system this configuration describes
    pub fn actor_system(&self) -> ActorSystemConfig {
        let mut config = ActorSystemConfig {
            mailbox_capacity: self.mailbox_capacity,
            ..ActorSystemConfig::default()
        };
        if let Some(workers) = self.default_workers {
            config.default_workers = workers;
        }
        config
    }

    /// Run configuration of application `name`
    ///
    /// The configured worker count is folded into the value under
    /// `"workers"`, where the arbiter looks for it.
    pub fn application_cfg(&self, name: &str) -> Value {
        let Some(app) = self.applications.get(name) else {
            return Value::Null;
        };

        let mut cfg = match &app.cfg {
            Value::Object(map) => map.clone(),
            Value::Null => serde_json::Map::new(),
            other => {
                let mut map = serde_json::Map::new();
                map.insert("value".to_string(), other.clone());
                map
            }
        };
        if let Some(workers) = app.workers {
            cfg.insert("workers".to_string(), Value::from(workers));
        }
        Value::Object(cfg)
    }
}
