//! Runtime configuration.
//!
//! Loaded from a JSON file. Every field has a default, so a partial file
//! (or no file at all) is valid.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::model::{DEFAULT_PREVIEW_LENGTH, Participant};
use crate::{Error, Result};

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// The local user; author of sent messages.
    pub identity: Participant,
    /// Backend simulation knobs.
    pub simulation: SimulationConfig,
    /// Optimistic store knobs.
    pub store: StoreConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            identity: Participant::new("Me", "me@example.com"),
            simulation: SimulationConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Simulated network behaviour of the session backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Delay applied to every backend call, in milliseconds.
    pub latency_ms: u64,
    /// Whether random failures are injected.
    pub failure_injection: bool,
    /// Probability of an injected failure per call, `0.0..=1.0`.
    pub failure_rate: f64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            latency_ms: 300,
            failure_injection: false,
            failure_rate: 0.2,
        }
    }
}

impl SimulationConfig {
    /// Returns the per-call latency.
    #[must_use]
    pub const fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Optimistic store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Backend calls slower than this fail and roll back, in milliseconds.
    pub call_timeout_ms: u64,
    /// How long a toast stays visible, in milliseconds.
    pub toast_lifetime_ms: u64,
    /// Maximum preview length in characters.
    pub preview_length: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            call_timeout_ms: 10_000,
            toast_lifetime_ms: 3_000,
            preview_length: DEFAULT_PREVIEW_LENGTH,
        }
    }
}

impl StoreConfig {
    /// Returns the backend call timeout.
    #[must_use]
    pub const fn call_timeout(&self) -> Duration {
        Duration::from_millis(self.call_timeout_ms)
    }

    /// Returns the toast lifetime.
    #[must_use]
    pub const fn toast_lifetime(&self) -> Duration {
        Duration::from_millis(self.toast_lifetime_ms)
    }
}

impl Config {
    /// Loads configuration from `path`, falling back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid JSON, or
    /// fails validation.
    pub async fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!(?path, "No config file, using defaults");
            return Ok(Self::default());
        }

        let contents = tokio::fs::read_to_string(path).await?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;

        info!(?path, "Configuration loaded");
        Ok(config)
    }

    /// Checks value ranges.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.simulation.failure_rate) {
            return Err(Error::Config(format!(
                "simulation.failure_rate must be within 0..=1, got {}",
                self.simulation.failure_rate
            )));
        }
        if self.store.call_timeout_ms == 0 {
            return Err(Error::Config(
                "store.call_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.store.preview_length == 0 {
            return Err(Error::Config(
                "store.preview_length must be greater than zero".to_string(),
            ));
        }
        if self.identity.email.trim().is_empty() {
            return Err(Error::Config("identity.email must not be empty".to_string()));
        }
        Ok(())
    }
}
