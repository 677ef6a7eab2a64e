//! Failure injection for exercising rollback paths.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::Rng;

use super::BackendOperation;
use crate::config::SimulationConfig;

/// Deterministic failure rule: returns true when the call should fail.
pub type FailurePredicate = Arc<dyn Fn(BackendOperation) -> bool + Send + Sync>;

/// Decides whether a backend call fails.
///
/// Random mode fails a fixed fraction of calls. Tests install a predicate
/// instead so they can assert on the outcome. Either way nothing fails while
/// the toggle is off.
pub struct FailureInjector {
    enabled: AtomicBool,
    rate: f64,
    predicate: Option<FailurePredicate>,
}

impl std::fmt::Debug for FailureInjector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FailureInjector")
            .field("enabled", &self.is_enabled())
            .field("rate", &self.rate)
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

impl Default for FailureInjector {
    fn default() -> Self {
        Self::disabled()
    }
}

impl FailureInjector {
    /// Never fails (until enabled).
    #[must_use]
    pub fn disabled() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            rate: SimulationConfig::default().failure_rate,
            predicate: None,
        }
    }

    /// Fails each call with probability `rate`.
    #[must_use]
    pub fn random(rate: f64) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            rate: if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) },
            predicate: None,
        }
    }

    /// Fails exactly the calls `predicate` selects.
    #[must_use]
    pub fn with_predicate(
        predicate: impl Fn(BackendOperation) -> bool + Send + Sync + 'static,
    ) -> Self {
        Self {
            enabled: AtomicBool::new(true),
            rate: 0.0,
            predicate: Some(Arc::new(predicate)),
        }
    }

    /// Fails every call to `operation`.
    #[must_use]
    pub fn failing(operation: BackendOperation) -> Self {
        Self::with_predicate(move |op| op == operation)
    }

    /// Builds the injector described by a simulation config.
    #[must_use]
    pub fn from_config(config: &SimulationConfig) -> Self {
        let injector = Self::random(config.failure_rate);
        injector.set_enabled(config.failure_injection);
        injector
    }

    /// Turns injection on or off at runtime.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Returns whether injection is on.
    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// Decides the fate of one call.
    #[must_use]
    pub fn should_fail(&self, operation: BackendOperation) -> bool {
        if !self.is_enabled() {
            return false;
        }
        match &self.predicate {
            Some(predicate) => predicate(operation),
            None => self.rate > 0.0 && rand::thread_rng().gen_bool(self.rate),
        }
    }
}
