//! Circuit breaker implementation

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::RwLock;
use tracing::{debug, info, warn};

use super::metrics::{CircuitBreakerMetrics, MetricsStore};
use super::state::CircuitState;
use crate::config::CircuitBreakerConfig;
use crate::{Error, Result};

/// Circuit breaker protecting one named service
pub struct CircuitBreaker {
    /// Service name, also the key into the metrics store
    name: String,
    /// Configuration
    config: CircuitBreakerConfig,
    /// State
    state: RwLock<CircuitState>,
    /// Metrics, possibly shared with other breakers
    store: Arc<MetricsStore>,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with its own metrics store
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a threshold is zero.
    pub fn new(name: &str, config: &CircuitBreakerConfig) -> Result<Self> {
        Self::with_store(name, config, Arc::new(MetricsStore::new()))
    }

    /// Create a circuit breaker recording into a shared metrics store
    ///
    /// Breakers only share state through the store; two breakers with the
    /// same name over different stores are independent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a threshold is zero.
    pub fn with_store(
        name: &str,
        config: &CircuitBreakerConfig,
        store: Arc<MetricsStore>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            name: name.to_string(),
            config: config.clone(),
            state: RwLock::new(CircuitState::Closed),
            store,
        })
    }

    /// Run `operation` through the breaker
    ///
    /// Fails fast with [`Error::CircuitOpen`] without invoking `operation`
    /// while the circuit rejects calls. Otherwise the outcome is recorded and
    /// the operation's own result is returned unchanged.
    #[tracing::instrument(skip_all, fields(service = %self.name))]
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if !self.can_attempt_call() {
            warn!("Circuit open, rejecting call");
            return Err(Error::circuit_open(&self.name));
        }

        let started = Instant::now();
        match operation().await {
            Ok(value) => {
                self.record_success(started.elapsed());
                Ok(value)
            }
            Err(e) => {
                self.record_failure(started.elapsed());
                Err(e)
            }
        }
    }

    /// Like [`call`](Self::call), but answers with `fallback` instead of failing
    ///
    /// The fallback runs when the circuit is open, or when the operation fails
    /// with an error kind not listed in `ignored_error_kinds`. Ignored kinds
    /// are returned to the caller unchanged.
    pub async fn call_with_fallback<T, F, Fut, G, GFut>(&self, operation: F, fallback: G) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T>>,
    {
        match self.call(operation).await {
            Ok(value) => Ok(value),
            Err(e) if e.is_circuit_open() => {
                debug!(service = %self.name, "Circuit open, using fallback");
                fallback().await
            }
            Err(e) if self.config.is_ignored(e.kind()) => Err(e),
            Err(e) => {
                warn!(service = %self.name, error = %e, "Call failed, using fallback");
                fallback().await
            }
        }
    }

    /// Check whether a call would be admitted right now
    pub fn can_attempt_call(&self) -> bool {
        if !self.config.enabled {
            return true;
        }

        let state = *self.state.read();
        self.store
            .with_metrics(&self.name, |m| state.can_attempt_call(m, &self.config))
    }

    /// Record a successful call and advance the state
    pub fn record_success(&self, duration: Duration) {
        let mut state = self.state.write();
        let from = *state;
        let to = self.store.with_metrics(&self.name, |m| {
            m.record_success(duration);
            if self.config.enabled {
                from.on_success(m, &self.config)
            } else {
                from
            }
        });
        *state = to;
        drop(state);

        self.log_transition(from, to);
    }

    /// Record a failed call and advance the state
    pub fn record_failure(&self, duration: Duration) {
        let mut state = self.state.write();
        let from = *state;
        let to = self.store.with_metrics(&self.name, |m| {
            m.record_failure(duration);
            if self.config.enabled {
                from.on_failure(m, &self.config)
            } else {
                from
            }
        });
        *state = to;
        drop(state);

        self.log_transition(from, to);
    }

    /// Get current state
    pub fn state(&self) -> CircuitState {
        *self.state.read()
    }

    /// Current state name: `"closed"`, `"open"` or `"half-open"`
    pub fn state_name(&self) -> &'static str {
        self.state().name()
    }

    /// Discard this service's metrics and close the circuit
    pub fn reset(&self) {
        let mut state = self.state.write();
        self.store.reset(&self.name);
        *state = CircuitState::Closed;
        info!(service = %self.name, "Circuit breaker reset");
    }

    /// Snapshot of this service's metrics
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.store.snapshot(&self.name)
    }

    /// Service name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Configuration
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Human-readable status, e.g. for a degraded-service notice
    pub fn status_message(&self) -> String {
        let state = self.state();
        let metrics = self.metrics();
        match state {
            CircuitState::Closed => format!("Service '{}' circuit breaker is closed", self.name),
            CircuitState::Open => {
                let remaining = metrics
                    .remaining_cooldown(self.config.reset_timeout)
                    .unwrap_or_default();
                format!(
                    "Service '{}' circuit breaker is open after {} consecutive failures, retry in {} seconds",
                    self.name,
                    metrics.consecutive_failures,
                    remaining.as_secs_f64().ceil()
                )
            }
            CircuitState::HalfOpen => format!(
                "Service '{}' circuit breaker is half-open, testing recovery ({}/{} successes)",
                self.name, metrics.consecutive_successes, self.config.success_threshold
            ),
        }
    }

    fn log_transition(&self, from: CircuitState, to: CircuitState) {
        if from == to {
            return;
        }

        match to {
            CircuitState::Open => {
                let metrics = self.metrics();
                warn!(
                    service = %self.name,
                    from = %from,
                    consecutive_failures = metrics.consecutive_failures,
                    failure_rate = metrics.failure_rate(),
                    "Circuit breaker opened"
                );
            }
            CircuitState::Closed => {
                info!(service = %self.name, from = %from, "Circuit breaker closed");
            }
            CircuitState::HalfOpen => {
                debug!(service = %self.name, from = %from, "Circuit breaker half-open");
            }
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
