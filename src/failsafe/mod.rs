//! Failsafe mechanisms: circuit breaker, retry, per-service metrics

mod circuit_breaker;
mod metrics;
mod retry;
mod rnd;
mod state;

pub use circuit_breaker::CircuitBreaker;
pub use metrics::{CircuitBreakerMetrics, MetricsStore, MetricsSummary};
pub use retry::{RetryPolicy, with_retry};
pub use state::CircuitState;

use std::future::Future;
use std::sync::Arc;

use crate::Result;
use crate::config::FailsafeConfig;

/// Combined failsafe wrapper for one remote service
///
/// Retries run inside the breaker's observed call: the breaker only sees a
/// failure once the retry policy has given up.
#[derive(Clone, Debug)]
pub struct Failsafe {
    /// Circuit breaker
    pub circuit_breaker: Arc<CircuitBreaker>,
    /// Retry policy
    pub retry_policy: RetryPolicy,
}

impl Failsafe {
    /// Create a new failsafe from configuration
    pub fn new(name: &str, config: &FailsafeConfig) -> Result<Self> {
        Self::with_store(name, config, Arc::new(MetricsStore::new()))
    }

    /// Create a failsafe whose breaker records into a shared metrics store
    pub fn with_store(name: &str, config: &FailsafeConfig, store: Arc<MetricsStore>) -> Result<Self> {
        Ok(Self {
            circuit_breaker: Arc::new(CircuitBreaker::with_store(
                name,
                &config.circuit_breaker,
                store,
            )?),
            retry_policy: RetryPolicy::new(&config.retry)?,
        })
    }

    /// Run `operation` with retries, guarded by the circuit breaker
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let name = self.circuit_breaker.name();
        self.circuit_breaker
            .call(|| with_retry(&self.retry_policy, name, operation))
            .await
    }

    /// Like [`call`](Self::call), falling back per
    /// [`CircuitBreaker::call_with_fallback`]
    pub async fn call_with_fallback<T, F, Fut, G, GFut>(&self, operation: F, fallback: G) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Result<T>>,
    {
        let name = self.circuit_breaker.name();
        self.circuit_breaker
            .call_with_fallback(|| with_retry(&self.retry_policy, name, operation), fallback)
            .await
    }

    /// Current circuit state
    pub fn state(&self) -> CircuitState {
        self.circuit_breaker.state()
    }

    /// Metrics snapshot for the protected service
    pub fn metrics(&self) -> CircuitBreakerMetrics {
        self.circuit_breaker.metrics()
    }
}
