//! Per-service circuit breaker metrics
//!
//! Tracks, for every service name:
//! - Success/failure totals
//! - Consecutive success/failure streaks
//! - Accumulated call duration
//! - Whether the circuit is flagged open, and since when

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

/// Health metrics of a single service
#[derive(Debug, Clone, Default)]
pub struct CircuitBreakerMetrics {
    /// Total successful calls
    pub success_count: u64,
    /// Total failed calls
    pub failure_count: u64,
    /// Successes since the last failure
    pub consecutive_successes: u64,
    /// Failures since the last success
    pub consecutive_failures: u64,
    /// Accumulated duration of all recorded calls
    pub total_duration: Duration,
    /// Whether the circuit is flagged open
    pub is_open: bool,
    /// When the circuit was last flagged open
    pub opened_at: Option<Instant>,
}

impl CircuitBreakerMetrics {
    /// Record a successful call
    pub fn record_success(&mut self, duration: Duration) {
        self.success_count += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
        self.total_duration += duration;
    }

    /// Record a failed call
    pub fn record_failure(&mut self, duration: Duration) {
        self.failure_count += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
        self.total_duration += duration;
    }

    /// Total recorded calls
    #[must_use]
    pub fn total_calls(&self) -> u64 {
        self.success_count + self.failure_count
    }

    /// Fraction of failed calls (0.0-1.0), `0.0` before any call
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn failure_rate(&self) -> f64 {
        let total = self.total_calls();
        if total == 0 {
            0.0
        } else {
            self.failure_count as f64 / total as f64
        }
    }

    /// Mean call duration, zero before any call
    #[allow(clippy::cast_precision_loss)]
    #[must_use]
    pub fn average_response_time(&self) -> Duration {
        match u32::try_from(self.total_calls()) {
            Ok(0) => Duration::ZERO,
            Ok(total) => self.total_duration / total,
            Err(_) => Duration::from_secs_f64(
                self.total_duration.as_secs_f64() / self.total_calls() as f64,
            ),
        }
    }

    /// Flag the circuit open as of now
    pub fn mark_open(&mut self) {
        self.is_open = true;
        self.opened_at = Some(Instant::now());
    }

    /// Flag the circuit closed and clear both streaks
    pub fn mark_closed(&mut self) {
        self.is_open = false;
        self.opened_at = None;
        self.consecutive_failures = 0;
        self.consecutive_successes = 0;
    }

    /// Whether an open circuit has cooled down long enough to admit a probe
    #[must_use]
    pub fn should_attempt_reset(&self, reset_timeout: Duration) -> bool {
        match (self.is_open, self.opened_at) {
            (true, Some(opened_at)) => opened_at.elapsed() >= reset_timeout,
            _ => false,
        }
    }

    /// Time left before a probe is admitted, `None` when not open
    #[must_use]
    pub fn remaining_cooldown(&self, reset_timeout: Duration) -> Option<Duration> {
        if !self.is_open {
            return None;
        }
        self.opened_at
            .map(|opened_at| reset_timeout.saturating_sub(opened_at.elapsed()))
    }

    /// Serializable snapshot for logs and status endpoints
    #[must_use]
    pub fn summary(&self) -> MetricsSummary {
        MetricsSummary {
            success_count: self.success_count,
            failure_count: self.failure_count,
            failure_rate: self.failure_rate(),
            average_response_time_ms: self.average_response_time().as_secs_f64() * 1000.0,
            is_open: self.is_open,
            consecutive_failures: self.consecutive_failures,
            consecutive_successes: self.consecutive_successes,
        }
    }
}

/// Flattened view of [`CircuitBreakerMetrics`]
#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    /// Total successful calls
    pub success_count: u64,
    /// Total failed calls
    pub failure_count: u64,
    /// Failure rate (0.0-1.0)
    pub failure_rate: f64,
    /// Mean call duration (milliseconds)
    pub average_response_time_ms: f64,
    /// Whether the circuit is flagged open
    pub is_open: bool,
    /// Current failure streak
    pub consecutive_failures: u64,
    /// Current success streak
    pub consecutive_successes: u64,
}

/// Metrics for many services, keyed by service name
///
/// Breakers protecting the same service can share one store through an
/// `Arc`; each service's metrics stay independent.
#[derive(Debug, Default)]
pub struct MetricsStore {
    metrics: Mutex<HashMap<String, CircuitBreakerMetrics>>,
}

impl MetricsStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `f` against the metrics of `service`, creating them on first use
    ///
    /// The store lock is held for the duration of `f`.
    pub fn with_metrics<R>(
        &self,
        service: &str,
        f: impl FnOnce(&mut CircuitBreakerMetrics) -> R,
    ) -> R {
        let mut metrics = self.metrics.lock();
        f(metrics.entry(service.to_string()).or_default())
    }

    /// Record a successful call for `service`
    pub fn record_success(&self, service: &str, duration: Duration) {
        self.with_metrics(service, |m| m.record_success(duration));
    }

    /// Record a failed call for `service`
    pub fn record_failure(&self, service: &str, duration: Duration) {
        self.with_metrics(service, |m| m.record_failure(duration));
    }

    /// Copy of the current metrics of `service`
    #[must_use]
    pub fn snapshot(&self, service: &str) -> CircuitBreakerMetrics {
        self.metrics
            .lock()
            .get(service)
            .cloned()
            .unwrap_or_default()
    }

    /// Discard everything recorded for `service`
    pub fn reset(&self, service: &str) {
        self.metrics.lock().remove(service);
        debug!(service, "Circuit breaker metrics reset");
    }

    /// Names of all services with recorded metrics
    #[must_use]
    pub fn services(&self) -> Vec<String> {
        let mut names: Vec<String> = self.metrics.lock().keys().cloned().collect();
        names.sort();
        names
    }
}
