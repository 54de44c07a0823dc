//! Circuit state transitions
//!
//! ```text
//! Closed   --failures >= failure_threshold-->   Open
//! Open     --cool-down elapsed, probe succeeds--> HalfOpen
//! HalfOpen --successes >= success_threshold-->  Closed
//! HalfOpen --any failure-->                      Open
//! ```
//!
//! Every function here is pure over (state, metrics, config): the breaker
//! records the outcome in the metrics first, then asks the current state
//! where to go next.

use std::fmt;

use serde::Serialize;

use super::metrics::CircuitBreakerMetrics;
use crate::config::CircuitBreakerConfig;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CircuitState {
    /// Circuit is closed (allowing requests)
    #[default]
    Closed,
    /// Circuit is open (blocking requests until the cool-down elapses)
    Open,
    /// Circuit is half-open (probing whether the service recovered)
    HalfOpen,
}

impl CircuitState {
    /// Observability name: `"closed"`, `"open"` or `"half-open"`
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half-open",
        }
    }

    /// Whether a call may be attempted right now
    #[must_use]
    pub fn can_attempt_call(
        self,
        metrics: &CircuitBreakerMetrics,
        config: &CircuitBreakerConfig,
    ) -> bool {
        match self {
            Self::Closed | Self::HalfOpen => true,
            Self::Open => metrics.should_attempt_reset(config.reset_timeout),
        }
    }

    /// Next state after a recorded success
    #[must_use]
    pub fn on_success(
        self,
        metrics: &mut CircuitBreakerMetrics,
        config: &CircuitBreakerConfig,
    ) -> Self {
        match self {
            Self::Closed => Self::Closed,
            // a probe got through and succeeded
            Self::Open => Self::HalfOpen,
            Self::HalfOpen => {
                if metrics.consecutive_successes >= u64::from(config.success_threshold) {
                    metrics.mark_closed();
                    Self::Closed
                } else {
                    Self::HalfOpen
                }
            }
        }
    }

    /// Next state after a recorded failure
    #[must_use]
    pub fn on_failure(
        self,
        metrics: &mut CircuitBreakerMetrics,
        config: &CircuitBreakerConfig,
    ) -> Self {
        match self {
            Self::Closed => {
                if metrics.consecutive_failures >= u64::from(config.failure_threshold) {
                    metrics.mark_open();
                    Self::Open
                } else {
                    Self::Closed
                }
            }
            // a failed probe leaves opened_at alone, the cool-down is not restarted
            Self::Open => Self::Open,
            Self::HalfOpen => {
                metrics.mark_open();
                Self::Open
            }
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
