//! Retry logic with exponential backoff

use std::collections::HashSet;
use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{Instrument, debug, warn};

use super::rnd::Rnd;
use crate::config::RetryConfig;
use crate::error::ErrorKind;
use crate::{Error, Result};

/// Jitter spread around the computed delay (±10%)
const JITTER_FACTOR: u64 = 10;

/// Default cap for the preset constructors
const DEFAULT_MAX_DELAY: Duration = Duration::from_secs(5);

/// Retry policy
///
/// Holds no per-call state, so one policy can serve any number of
/// concurrent executions.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    enabled: bool,
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    multiplier: f64,
    retryable_kinds: HashSet<ErrorKind>,
    rnd: Rnd,
}

impl RetryPolicy {
    /// Create from config
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `max_attempts` is zero or the multiplier
    /// is below 1.0.
    pub fn new(config: &RetryConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            enabled: config.enabled,
            max_attempts: config.max_attempts,
            base_delay: config.base_delay,
            max_delay: config.max_delay,
            multiplier: config.multiplier,
            retryable_kinds: config.retryable_kinds.iter().copied().collect(),
            rnd: Rnd::default(),
        })
    }

    /// Single attempt, never retries
    #[must_use]
    pub fn immediate() -> Self {
        Self {
            enabled: true,
            max_attempts: 1,
            base_delay: Duration::ZERO,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 1.0,
            retryable_kinds: HashSet::new(),
            rnd: Rnd::default(),
        }
    }

    /// Constant `delay` between attempts
    pub fn linear(max_attempts: u32, delay: Duration) -> Result<Self> {
        Self::new(&RetryConfig {
            max_attempts,
            base_delay: delay,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 1.0,
            ..RetryConfig::default()
        })
    }

    /// Delay doubling from `base_delay` on every attempt
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Result<Self> {
        Self::new(&RetryConfig {
            max_attempts,
            base_delay,
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            ..RetryConfig::default()
        })
    }

    /// Only retry errors of these kinds (an empty set retries everything)
    #[must_use]
    pub fn with_retryable_kinds(mut self, kinds: impl IntoIterator<Item = ErrorKind>) -> Self {
        self.retryable_kinds = kinds.into_iter().collect();
        self
    }

    /// Cap the computed delay
    #[must_use]
    pub fn with_max_delay(mut self, max_delay: Duration) -> Self {
        self.max_delay = max_delay;
        self
    }

    /// Draw jitter from a seeded generator for reproducible delays
    #[must_use]
    pub fn with_jitter_seed(mut self, seed: u64) -> Self {
        self.rnd = Rnd::seeded(seed);
        self
    }

    /// Maximum attempts, including the first one
    pub fn max_attempts(&self) -> u32 {
        if self.enabled { self.max_attempts } else { 1 }
    }

    /// Whether `error` is worth another attempt
    pub fn is_retryable(&self, error: &Error) -> bool {
        self.retryable_kinds.is_empty() || self.retryable_kinds.contains(&error.kind())
    }

    /// Delay to wait after failed attempt number `attempt` (1-based)
    ///
    /// `min(max_delay, base_delay * multiplier^(attempt - 1))` in whole
    /// milliseconds, then shifted by up to ±10% jitter. The cap is not
    /// applied again after jitter, so the result may slightly exceed
    /// `max_delay`.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let raw_ms = self.base_delay.as_millis() as f64 * self.multiplier.powi(exponent);
        let max_ms = u64::try_from(self.max_delay.as_millis()).unwrap_or(u64::MAX);
        // float-to-int casts saturate, so an overflowing power lands on the cap
        let delay_ms = (raw_ms as u64).min(max_ms);

        let spread = delay_ms / JITTER_FACTOR;
        let jitter = ((self.rnd.next_f64() * 2.0 - 1.0) * spread as f64).round() as i64;

        Duration::from_millis(delay_ms.saturating_add_signed(jitter))
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error,
    /// or runs out of attempts
    ///
    /// # Errors
    ///
    /// Returns the error of the last attempt made.
    pub async fn execute<T, F, Fut>(&self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 1u32;

        loop {
            debug!(attempt, max_attempts, "Executing operation");

            let error = match operation().await {
                Ok(value) => return Ok(value),
                Err(e) => e,
            };

            if attempt >= max_attempts {
                debug!(
                    attempts = attempt,
                    error = %error,
                    "Max retry attempts reached"
                );
                return Err(error);
            }

            if !self.is_retryable(&error) {
                debug!(
                    attempt,
                    kind = %error.kind(),
                    "Error is not retryable"
                );
                return Err(error);
            }

            let delay = self.delay_for_attempt(attempt);
            warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis(),
                kind = %error.kind(),
                error = %error,
                "Operation failed, retrying"
            );
            sleep(delay).await;
            attempt += 1;
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: DEFAULT_MAX_DELAY,
            multiplier: 2.0,
            retryable_kinds: HashSet::new(),
            rnd: Rnd::default(),
        }
    }
}

/// Execute a future with retry logic, logging under `operation = name`
///
/// # Errors
///
/// Returns the last error from `f` if all retry attempts are exhausted or
/// the error is not retryable.
pub async fn with_retry<F, Fut, T>(policy: &RetryPolicy, name: &str, f: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    policy
        .execute(f)
        .instrument(tracing::debug_span!("retry", operation = name))
        .await
}
