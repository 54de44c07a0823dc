//! Podcast Failsafe Library
//!
//! Fault-tolerance core for the article-to-podcast pipeline. Calls to remote
//! services (article source, summarizer, text-to-speech, storage) are guarded
//! by a circuit breaker, retried with exponential backoff and jitter, and
//! optionally memoized by a read-through cache.
//!
//! # Features
//!
//! - **Circuit breaker**: Closed / Open / Half-Open with a cool-down probe
//! - **Retry**: bounded attempts, capped exponential backoff with ±10% jitter
//! - **Cache**: namespaced cache-aside manager over memory or filesystem stores
//! - **Metrics**: per-service call statistics and cache hit rates
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use podcast_failsafe::{CacheManager, Failsafe, config::FailsafeConfig};
//!
//! # async fn fetch_article(id: u64) -> podcast_failsafe::Result<String> { Ok(String::new()) }
//! # async fn run() -> podcast_failsafe::Result<()> {
//! let failsafe = Failsafe::new("article-source", &FailsafeConfig::default())?;
//! let cache = CacheManager::in_memory("podcast");
//!
//! let article: String = cache
//!     .remember("article:42", Duration::from_secs(3600), || {
//!         failsafe.call(|| fetch_article(42))
//!     })
//!     .await?;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod cache;
pub mod config;
pub mod error;
pub mod failsafe;

pub use cache::{CacheManager, CacheMetricsSnapshot, CacheStore, create_cache};
pub use error::{Error, ErrorKind, Result};
pub use failsafe::{CircuitBreaker, CircuitState, Failsafe, MetricsStore, RetryPolicy};

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Setup tracing/logging
///
/// `RUST_LOG` overrides `level`. `format` of `"json"` selects structured
/// output. Calling this is optional: without a subscriber nothing is logged.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn setup_tracing(level: &str, format: Option<&str>) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::registry().with(filter);

    let installed = match format {
        Some("json") => subscriber.with(fmt::layer().json()).try_init(),
        _ => subscriber.with(fmt::layer()).try_init(),
    };

    installed.map_err(|e| Error::Config(format!("Failed to install tracing subscriber: {e}")))
}
