//! End-to-end tests: cache over retry over circuit breaker

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use pretty_assertions::assert_eq;
use tokio_test::{assert_err, assert_ok};

use podcast_failsafe::config::{CircuitBreakerConfig, Config, FailsafeConfig, RetryConfig};
use podcast_failsafe::{
    CacheManager, CircuitBreaker, CircuitState, Error, ErrorKind, Failsafe, MetricsStore,
    RetryPolicy, create_cache,
};

fn fast_failsafe_config(failure_threshold: u32) -> FailsafeConfig {
    FailsafeConfig {
        circuit_breaker: CircuitBreakerConfig {
            failure_threshold,
            reset_timeout: Duration::from_millis(50),
            ..Default::default()
        },
        retry: RetryConfig {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            ..Default::default()
        },
    }
}

#[tokio::test]
async fn test_breaker_trips_and_resets() {
    let config = CircuitBreakerConfig {
        failure_threshold: 3,
        ..Default::default()
    };
    let cb = CircuitBreaker::new("article-source", &config).unwrap();

    for _ in 0..3 {
        let result = cb
            .call(|| async { Err::<(), _>(Error::Transport("connection refused".to_string())) })
            .await;
        assert_eq!(assert_err!(result).kind(), ErrorKind::Transport);
    }
    assert_eq!(cb.state_name(), "open");

    let invoked = AtomicU32::new(0);
    let result = cb
        .call(|| async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .await;
    assert!(assert_err!(result).is_circuit_open());
    assert_eq!(invoked.load(Ordering::SeqCst), 0);

    cb.reset();
    assert_eq!(cb.state_name(), "closed");

    let value = assert_ok!(cb.call(|| async { Ok("article body") }).await);
    assert_eq!(value, "article body");
    assert_eq!(cb.metrics().success_count, 1);
}

#[tokio::test]
async fn test_cache_hit_bypasses_retry_and_breaker() {
    let failsafe = Failsafe::new("summarizer", &fast_failsafe_config(2)).unwrap();
    let cache = CacheManager::in_memory("podcast");
    let remote_calls = AtomicU32::new(0);

    for _ in 0..3 {
        let summary: String = assert_ok!(
            cache
                .remember("summary:article-1", Duration::from_secs(60), || {
                    failsafe.call(|| async {
                        remote_calls.fetch_add(1, Ordering::SeqCst);
                        Ok("A short summary".to_string())
                    })
                })
                .await
        );
        assert_eq!(summary, "A short summary");
    }

    assert_eq!(remote_calls.load(Ordering::SeqCst), 1);
    assert_eq!(failsafe.metrics().total_calls(), 1);
    let metrics = cache.metrics();
    assert_eq!((metrics.hits, metrics.misses), (2, 1));
}

#[tokio::test]
async fn test_pipeline_degrades_and_recovers() {
    let store = Arc::new(MetricsStore::new());
    let tts = Failsafe::with_store("tts", &fast_failsafe_config(2), Arc::clone(&store)).unwrap();
    let healthy = Arc::new(std::sync::atomic::AtomicBool::new(false));
    let attempts = AtomicU32::new(0);

    let synthesize = || {
        let healthy = Arc::clone(&healthy);
        let attempts = &attempts;
        async move {
            attempts.fetch_add(1, Ordering::SeqCst);
            if healthy.load(Ordering::SeqCst) {
                Ok(vec![0_u8; 4])
            } else {
                Err(Error::Remote("tts 503".to_string()))
            }
        }
    };

    for _ in 0..2 {
        assert_err!(tts.call(synthesize).await);
    }
    // two calls, two attempts each
    assert_eq!(attempts.load(Ordering::SeqCst), 4);
    assert_eq!(tts.state(), CircuitState::Open);

    let audio = assert_ok!(
        tts.call_with_fallback(synthesize, || async { Ok(Vec::new()) })
            .await
    );
    assert!(audio.is_empty());
    assert_eq!(attempts.load(Ordering::SeqCst), 4);

    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(60)).await;

    for _ in 0..2 {
        assert_eq!(assert_ok!(tts.call(synthesize).await).len(), 4);
    }
    assert_eq!(tts.state(), CircuitState::Closed);

    let snapshot = store.snapshot("tts");
    assert_eq!(snapshot.failure_count, 2);
    assert_eq!(snapshot.success_count, 2);
    assert!(!snapshot.is_open);
}

#[tokio::test]
async fn test_non_retryable_error_fails_fast() {
    let policy = RetryPolicy::exponential(5, Duration::from_millis(1))
        .unwrap()
        .with_retryable_kinds([ErrorKind::Timeout, ErrorKind::Transport]);
    let attempts = AtomicU32::new(0);

    let result = policy
        .execute(|| async {
            attempts.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(Error::InvalidInput("empty article".to_string()))
        })
        .await;

    assert_eq!(assert_err!(result).kind(), ErrorKind::InvalidInput);
    assert_eq!(attempts.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_config_file_drives_everything() {
    let dir = tempfile::tempdir().unwrap();
    let cache_dir = dir.path().join("cache");
    let config_path = dir.path().join("failsafe.yaml");
    std::fs::write(
        &config_path,
        format!(
            r"
failsafe:
  circuit_breaker:
    failure_threshold: 1
    reset_timeout: 10s
  retry:
    max_attempts: 1
    base_delay: 1ms
cache:
  backend: filesystem
  namespace: episodes
  directory: {}
",
            cache_dir.display()
        ),
    )
    .unwrap();

    let config = Config::load(Some(&config_path)).unwrap();
    let failsafe = Failsafe::new("storage", &config.failsafe).unwrap();
    let cache = create_cache(&config.cache).await.unwrap();
    assert_eq!(cache.backend_name(), "filesystem");

    let url: String = assert_ok!(
        cache
            .remember("episode:1", Duration::ZERO, || {
                failsafe.call(|| async { Ok("https://cdn.example/ep1.mp3".to_string()) })
            })
            .await
    );
    assert_eq!(url, "https://cdn.example/ep1.mp3");

    // a fresh manager over the same directory sees the stored entry
    let reopened = create_cache(&config.cache).await.unwrap();
    assert_eq!(
        reopened.get::<String>("episode:1").await,
        Some("https://cdn.example/ep1.mp3".to_string())
    );

    let result = failsafe
        .call(|| async { Err::<(), _>(Error::Storage("bucket gone".to_string())) })
        .await;
    assert_err!(result);
    assert_eq!(failsafe.state(), CircuitState::Open);
}
