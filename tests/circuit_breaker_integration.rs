//! Circuit breaker integration tests - per-service configuration

use std::sync::Arc;
use std::time::Duration;

use podcast_failsafe::config::CircuitBreakerConfig;
use podcast_failsafe::failsafe::{CircuitBreaker, CircuitState, MetricsStore};

fn breaker(name: &str, failure_threshold: u32, success_threshold: u32) -> CircuitBreaker {
    let config = CircuitBreakerConfig {
        failure_threshold,
        success_threshold,
        reset_timeout: Duration::from_secs(60),
        ..Default::default()
    };
    CircuitBreaker::new(name, &config).unwrap()
}

#[test]
fn test_circuit_breaker_with_custom_config() {
    let cb = breaker("summarizer", 3, 4);

    for _ in 0..2 {
        cb.record_failure(Duration::from_millis(10));
    }
    assert!(cb.can_attempt_call());

    cb.record_failure(Duration::from_millis(10));
    assert!(!cb.can_attempt_call());
    assert_eq!(cb.state(), CircuitState::Open);
}

#[test]
fn test_circuit_breaker_with_lenient_config() {
    let cb = breaker("flaky-tts", 10, 2);

    for _ in 0..5 {
        cb.record_failure(Duration::from_millis(10));
    }
    assert!(cb.can_attempt_call());

    for _ in 0..5 {
        cb.record_failure(Duration::from_millis(10));
    }
    assert!(!cb.can_attempt_call());
}

#[test]
fn test_success_resets_consecutive_failures() {
    let cb = breaker("storage", 3, 2);

    cb.record_failure(Duration::ZERO);
    cb.record_failure(Duration::ZERO);
    cb.record_success(Duration::ZERO);
    cb.record_failure(Duration::ZERO);
    cb.record_failure(Duration::ZERO);

    assert_eq!(cb.state(), CircuitState::Closed);
    let metrics = cb.metrics();
    assert_eq!(metrics.failure_count, 4);
    assert_eq!(metrics.success_count, 1);
    assert_eq!(metrics.consecutive_failures, 2);
}

#[test]
fn test_status_message_format() {
    let cb = breaker("article-source", 3, 2);

    let message = cb.status_message();
    assert!(message.contains("article-source"));
    assert!(message.contains("closed"));

    for _ in 0..3 {
        cb.record_failure(Duration::from_millis(5));
    }
    let message = cb.status_message();
    assert!(message.contains("Service 'article-source'"));
    assert!(message.contains("circuit breaker is open"));
    assert!(message.contains("3 consecutive failures"));
    assert!(message.contains("retry in"));
    assert!(message.contains("seconds"));
}

#[test]
fn test_breakers_sharing_a_store_stay_independent() {
    let store = Arc::new(MetricsStore::new());
    let config = CircuitBreakerConfig {
        failure_threshold: 2,
        ..Default::default()
    };
    let summarizer = CircuitBreaker::with_store("summarizer", &config, Arc::clone(&store)).unwrap();
    let tts = CircuitBreaker::with_store("tts", &config, Arc::clone(&store)).unwrap();

    summarizer.record_failure(Duration::ZERO);
    summarizer.record_failure(Duration::ZERO);
    tts.record_success(Duration::from_millis(40));

    assert_eq!(summarizer.state(), CircuitState::Open);
    assert_eq!(tts.state(), CircuitState::Closed);
    assert_eq!(store.services(), vec!["summarizer".to_string(), "tts".to_string()]);
    assert_eq!(store.snapshot("summarizer").consecutive_failures, 2);
    assert_eq!(store.snapshot("tts").success_count, 1);

    // open/closed flags are set by the breaker's transitions alone
    assert!(store.snapshot("summarizer").is_open);
    assert!(store.snapshot("summarizer").opened_at.is_some());
    assert!(!store.snapshot("tts").is_open);
}

#[test]
fn test_half_open_needs_success_threshold() {
    let config = CircuitBreakerConfig {
        failure_threshold: 1,
        success_threshold: 3,
        reset_timeout: Duration::from_millis(10),
        ..Default::default()
    };
    let cb = CircuitBreaker::new("podcast-host", &config).unwrap();

    cb.record_failure(Duration::ZERO);
    assert_eq!(cb.state(), CircuitState::Open);

    std::thread::sleep(Duration::from_millis(20));
    assert!(cb.can_attempt_call());

    cb.record_success(Duration::ZERO);
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    cb.record_success(Duration::ZERO);
    assert_eq!(cb.state(), CircuitState::HalfOpen);
    assert!(cb.status_message().contains("(2/3 successes)"));

    cb.record_success(Duration::ZERO);
    assert_eq!(cb.state(), CircuitState::Closed);
    assert!(!cb.metrics().is_open);
}
