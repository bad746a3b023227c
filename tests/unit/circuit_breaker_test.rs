use std::sync::Arc;

use chrono::{Duration, Utc};

use currency_exchange_backend::config::BreakerSettings;
use currency_exchange_backend::providers::ProviderCallResult;
use currency_exchange_backend::services::cache::{BreakerState, RateCache};
use currency_exchange_backend::services::circuit_breaker::CircuitBreaker;
use currency_exchange_backend::services::history::HistoryStore;

use crate::fixtures::{MemoryCache, MemoryHistory};

const PROVIDER_ID: i32 = 1;

fn ok_result() -> ProviderCallResult {
    ProviderCallResult {
        provider_name: "TestProvider".to_string(),
        endpoint: "latest".to_string(),
        http_status_code: Some(200),
        response_time_ms: 5,
        was_successful: true,
        error_message: None,
        data: None,
    }
}

fn failed_result() -> ProviderCallResult {
    ProviderCallResult {
        provider_name: "TestProvider".to_string(),
        endpoint: "latest".to_string(),
        http_status_code: None,
        response_time_ms: 5,
        was_successful: false,
        error_message: Some("Timeout after 3s".to_string()),
        data: None,
    }
}

fn setup(
    failure_threshold: u32,
    recovery_timeout_secs: u64,
    success_threshold: u32,
) -> (Arc<MemoryCache>, Arc<MemoryHistory>, CircuitBreaker) {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::new());
    let breaker = CircuitBreaker::new(
        PROVIDER_ID,
        "TestProvider",
        Arc::clone(&cache) as Arc<dyn RateCache>,
        Arc::clone(&history) as Arc<dyn HistoryStore>,
        BreakerSettings {
            failure_threshold,
            recovery_timeout_secs,
            success_threshold,
        },
    );
    (cache, history, breaker)
}

#[tokio::test]
async fn success_in_closed_resets_failure_count() {
    let (cache, _history, breaker) = setup(3, 60, 2);
    cache.force_breaker(PROVIDER_ID, BreakerState::Closed, 2, None);

    let result = breaker.call(|| async { ok_result() }).await.unwrap();
    assert!(result.was_successful);
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Closed);
    assert_eq!(cache.failure_count(PROVIDER_ID).await, 0);
}

#[tokio::test]
async fn failures_below_threshold_stay_closed() {
    let (cache, history, breaker) = setup(3, 60, 2);

    for expected in 1..=2 {
        breaker.call(|| async { failed_result() }).await.unwrap();
        assert_eq!(cache.failure_count(PROVIDER_ID).await, expected);
        assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Closed);
    }
    assert!(history.breaker_logs.lock().unwrap().is_empty());
}

#[tokio::test]
async fn circuit_opens_on_the_nth_failure_exactly() {
    let (cache, history, breaker) = setup(3, 3600, 2);

    breaker.call(|| async { failed_result() }).await.unwrap();
    breaker.call(|| async { failed_result() }).await.unwrap();
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Closed);

    breaker.call(|| async { failed_result() }).await.unwrap();
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Open);
    // An open breaker always carries a last-failure stamp
    assert!(cache.last_failure_at(PROVIDER_ID).await.is_some());

    let logs = history.breaker_logs.lock().unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].new_state, BreakerState::Open);
    assert_eq!(logs[0].reason, "3_consecutive_failures");
    assert_eq!(logs[0].failure_count, 3);
}

#[tokio::test]
async fn open_circuit_rejects_without_invoking_the_call() {
    let (cache, _history, breaker) = setup(3, 3600, 2);
    cache.force_breaker(PROVIDER_ID, BreakerState::Open, 3, Some(Utc::now()));

    let mut invoked = false;
    let outcome = breaker
        .call(|| {
            invoked = true;
            async { ok_result() }
        })
        .await;

    let err = outcome.unwrap_err();
    assert!(!invoked, "call must not be made while the circuit is open");
    assert_eq!(err.provider_name, "TestProvider");
    assert_eq!(err.failure_count, 3);
    assert!(err.last_failure_at.is_some());
}

#[tokio::test]
async fn elapsed_cooldown_probes_half_open_then_closes() {
    let (cache, _history, breaker) = setup(3, 3600, 2);
    let stale_failure = Utc::now() - Duration::hours(2);
    cache.force_breaker(PROVIDER_ID, BreakerState::Open, 3, Some(stale_failure));

    // First probe: admitted, one success is below the success threshold
    breaker.call(|| async { ok_result() }).await.unwrap();
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::HalfOpen);

    // Second success closes the circuit and clears the failure count
    breaker.call(|| async { ok_result() }).await.unwrap();
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Closed);
    assert_eq!(cache.failure_count(PROVIDER_ID).await, 0);
}

#[tokio::test]
async fn half_open_failure_reopens_regardless_of_successes() {
    let (cache, history, breaker) = setup(3, 3600, 3);
    cache.force_breaker(PROVIDER_ID, BreakerState::HalfOpen, 0, None);

    breaker.call(|| async { ok_result() }).await.unwrap();
    breaker.call(|| async { ok_result() }).await.unwrap();
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::HalfOpen);

    breaker.call(|| async { failed_result() }).await.unwrap();
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Open);

    let logs = history.breaker_logs.lock().unwrap();
    assert_eq!(
        logs.last().map(|log| log.reason.clone()),
        Some("failure_during_recovery".to_string())
    );
}

#[tokio::test]
async fn missing_last_failure_stamp_counts_as_elapsed() {
    let (cache, _history, breaker) = setup(3, 3600, 2);
    // Open with no stamp (expired or never set): fail open on unknown time
    cache.force_breaker(PROVIDER_ID, BreakerState::Open, 3, None);

    let outcome = breaker.call(|| async { ok_result() }).await;
    assert!(outcome.is_ok(), "probe must be admitted when the stamp is missing");
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::HalfOpen);
}

#[tokio::test]
async fn cooldown_not_elapsed_keeps_rejecting() {
    let (cache, _history, breaker) = setup(3, 3600, 2);
    cache.force_breaker(PROVIDER_ID, BreakerState::Open, 5, Some(Utc::now()));

    for _ in 0..3 {
        assert!(breaker.call(|| async { ok_result() }).await.is_err());
    }
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Open);
}

#[tokio::test]
async fn force_reset_closes_and_force_open_opens() {
    let (cache, _history, breaker) = setup(3, 3600, 2);
    cache.force_breaker(PROVIDER_ID, BreakerState::Open, 5, Some(Utc::now()));

    breaker.force_reset().await;
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Closed);
    assert_eq!(cache.failure_count(PROVIDER_ID).await, 0);

    breaker.force_open("maintenance").await;
    assert_eq!(cache.breaker_state(PROVIDER_ID).await, BreakerState::Open);
}

#[tokio::test]
async fn status_reports_shared_state() {
    let (cache, _history, breaker) = setup(5, 3600, 2);
    cache.force_breaker(PROVIDER_ID, BreakerState::Open, 4, Some(Utc::now()));

    let status = breaker.status().await;
    assert_eq!(status.provider_name, "TestProvider");
    assert_eq!(status.state, "OPEN");
    assert_eq!(status.failure_count, 4);
    assert_eq!(status.failure_threshold, 5);
    assert_eq!(status.success_threshold, 2);
}
