use std::sync::atomic::Ordering;
use std::sync::Arc;

use chrono::{Duration, Utc};

use currency_exchange_backend::config::CacheTtlSettings;
use currency_exchange_backend::providers::RateProvider;
use currency_exchange_backend::services::cache::{RateCache, ValidationEntry};
use currency_exchange_backend::services::currency_validator::{CurrencyValidator, POPULAR_CURRENCIES};
use currency_exchange_backend::services::history::{CatalogStatus, HistoryStore};

use crate::fixtures::{MemoryCache, MemoryHistory, ScriptedProvider};

fn validator(cache: &Arc<MemoryCache>, history: &Arc<MemoryHistory>) -> CurrencyValidator {
    CurrencyValidator::new(
        Arc::clone(cache) as Arc<dyn RateCache>,
        Arc::clone(history) as Arc<dyn HistoryStore>,
        CacheTtlSettings::default(),
    )
}

#[tokio::test]
async fn cached_verdicts_return_immediately() {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::new());

    cache
        .set_validation(
            "USD",
            "EUR",
            &ValidationEntry {
                valid: true,
                error_message: None,
                cached_at: Utc::now(),
            },
            900,
        )
        .await;
    cache
        .set_validation(
            "USD",
            "XXX",
            &ValidationEntry {
                valid: false,
                error_message: Some("Unsupported currency(ies): XXX".to_string()),
                cached_at: Utc::now(),
            },
            300,
        )
        .await;

    let validator = validator(&cache, &history);

    let positive = validator.validate("USD", "EUR").await;
    assert!(positive.is_valid);

    let negative = validator.validate("USD", "XXX").await;
    assert!(!negative.is_valid);
    assert_eq!(
        negative.reason.as_deref(),
        Some("Unsupported currency(ies): XXX")
    );
}

#[tokio::test]
async fn hot_set_validates_popular_pairs_without_db() {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::new());
    let codes: Vec<String> = POPULAR_CURRENCIES.iter().map(|c| c.to_string()).collect();
    cache.set_top_currencies(&codes).await;

    let verdict = validator(&cache, &history).validate("USD", "EUR").await;
    assert!(verdict.is_valid);
    // The verdict was written through to the validation cache
    assert!(cache.get_validation("USD", "EUR").await.map(|e| e.valid).unwrap_or(false));
}

#[tokio::test]
async fn full_catalog_rejects_unsupported_codes_and_caches_negatively() {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::with_supported(&["USD", "EUR"]));

    let verdict = validator(&cache, &history).validate("USD", "XXX").await;
    assert!(!verdict.is_valid);
    assert_eq!(verdict.reason.as_deref(), Some("Unsupported currency(ies): XXX"));

    let entry = cache.get_validation("USD", "XXX").await.unwrap();
    assert!(!entry.valid);
    assert!(entry.error_message.is_some());
}

#[tokio::test]
async fn catalog_errors_fail_open() {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::new());
    history.fail_catalog.store(true, Ordering::SeqCst);

    let verdict = validator(&cache, &history).validate("USD", "EUR").await;
    assert!(verdict.is_valid, "lookup failures must not block the aggregator");
    // Nothing cached for a fail-open verdict
    assert!(cache.get_validation("USD", "EUR").await.is_none());
}

#[tokio::test]
async fn populates_catalog_from_providers_when_empty() {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::new());
    let providers: Vec<Arc<dyn RateProvider>> = vec![
        Arc::new(ScriptedProvider::succeeding("FixerIO", "1.0").with_currencies(&["USD", "EUR", "GBP"])),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "1.0").with_currencies(&["USD", "NGN"])),
        // A failing provider contributes nothing
        Arc::new(ScriptedProvider::failing("CurrencyAPI", "HTTP 500: upstream error")),
    ];

    let ran = validator(&cache, &history).populate_if_needed(&providers).await;
    assert!(ran);

    let supported = history.supported_codes().await.unwrap();
    assert_eq!(supported.len(), 4);
    assert!(supported.contains("NGN"));

    // The hot set was refreshed alongside
    let top = cache.get_top_currencies().await;
    assert_eq!(top.len(), POPULAR_CURRENCIES.len());
}

#[tokio::test]
async fn fresh_catalog_skips_population() {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::with_supported(&["USD", "EUR"]));
    let providers: Vec<Arc<dyn RateProvider>> = vec![Arc::new(
        ScriptedProvider::succeeding("FixerIO", "1.0").with_currencies(&["USD", "EUR"]),
    )];

    let ran = validator(&cache, &history).populate_if_needed(&providers).await;
    assert!(!ran);
}

#[tokio::test]
async fn stale_catalog_triggers_refresh() {
    let cache = Arc::new(MemoryCache::new());
    let history = Arc::new(MemoryHistory::with_supported(&["USD", "EUR"]));
    *history.catalog.lock().unwrap() = CatalogStatus {
        count: 2,
        last_updated: Some(Utc::now() - Duration::days(30)),
    };
    let providers: Vec<Arc<dyn RateProvider>> = vec![Arc::new(
        ScriptedProvider::succeeding("FixerIO", "1.0").with_currencies(&["USD", "EUR", "JPY"]),
    )];

    let ran = validator(&cache, &history).populate_if_needed(&providers).await;
    assert!(ran);
    assert!(history.supported_codes().await.unwrap().contains("JPY"));
}
