use std::collections::HashMap;
use std::sync::Arc;

use chrono::{Duration, Utc};
use rust_decimal::Decimal;

use currency_exchange_backend::config::{BreakerSettings, CacheTtlSettings};
use currency_exchange_backend::providers::RateProvider;
use currency_exchange_backend::services::cache::{BreakerState, ConfidenceLevel, RateCache};
use currency_exchange_backend::services::circuit_breaker::CircuitBreaker;
use currency_exchange_backend::services::currency_validator::CurrencyValidator;
use currency_exchange_backend::services::history::HistoryStore;
use currency_exchange_backend::services::rate_aggregator::{AggregatorError, RateAggregator};

use crate::fixtures::{MemoryCache, MemoryHistory, ScriptedProvider};

fn dec(raw: &str) -> Decimal {
    raw.parse().unwrap()
}

fn build_aggregator(
    providers: &[Arc<ScriptedProvider>],
    cache: &Arc<MemoryCache>,
    history: &Arc<MemoryHistory>,
    deviation_threshold: &str,
) -> RateAggregator {
    let dyn_providers: Vec<Arc<dyn RateProvider>> = providers
        .iter()
        .map(|p| Arc::clone(p) as Arc<dyn RateProvider>)
        .collect();

    let mut breakers = HashMap::new();
    let mut provider_ids = HashMap::new();
    for (index, provider) in providers.iter().enumerate() {
        let id = index as i32 + 1;
        provider_ids.insert(provider.name().to_string(), id);
        breakers.insert(
            provider.name().to_string(),
            Arc::new(CircuitBreaker::new(
                id,
                provider.name(),
                Arc::clone(cache) as Arc<dyn RateCache>,
                Arc::clone(history) as Arc<dyn HistoryStore>,
                BreakerSettings::default(),
            )),
        );
    }

    let validator = Arc::new(CurrencyValidator::new(
        Arc::clone(cache) as Arc<dyn RateCache>,
        Arc::clone(history) as Arc<dyn HistoryStore>,
        CacheTtlSettings::default(),
    ));

    RateAggregator::new(
        dyn_providers,
        breakers,
        provider_ids,
        Arc::clone(cache) as Arc<dyn RateCache>,
        Arc::clone(history) as Arc<dyn HistoryStore>,
        validator,
        "FixerIO".to_string(),
        dec(deviation_threshold),
    )
}

fn supported_history() -> Arc<MemoryHistory> {
    Arc::new(MemoryHistory::with_supported(&["USD", "EUR", "GBP", "NGN"]))
}

#[tokio::test]
async fn primary_only_success_yields_high_confidence() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::succeeding("FixerIO", "0.85")),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "1.00")),
        Arc::new(ScriptedProvider::succeeding("CurrencyAPI", "1.00")),
    ];
    // Both secondary breakers are open and still in cooldown
    cache.force_breaker(2, BreakerState::Open, 5, Some(Utc::now()));
    cache.force_breaker(3, BreakerState::Open, 5, Some(Utc::now()));

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let result = aggregator.get_rate("USD", "EUR").await.unwrap();

    assert_eq!(result.rate, dec("0.85"));
    assert_eq!(result.confidence_level, ConfidenceLevel::High);
    assert_eq!(result.sources_used, vec!["FixerIO".to_string()]);
    assert!(result.is_primary_used);
    assert!(!result.cached);
    assert!(result.warnings.is_empty());

    // Secondaries were never invoked
    assert_eq!(providers[1].call_count(), 0);
    assert_eq!(providers[2].call_count(), 0);

    // The fresh cache now holds exactly what was returned
    let cached = cache.cached_rate("USD", "EUR").unwrap();
    assert_eq!(cached, result.to_update());
}

#[tokio::test]
async fn agreeing_secondaries_average_with_the_primary() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::succeeding("FixerIO", "1.20")),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "1.22")),
        Arc::new(ScriptedProvider::succeeding("CurrencyAPI", "1.18")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let result = aggregator.get_rate("USD", "EUR").await.unwrap();

    assert_eq!(result.rate, dec("1.20"));
    assert_eq!(result.confidence_level, ConfidenceLevel::High);
    assert_eq!(result.sources_used.len(), 3);
    assert!(result.is_primary_used);
    assert!(result.warnings.is_empty());
}

#[tokio::test]
async fn high_deviation_falls_back_to_primary_with_warning() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::succeeding("FixerIO", "1.20")),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "3.60")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let result = aggregator.get_rate("USD", "EUR").await.unwrap();

    assert_eq!(result.rate, dec("1.20"));
    assert_eq!(result.confidence_level, ConfidenceLevel::High);
    assert_eq!(result.sources_used, vec!["FixerIO".to_string()]);
    assert!(result.is_primary_used);
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("High deviation")));
}

#[tokio::test]
async fn secondaries_average_when_primary_is_down() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::failing("FixerIO", "Timeout after 3s")),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "1.20")),
        Arc::new(ScriptedProvider::succeeding("CurrencyAPI", "1.30")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let result = aggregator.get_rate("USD", "EUR").await.unwrap();

    assert_eq!(result.rate, dec("1.25"));
    assert_eq!(result.confidence_level, ConfidenceLevel::Medium);
    assert!(!result.is_primary_used);
    assert_eq!(result.sources_used.len(), 2);
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("Primary provider FixerIO unavailable")));
}

#[tokio::test]
async fn stale_cache_serves_when_all_providers_fail() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    history.put_stale_rate(
        "USD",
        "EUR",
        "1.15",
        Utc::now() - Duration::hours(2),
        "FixerIO",
    );
    let providers = [
        Arc::new(ScriptedProvider::failing("FixerIO", "Timeout after 3s")),
        Arc::new(ScriptedProvider::failing("OpenExchange", "HTTP 500: upstream error")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let result = aggregator.get_rate("USD", "EUR").await.unwrap();

    assert_eq!(result.rate, dec("1.15"));
    assert_eq!(result.confidence_level, ConfidenceLevel::Low);
    assert!(result.cached);
    assert!(!result.is_primary_used);
    assert_eq!(result.sources_used, vec!["FixerIO".to_string()]);
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("All API providers unavailable")));
    assert!(result
        .warnings
        .iter()
        .any(|warning| warning.contains("Using stale cache data")));
}

#[tokio::test]
async fn no_rate_available_when_nothing_is_left() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::failing("FixerIO", "Timeout after 3s")),
        Arc::new(ScriptedProvider::failing("OpenExchange", "Timeout after 3s")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let err = aggregator.get_rate("USD", "EUR").await.unwrap_err();
    assert!(matches!(err, AggregatorError::NoRateAvailable { .. }));
}

#[tokio::test]
async fn invalid_pair_fails_before_any_provider_call() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::succeeding("FixerIO", "0.85")),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "0.86")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let err = aggregator.get_rate("USD", "XXX").await.unwrap_err();

    match err {
        AggregatorError::InvalidCurrency(reason) => assert!(reason.contains("XXX")),
        other => panic!("expected InvalidCurrency, got {other:?}"),
    }
    assert_eq!(providers[0].call_count(), 0);
    assert_eq!(providers[1].call_count(), 0);
    assert!(cache.rates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn fresh_cache_hit_skips_the_providers() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::succeeding("FixerIO", "0.85")),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "0.86")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let first = aggregator.get_rate("USD", "EUR").await.unwrap();
    assert!(!first.cached);

    let second = aggregator.get_rate("USD", "EUR").await.unwrap();
    assert!(second.cached);
    assert_eq!(second.rate, first.rate);
    assert_eq!(second.confidence_level, first.confidence_level);
    // One call each from the first request only
    assert_eq!(providers[0].call_count(), 1);
    assert_eq!(providers[1].call_count(), 1);
}

#[tokio::test]
async fn call_results_are_logged_with_provider_ids() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::failing("FixerIO", "Timeout after 3s")),
        Arc::new(ScriptedProvider::succeeding("OpenExchange", "1.20")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    aggregator.get_rate("USD", "EUR").await.unwrap();

    let logs = history.call_logs.lock().unwrap();
    assert_eq!(logs.len(), 2);
    let by_provider: HashMap<&str, i32> = logs
        .iter()
        .map(|entry| (entry.result.provider_name.as_str(), entry.provider_id))
        .collect();
    assert_eq!(by_provider["FixerIO"], 1);
    assert_eq!(by_provider["OpenExchange"], 2);
}

#[tokio::test]
async fn batch_fusion_reuses_the_single_pair_policy() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [
        Arc::new(ScriptedProvider::with_table(
            "FixerIO",
            &[("EUR", "0.90"), ("GBP", "0.80")],
        )),
        Arc::new(ScriptedProvider::with_table("OpenExchange", &[("EUR", "0.92")])),
        Arc::new(ScriptedProvider::failing("CurrencyAPI", "Timeout after 3s")),
    ];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let rates = aggregator.get_all_rates_for_base("USD").await.unwrap();

    assert_eq!(rates.len(), 2);

    // EUR: primary and one agreeing secondary, averaged
    let eur = &rates["EUR"];
    assert_eq!(eur.rate, dec("0.91"));
    assert_eq!(eur.confidence_level, ConfidenceLevel::High);
    assert_eq!(eur.sources_used.len(), 2);

    // GBP: primary only
    let gbp = &rates["GBP"];
    assert_eq!(gbp.rate, dec("0.80"));
    assert_eq!(gbp.sources_used, vec!["FixerIO".to_string()]);

    // Batch writes land in the fresh cache
    assert!(cache.cached_rate("USD", "EUR").is_some());
    assert!(cache.cached_rate("USD", "GBP").is_some());
}

#[tokio::test]
async fn batch_excludes_the_base_itself() {
    let cache = Arc::new(MemoryCache::new());
    let history = supported_history();
    let providers = [Arc::new(ScriptedProvider::with_table(
        "FixerIO",
        &[("USD", "1.00"), ("EUR", "0.90")],
    ))];

    let aggregator = build_aggregator(&providers, &cache, &history, "1.0");
    let rates = aggregator.get_all_rates_for_base("USD").await.unwrap();

    assert!(rates.contains_key("EUR"));
    assert!(!rates.contains_key("USD"));
}
