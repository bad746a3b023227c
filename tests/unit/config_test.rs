use serial_test::serial;

use currency_exchange_backend::config::{Settings, WorkerSettings};

fn clear_env() {
    for key in [
        "REDIS_URL",
        "PRIMARY_PROVIDER",
        "DEVIATION_THRESHOLD",
        "CB_FAILURE_THRESHOLD",
        "CB_RECOVERY_TIMEOUT",
        "CB_SUCCESS_THRESHOLD",
        "CACHE_TTL_RATE",
        "CACHE_TTL_VALIDATION_POS",
        "CACHE_TTL_VALIDATION_NEG",
        "CACHE_TTL_BREAKER",
        "CACHE_TTL_TOP_CURRENCIES",
        "WORKER_BASE_CURRENCIES",
        "WORKER_TARGET_CURRENCIES",
        "WORKER_UPDATE_INTERVAL",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
#[serial]
fn defaults_match_the_documented_values() {
    clear_env();
    let settings = Settings::from_env();

    assert_eq!(settings.primary_provider, "FixerIO");
    assert_eq!(settings.deviation_threshold, rust_decimal::Decimal::ONE);
    assert_eq!(settings.breaker.failure_threshold, 5);
    assert_eq!(settings.breaker.recovery_timeout_secs, 3600);
    assert_eq!(settings.breaker.success_threshold, 2);
    assert_eq!(settings.cache_ttl.rate_secs, 300);
    assert_eq!(settings.cache_ttl.validation_positive_secs, 900);
    assert_eq!(settings.cache_ttl.validation_negative_secs, 300);
    assert_eq!(settings.cache_ttl.breaker_secs, 3600);
    assert_eq!(settings.cache_ttl.top_currencies_secs, 86400);
}

#[test]
#[serial]
fn environment_overrides_are_applied() {
    clear_env();
    std::env::set_var("PRIMARY_PROVIDER", "OpenExchange");
    std::env::set_var("CB_FAILURE_THRESHOLD", "3");
    std::env::set_var("DEVIATION_THRESHOLD", "0.5");
    std::env::set_var("WORKER_BASE_CURRENCIES", "usd, eur");
    std::env::set_var("WORKER_TARGET_CURRENCIES", "ngn");
    std::env::set_var("WORKER_UPDATE_INTERVAL", "30");

    let settings = Settings::from_env();
    assert_eq!(settings.primary_provider, "OpenExchange");
    assert_eq!(settings.breaker.failure_threshold, 3);
    assert_eq!(settings.deviation_threshold, "0.5".parse::<rust_decimal::Decimal>().unwrap());
    // CSV values are trimmed and uppercased
    assert_eq!(settings.worker.base_currencies, vec!["USD", "EUR"]);
    assert_eq!(settings.worker.target_currencies, vec!["NGN"]);
    assert_eq!(settings.worker.update_interval_secs, 30);

    clear_env();
}

#[test]
#[serial]
fn unparseable_values_fall_back_to_defaults() {
    clear_env();
    std::env::set_var("CB_FAILURE_THRESHOLD", "not-a-number");

    let settings = Settings::from_env();
    assert_eq!(settings.breaker.failure_threshold, 5);

    clear_env();
}

#[test]
fn worker_settings_count_pairs_excluding_self() {
    let worker = WorkerSettings {
        base_currencies: vec!["USD".to_string(), "EUR".to_string()],
        target_currencies: vec!["USD".to_string(), "NGN".to_string()],
        update_interval_secs: 60,
    };
    // USD->USD is excluded
    assert_eq!(worker.total_pairs(), 3);
    assert!(worker.validate().is_ok());
}

#[test]
fn worker_settings_reject_bad_configuration() {
    let empty_bases = WorkerSettings {
        base_currencies: vec![],
        target_currencies: vec!["NGN".to_string()],
        update_interval_secs: 60,
    };
    assert!(empty_bases.validate().is_err());

    let bad_code = WorkerSettings {
        base_currencies: vec!["US".to_string()],
        target_currencies: vec!["NGN".to_string()],
        update_interval_secs: 60,
    };
    assert!(bad_code.validate().is_err());

    let zero_interval = WorkerSettings {
        base_currencies: vec!["USD".to_string()],
        target_currencies: vec!["NGN".to_string()],
        update_interval_secs: 0,
    };
    assert!(zero_interval.validate().is_err());
}
