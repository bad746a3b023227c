use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use tracing::{debug, error, info, warn};

use crate::config::CacheTtlSettings;
use crate::providers::RateProvider;
use crate::services::cache::{RateCache, ValidationEntry};
use crate::services::history::HistoryStore;

/// Currencies kept in the hot validation set.
pub const POPULAR_CURRENCIES: [&str; 10] = [
    "USD", "EUR", "GBP", "JPY", "CAD", "AUD", "CHF", "CNY", "NGN", "ZAR",
];

/// Catalog refresh cadence.
const REFRESH_INTERVAL_DAYS: i64 = 7;

/// Verdict of a pre-flight pair check.
#[derive(Debug, Clone)]
pub struct CurrencyValidation {
    pub is_valid: bool,
    pub reason: Option<String>,
}

impl CurrencyValidation {
    fn valid() -> Self {
        Self {
            is_valid: true,
            reason: None,
        }
    }

    fn invalid(reason: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            reason: Some(reason.into()),
        }
    }
}

/// Cheap pre-flight check that a pair is serviceable before the aggregator
/// spends provider I/O.
///
/// Lookup order: validation cache, hot currency set, full catalog in the
/// durable store. Any infrastructure failure fails open so the providers can
/// still be tried.
pub struct CurrencyValidator {
    cache: Arc<dyn RateCache>,
    history: Arc<dyn HistoryStore>,
    ttl: CacheTtlSettings,
}

impl CurrencyValidator {
    pub fn new(cache: Arc<dyn RateCache>, history: Arc<dyn HistoryStore>, ttl: CacheTtlSettings) -> Self {
        Self { cache, history, ttl }
    }

    pub async fn validate(&self, base: &str, target: &str) -> CurrencyValidation {
        // Tier 1: cached verdict
        if let Some(entry) = self.cache.get_validation(base, target).await {
            debug!(base, target, valid = entry.valid, "validation cache hit");
            if entry.valid {
                return CurrencyValidation::valid();
            }
            return CurrencyValidation::invalid(
                entry
                    .error_message
                    .unwrap_or_else(|| "Invalid currencies".to_string()),
            );
        }

        // Tier 2: hot set covers the popular pairs without a DB round-trip
        let top_currencies = self.cache.get_top_currencies().await;
        if !top_currencies.is_empty()
            && top_currencies.iter().any(|c| c == base)
            && top_currencies.iter().any(|c| c == target)
        {
            self.cache_result(base, target, true, None).await;
            return CurrencyValidation::valid();
        }

        // Tier 3: full catalog
        let supported = match self.history.supported_codes().await {
            Ok(supported) => supported,
            Err(err) => {
                // Fail open so the aggregator can still try providers
                error!(base, target, error = %err, "currency validation lookup failed");
                return CurrencyValidation::valid();
            }
        };

        let mut unsupported = Vec::new();
        if !supported.contains(base) {
            unsupported.push(base);
        }
        if !supported.contains(target) {
            unsupported.push(target);
        }

        if unsupported.is_empty() {
            self.cache_result(base, target, true, None).await;
            return CurrencyValidation::valid();
        }

        let reason = format!("Unsupported currency(ies): {}", unsupported.join(", "));
        warn!(base, target, reason = %reason, "currency validation failed");
        self.cache_result(base, target, false, Some(reason.clone())).await;
        CurrencyValidation::invalid(reason)
    }

    /// Negative verdicts cache for the shorter TTL so corrections propagate
    /// quickly; negatives without a concrete reason are not cached at all.
    async fn cache_result(&self, base: &str, target: &str, valid: bool, error_message: Option<String>) {
        if !valid && error_message.is_none() {
            return;
        }
        let ttl_secs = if valid {
            self.ttl.validation_positive_secs
        } else {
            self.ttl.validation_negative_secs
        };
        let entry = ValidationEntry {
            valid,
            error_message,
            cached_at: Utc::now(),
        };
        self.cache.set_validation(base, target, &entry, ttl_secs).await;
    }

    /// Refresh the supported-currency catalog from the providers when it is
    /// empty or stale. Returns whether a population ran.
    pub async fn populate_if_needed(&self, providers: &[Arc<dyn RateProvider>]) -> bool {
        let (should_populate, reason) = self.should_populate().await;
        if !should_populate {
            debug!(reason = %reason, "skipping currency population");
            return false;
        }

        info!(reason = %reason, "populating supported currencies");
        self.populate(providers).await;
        true
    }

    async fn should_populate(&self) -> (bool, String) {
        let status = match self.history.catalog_status().await {
            Ok(status) => status,
            Err(err) => {
                return (true, format!("Catalog check failed: {err}"));
            }
        };

        if status.count == 0 {
            return (true, "No currencies found in database".to_string());
        }
        let Some(last_updated) = status.last_updated else {
            return (true, "No last_updated timestamp found".to_string());
        };

        let age = Utc::now().signed_duration_since(last_updated);
        if age > Duration::days(REFRESH_INTERVAL_DAYS) {
            return (
                true,
                format!(
                    "Catalog is {} days old (threshold: {REFRESH_INTERVAL_DAYS} days)",
                    age.num_days()
                ),
            );
        }

        (
            false,
            format!(
                "Catalog has {} currencies, {} days old",
                status.count,
                age.num_days()
            ),
        )
    }

    /// Union every provider's catalog; providers that fail contribute
    /// nothing.
    pub async fn populate(&self, providers: &[Arc<dyn RateProvider>]) -> Vec<String> {
        let mut all_codes: HashSet<String> = HashSet::new();

        for provider in providers {
            let result = provider.get_supported_currencies().await;
            match result.currencies().filter(|_| result.was_successful) {
                Some(codes) => {
                    info!(
                        provider = provider.name(),
                        count = codes.len(),
                        "fetched supported currencies"
                    );
                    all_codes.extend(codes.iter().cloned());
                }
                None => {
                    error!(
                        provider = provider.name(),
                        error = result.error_message.as_deref().unwrap_or("no currencies returned"),
                        "supported currency fetch failed"
                    );
                }
            }
        }

        if let Err(err) = self.history.store_supported_codes(&all_codes).await {
            error!(error = %err, "failed to store supported currencies");
        }
        let popular: Vec<String> = POPULAR_CURRENCIES.iter().map(|c| c.to_string()).collect();
        self.cache.set_top_currencies(&popular).await;

        let mut codes: Vec<String> = all_codes.into_iter().collect();
        codes.sort();
        codes
    }
}
