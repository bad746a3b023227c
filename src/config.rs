use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_csv(key: &str, default: &str) -> Vec<String> {
    env_or(key, default)
        .split(',')
        .map(|c| c.trim().to_uppercase())
        .filter(|c| !c.is_empty())
        .collect()
}

/// Circuit breaker tuning, shared by every provider breaker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    pub failure_threshold: u32,
    pub recovery_timeout_secs: u64,
    pub success_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            recovery_timeout_secs: 3600,
            success_threshold: 2,
        }
    }
}

impl BreakerSettings {
    pub fn recovery_timeout(&self) -> Duration {
        Duration::from_secs(self.recovery_timeout_secs)
    }
}

/// TTLs for every Redis namespace the service writes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheTtlSettings {
    pub rate_secs: u64,
    pub validation_positive_secs: u64,
    pub validation_negative_secs: u64,
    pub breaker_secs: u64,
    pub top_currencies_secs: u64,
}

impl Default for CacheTtlSettings {
    fn default() -> Self {
        Self {
            rate_secs: 300,
            validation_positive_secs: 900,
            validation_negative_secs: 300,
            breaker_secs: 3600,
            top_currencies_secs: 86400,
        }
    }
}

/// Credentials and per-provider request deadlines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    pub fixerio_api_key: String,
    pub fixerio_timeout_secs: u64,
    pub openexchange_app_id: String,
    pub openexchange_timeout_secs: u64,
    pub currencyapi_api_key: String,
    pub currencyapi_timeout_secs: u64,
}

/// Pair set and cadence for the background rate ingestor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerSettings {
    pub base_currencies: Vec<String>,
    pub target_currencies: Vec<String>,
    pub update_interval_secs: u64,
}

impl WorkerSettings {
    /// Pairs tracked per cycle, excluding self-pairs.
    pub fn total_pairs(&self) -> usize {
        self.base_currencies
            .iter()
            .map(|base| {
                self.target_currencies
                    .iter()
                    .filter(|target| *target != base)
                    .count()
            })
            .sum()
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.base_currencies.is_empty() {
            return Err("WORKER_BASE_CURRENCIES cannot be empty".to_string());
        }
        if self.target_currencies.is_empty() {
            return Err("WORKER_TARGET_CURRENCIES cannot be empty".to_string());
        }
        if self.update_interval_secs < 1 {
            return Err("WORKER_UPDATE_INTERVAL must be at least 1 second".to_string());
        }
        for code in self.base_currencies.iter().chain(self.target_currencies.iter()) {
            if !crate::models::is_currency_code(code) {
                return Err(format!("Invalid currency code: {code}"));
            }
        }
        Ok(())
    }
}

/// Complete application settings, loaded from the environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub redis_url: String,
    pub primary_provider: String,
    pub deviation_threshold: Decimal,
    pub breaker: BreakerSettings,
    pub cache_ttl: CacheTtlSettings,
    pub providers: ProviderSettings,
    pub worker: WorkerSettings,
}

impl Settings {
    /// Load all settings from environment variables, applying defaults
    /// where a variable is unset or unparseable.
    pub fn from_env() -> Self {
        Self {
            redis_url: env_or("REDIS_URL", "redis://localhost:6379"),
            primary_provider: env_or("PRIMARY_PROVIDER", "FixerIO"),
            deviation_threshold: env_parse("DEVIATION_THRESHOLD", Decimal::ONE),
            breaker: BreakerSettings {
                failure_threshold: env_parse("CB_FAILURE_THRESHOLD", 5),
                recovery_timeout_secs: env_parse("CB_RECOVERY_TIMEOUT", 3600),
                success_threshold: env_parse("CB_SUCCESS_THRESHOLD", 2),
            },
            cache_ttl: CacheTtlSettings {
                rate_secs: env_parse("CACHE_TTL_RATE", 300),
                validation_positive_secs: env_parse("CACHE_TTL_VALIDATION_POS", 900),
                validation_negative_secs: env_parse("CACHE_TTL_VALIDATION_NEG", 300),
                breaker_secs: env_parse("CACHE_TTL_BREAKER", 3600),
                top_currencies_secs: env_parse("CACHE_TTL_TOP_CURRENCIES", 86400),
            },
            providers: ProviderSettings {
                fixerio_api_key: env_or("FIXERIO_API_KEY", "demo_key"),
                fixerio_timeout_secs: env_parse("FIXERIO_TIMEOUT", 3),
                openexchange_app_id: env_or("OPENEXCHANGE_APP_ID", "demo_app_id"),
                openexchange_timeout_secs: env_parse("OPENEXCHANGE_TIMEOUT", 3),
                currencyapi_api_key: env_or("CURRENCYAPI_API_KEY", "demo_key"),
                currencyapi_timeout_secs: env_parse("CURRENCYAPI_TIMEOUT", 3),
            },
            worker: WorkerSettings {
                base_currencies: env_csv("WORKER_BASE_CURRENCIES", "USD,EUR"),
                target_currencies: env_csv("WORKER_TARGET_CURRENCIES", "NGN,GBP"),
                update_interval_secs: env_parse("WORKER_UPDATE_INTERVAL", 120),
            },
        }
    }
}
