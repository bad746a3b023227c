pub mod prelude;

pub mod api_call_logs;
pub mod api_providers;
pub mod circuit_breaker_logs;
pub mod currency_pairs;
pub mod exchange_rates;
pub mod supported_currencies;
