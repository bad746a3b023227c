pub use super::api_call_logs::Entity as ApiCallLogs;
pub use super::api_providers::Entity as ApiProviders;
pub use super::circuit_breaker_logs::Entity as CircuitBreakerLogs;
pub use super::currency_pairs::Entity as CurrencyPairs;
pub use super::exchange_rates::Entity as ExchangeRates;
pub use super::supported_currencies::Entity as SupportedCurrencies;
