pub mod circuit_breaker_test;
pub mod config_test;
pub mod currency_validator_test;
pub mod rate_aggregator_test;
pub mod rate_ingestor_test;
