pub mod broadcast;
pub mod cache;
pub mod circuit_breaker;
pub mod currency_validator;
pub mod factory;
pub mod history;
pub mod rate_aggregator;
