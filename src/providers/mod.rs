pub mod base;
pub mod currency_api;
pub mod fixer;
pub mod open_exchange;

pub use base::{ParsedPayload, ProviderCallResult, RateProvider, RateRecord};
pub use currency_api::CurrencyApiProvider;
pub use fixer::FixerIoProvider;
pub use open_exchange::OpenExchangeProvider;
