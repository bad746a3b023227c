pub use sea_orm_migration::prelude::*;

mod m20240101_000001_create_api_providers;
mod m20240101_000002_create_currency_pairs;
mod m20240101_000003_create_exchange_rates;
mod m20240101_000004_create_api_call_logs;
mod m20240101_000005_create_circuit_breaker_logs;
mod m20240101_000006_create_supported_currencies;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_api_providers::Migration),
            Box::new(m20240101_000002_create_currency_pairs::Migration),
            Box::new(m20240101_000003_create_exchange_rates::Migration),
            Box::new(m20240101_000004_create_api_call_logs::Migration),
            Box::new(m20240101_000005_create_circuit_breaker_logs::Migration),
            Box::new(m20240101_000006_create_supported_currencies::Migration),
        ]
    }
}
