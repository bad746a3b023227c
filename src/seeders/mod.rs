use sea_orm::entity::prelude::*;
use sea_orm::{DatabaseConnection, EntityTrait, PaginatorTrait};

use crate::models::_entities::{
    api_call_logs, api_providers, circuit_breaker_logs, currency_pairs, exchange_rates,
    supported_currencies,
};
use crate::services::history::seed_providers;

pub struct DatabaseSeeder;

impl DatabaseSeeder {
    /// Seed development data: the provider catalog the breakers and call
    /// logs reference.
    pub async fn seed_development(db: &DatabaseConnection) -> Result<(), DbErr> {
        seed_providers(db).await
    }

    pub async fn is_seeded(db: &DatabaseConnection) -> Result<bool, DbErr> {
        let count = api_providers::Entity::find().count(db).await?;
        Ok(count > 0)
    }

    /// Clear all data, children before parents.
    pub async fn clear_all(db: &DatabaseConnection) -> Result<(), DbErr> {
        exchange_rates::Entity::delete_many().exec(db).await?;
        api_call_logs::Entity::delete_many().exec(db).await?;
        circuit_breaker_logs::Entity::delete_many().exec(db).await?;
        currency_pairs::Entity::delete_many().exec(db).await?;
        supported_currencies::Entity::delete_many().exec(db).await?;
        api_providers::Entity::delete_many().exec(db).await?;
        Ok(())
    }
}
