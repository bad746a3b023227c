use sea_orm_migration::prelude::*;

use crate::m20240101_000001_create_api_providers::ApiProviders;
use crate::m20240101_000002_create_currency_pairs::CurrencyPairs;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ExchangeRates::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ExchangeRates::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ExchangeRates::CurrencyPairId).integer().not_null())
                    .col(ColumnDef::new(ExchangeRates::ProviderId).integer().not_null())
                    .col(
                        ColumnDef::new(ExchangeRates::Rate)
                            .decimal_len(15, 8)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::FetchedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::IsSuccessful)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(ExchangeRates::ConfidenceLevel)
                            .string_len(20)
                            .not_null()
                            .default("high"),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_exchange_rates_currency_pair_id")
                            .from(ExchangeRates::Table, ExchangeRates::CurrencyPairId)
                            .to(CurrencyPairs::Table, CurrencyPairs::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_exchange_rates_provider_id")
                            .from(ExchangeRates::Table, ExchangeRates::ProviderId)
                            .to(ApiProviders::Table, ApiProviders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // Stale-cache reads scan by pair, newest first
        manager
            .create_index(
                Index::create()
                    .name("idx_exchange_rates_pair_fetched_at")
                    .table(ExchangeRates::Table)
                    .col(ExchangeRates::CurrencyPairId)
                    .col((ExchangeRates::FetchedAt, IndexOrder::Desc))
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_exchange_rates_provider_id")
                    .table(ExchangeRates::Table)
                    .col(ExchangeRates::ProviderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ExchangeRates::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ExchangeRates {
    Table,
    Id,
    CurrencyPairId,
    ProviderId,
    Rate,
    FetchedAt,
    IsSuccessful,
    ConfidenceLevel,
}
