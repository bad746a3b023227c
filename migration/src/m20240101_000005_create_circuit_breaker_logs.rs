use sea_orm_migration::prelude::*;

use crate::m20240101_000001_create_api_providers::ApiProviders;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CircuitBreakerLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CircuitBreakerLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(CircuitBreakerLogs::ProviderId).integer().not_null())
                    .col(ColumnDef::new(CircuitBreakerLogs::PreviousState).string_len(20))
                    .col(
                        ColumnDef::new(CircuitBreakerLogs::NewState)
                            .string_len(20)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CircuitBreakerLogs::FailureCount)
                            .integer()
                            .not_null()
                            .default(0),
                    )
                    .col(
                        ColumnDef::new(CircuitBreakerLogs::StateChangedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(ColumnDef::new(CircuitBreakerLogs::Reason).string_len(255))
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_circuit_breaker_logs_provider_id")
                            .from(CircuitBreakerLogs::Table, CircuitBreakerLogs::ProviderId)
                            .to(ApiProviders::Table, ApiProviders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_circuit_breaker_logs_provider_id")
                    .table(CircuitBreakerLogs::Table)
                    .col(CircuitBreakerLogs::ProviderId)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CircuitBreakerLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CircuitBreakerLogs {
    Table,
    Id,
    ProviderId,
    PreviousState,
    NewState,
    FailureCount,
    StateChangedAt,
    Reason,
}
