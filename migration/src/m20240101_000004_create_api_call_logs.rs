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
                    .table(ApiCallLogs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApiCallLogs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(ColumnDef::new(ApiCallLogs::ProviderId).integer().not_null())
                    .col(ColumnDef::new(ApiCallLogs::Endpoint).string_len(255).not_null())
                    .col(ColumnDef::new(ApiCallLogs::HttpStatusCode).integer())
                    .col(ColumnDef::new(ApiCallLogs::ResponseTimeMs).integer())
                    .col(ColumnDef::new(ApiCallLogs::ErrorMessage).text())
                    .col(
                        ColumnDef::new(ApiCallLogs::CalledAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(ColumnDef::new(ApiCallLogs::WasSuccessful).boolean().not_null())
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_api_call_logs_provider_id")
                            .from(ApiCallLogs::Table, ApiCallLogs::ProviderId)
                            .to(ApiProviders::Table, ApiProviders::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_call_logs_provider_id")
                    .table(ApiCallLogs::Table)
                    .col(ApiCallLogs::ProviderId)
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("idx_api_call_logs_called_at")
                    .table(ApiCallLogs::Table)
                    .col(ApiCallLogs::CalledAt)
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(ApiCallLogs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ApiCallLogs {
    Table,
    Id,
    ProviderId,
    Endpoint,
    HttpStatusCode,
    ResponseTimeMs,
    ErrorMessage,
    CalledAt,
    WasSuccessful,
}
