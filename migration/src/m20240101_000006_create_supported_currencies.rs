use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(SupportedCurrencies::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(SupportedCurrencies::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(SupportedCurrencies::Code)
                            .string_len(10)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(SupportedCurrencies::Name).string_len(100))
                    .col(
                        ColumnDef::new(SupportedCurrencies::IsPopular)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(SupportedCurrencies::ProviderCount)
                            .integer()
                            .not_null()
                            .default(1),
                    )
                    .col(
                        ColumnDef::new(SupportedCurrencies::LastUpdated)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .col(
                        ColumnDef::new(SupportedCurrencies::CreatedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(SupportedCurrencies::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum SupportedCurrencies {
    Table,
    Id,
    Code,
    Name,
    IsPopular,
    ProviderCount,
    LastUpdated,
    CreatedAt,
}
