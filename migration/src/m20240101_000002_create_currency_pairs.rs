use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(CurrencyPairs::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(CurrencyPairs::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(CurrencyPairs::BaseCurrency)
                            .string_len(5)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CurrencyPairs::TargetCurrency)
                            .string_len(5)
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(CurrencyPairs::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(
                        ColumnDef::new(CurrencyPairs::CreatedAt)
                            .timestamp()
                            .not_null()
                            .extra("DEFAULT CURRENT_TIMESTAMP".to_string()),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("uq_currency_pairs_base_target")
                    .table(CurrencyPairs::Table)
                    .col(CurrencyPairs::BaseCurrency)
                    .col(CurrencyPairs::TargetCurrency)
                    .unique()
                    .to_owned(),
            )
            .await
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .drop_table(Table::drop().table(CurrencyPairs::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum CurrencyPairs {
    Table,
    Id,
    BaseCurrency,
    TargetCurrency,
    IsActive,
    CreatedAt,
}
