use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        manager
            .create_table(
                Table::create()
                    .table(ApiProviders::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(ApiProviders::Id)
                            .integer()
                            .not_null()
                            .auto_increment()
                            .primary_key(),
                    )
                    .col(
                        ColumnDef::new(ApiProviders::Name)
                            .string_len(50)
                            .not_null()
                            .unique_key(),
                    )
                    .col(ColumnDef::new(ApiProviders::BaseUrl).string_len(100).not_null())
                    .col(
                        ColumnDef::new(ApiProviders::IsPrimary)
                            .boolean()
                            .not_null()
                            .default(false),
                    )
                    .col(
                        ColumnDef::new(ApiProviders::IsActive)
                            .boolean()
                            .not_null()
                            .default(true),
                    )
                    .col(ColumnDef::new(ApiProviders::PriorityOrder).integer().not_null())
                    .col(
                        ColumnDef::new(ApiProviders::CreatedAt)
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
            .drop_table(Table::drop().table(ApiProviders::Table).to_owned())
            .await
    }
}

#[derive(DeriveIden)]
pub enum ApiProviders {
    Table,
    Id,
    Name,
    BaseUrl,
    IsPrimary,
    IsActive,
    PriorityOrder,
    CreatedAt,
}
