use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "exchange_rates")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    pub currency_pair_id: i32,
    pub provider_id: i32,
    #[sea_orm(column_type = "Decimal(Some((15, 8)))")]
    pub rate: Decimal,
    pub fetched_at: DateTime,
    pub is_successful: bool,
    pub confidence_level: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::currency_pairs::Entity",
        from = "Column::CurrencyPairId",
        to = "super::currency_pairs::Column::Id"
    )]
    CurrencyPair,
    #[sea_orm(
        belongs_to = "super::api_providers::Entity",
        from = "Column::ProviderId",
        to = "super::api_providers::Column::Id"
    )]
    Provider,
}

impl Related<super::currency_pairs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CurrencyPair.def()
    }
}

impl Related<super::api_providers::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Provider.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
