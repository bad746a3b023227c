use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "api_providers")]
pub struct Model {
    #[sea_orm(primary_key)]
    pub id: i32,
    #[sea_orm(unique)]
    pub name: String,
    pub base_url: String,
    pub is_primary: bool,
    pub is_active: bool,
    pub priority_order: i32,
    pub created_at: DateTime,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::exchange_rates::Entity")]
    ExchangeRates,
    #[sea_orm(has_many = "super::api_call_logs::Entity")]
    ApiCallLogs,
    #[sea_orm(has_many = "super::circuit_breaker_logs::Entity")]
    CircuitBreakerLogs,
}

impl Related<super::exchange_rates::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ExchangeRates.def()
    }
}

impl Related<super::api_call_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ApiCallLogs.def()
    }
}

impl Related<super::circuit_breaker_logs::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::CircuitBreakerLogs.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}
