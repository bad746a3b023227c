use std::collections::{HashMap, HashSet};
use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{
    ActiveValue, ConnectionTrait, DatabaseConnection, PaginatorTrait, QueryOrder, QuerySelect,
    TransactionTrait,
};
use tracing::{debug, error, info};

use crate::models::_entities::{
    api_call_logs, api_providers, circuit_breaker_logs, currency_pairs, exchange_rates,
    supported_currencies,
};
use crate::providers::ProviderCallResult;
use crate::services::cache::{BreakerState, ServiceHealth};

/// The most recent successful rate on record for a pair, used as the stale
/// fallback when every provider is down.
#[derive(Debug, Clone)]
pub struct StaleRate {
    pub rate: Decimal,
    pub fetched_at: DateTime<Utc>,
    pub provider_name: String,
}

/// One provider call to append to the durable call log.
#[derive(Debug, Clone)]
pub struct CallLogEntry {
    pub provider_id: i32,
    pub result: ProviderCallResult,
}

/// Freshness of the supported-currency catalog.
#[derive(Debug, Clone)]
pub struct CatalogStatus {
    pub count: u64,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Durable store surface: historical rates for stale fallback, call and
/// breaker audit logs, and the supported-currency catalog.
///
/// Logging appends swallow their own errors; observability must never fail
/// the request path. Catalog reads return `Err` so the validator can
/// distinguish "empty" from "unreachable" and fail open on the latter.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    async fn latest_successful_rate(&self, base: &str, target: &str) -> Option<StaleRate>;

    async fn log_call_results(&self, entries: Vec<CallLogEntry>);

    async fn log_breaker_transition(
        &self,
        provider_id: i32,
        previous_state: Option<BreakerState>,
        new_state: BreakerState,
        failure_count: u32,
        reason: &str,
    );

    async fn provider_ids(&self) -> HashMap<String, i32>;

    async fn supported_codes(&self) -> Result<HashSet<String>, DbErr>;

    async fn catalog_status(&self) -> Result<CatalogStatus, DbErr>;

    async fn store_supported_codes(&self, codes: &HashSet<String>) -> Result<u64, DbErr>;

    async fn ping(&self) -> ServiceHealth;
}

/// Postgres-backed implementation of [`HistoryStore`].
pub struct DbHistoryStore {
    db: DatabaseConnection,
}

impl DbHistoryStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    async fn pair_id(&self, base: &str, target: &str) -> Result<Option<i32>, DbErr> {
        let pair = currency_pairs::Entity::find()
            .filter(currency_pairs::Column::BaseCurrency.eq(base))
            .filter(currency_pairs::Column::TargetCurrency.eq(target))
            .one(&self.db)
            .await?;
        Ok(pair.map(|p| p.id))
    }

    async fn get_or_create_pair<C: ConnectionTrait>(
        conn: &C,
        base: &str,
        target: &str,
    ) -> Result<i32, DbErr> {
        if let Some(pair) = currency_pairs::Entity::find()
            .filter(currency_pairs::Column::BaseCurrency.eq(base))
            .filter(currency_pairs::Column::TargetCurrency.eq(target))
            .one(conn)
            .await?
        {
            return Ok(pair.id);
        }

        let inserted = currency_pairs::ActiveModel {
            base_currency: ActiveValue::Set(base.to_string()),
            target_currency: ActiveValue::Set(target.to_string()),
            is_active: ActiveValue::Set(true),
            created_at: ActiveValue::Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(conn)
        .await?;
        Ok(inserted.id)
    }
}

#[async_trait]
impl HistoryStore for DbHistoryStore {
    async fn latest_successful_rate(&self, base: &str, target: &str) -> Option<StaleRate> {
        let pair_id = match self.pair_id(base, target).await {
            Ok(Some(id)) => id,
            Ok(None) => return None,
            Err(err) => {
                error!(base, target, error = %err, "stale cache pair lookup failed");
                return None;
            }
        };

        let row = exchange_rates::Entity::find()
            .filter(exchange_rates::Column::CurrencyPairId.eq(pair_id))
            .filter(exchange_rates::Column::IsSuccessful.eq(true))
            .order_by_desc(exchange_rates::Column::FetchedAt)
            .one(&self.db)
            .await;
        let row = match row {
            Ok(Some(row)) => row,
            Ok(None) => return None,
            Err(err) => {
                error!(base, target, error = %err, "stale cache query failed");
                return None;
            }
        };

        let provider_name = match api_providers::Entity::find_by_id(row.provider_id)
            .one(&self.db)
            .await
        {
            Ok(Some(provider)) => provider.name,
            Ok(None) => "unknown".to_string(),
            Err(err) => {
                error!(provider_id = row.provider_id, error = %err, "provider lookup failed");
                "unknown".to_string()
            }
        };

        Some(StaleRate {
            rate: row.rate,
            fetched_at: Utc.from_utc_datetime(&row.fetched_at),
            provider_name,
        })
    }

    async fn log_call_results(&self, entries: Vec<CallLogEntry>) {
        if entries.is_empty() {
            return;
        }

        let outcome = self
            .db
            .transaction::<_, (), DbErr>(|txn| {
                Box::pin(async move {
                    for entry in entries {
                        let result = &entry.result;
                        api_call_logs::ActiveModel {
                            provider_id: ActiveValue::Set(entry.provider_id),
                            endpoint: ActiveValue::Set(result.endpoint.clone()),
                            http_status_code: ActiveValue::Set(
                                result.http_status_code.map(i32::from),
                            ),
                            response_time_ms: ActiveValue::Set(Some(result.response_time_ms as i32)),
                            error_message: ActiveValue::Set(result.error_message.clone()),
                            called_at: ActiveValue::Set(Utc::now().naive_utc()),
                            was_successful: ActiveValue::Set(result.was_successful),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;

                        if !result.was_successful {
                            continue;
                        }
                        let Some(record) = result.rate_record().filter(|r| r.is_successful) else {
                            continue;
                        };

                        let pair_id = Self::get_or_create_pair(
                            txn,
                            &record.base_currency,
                            &record.target_currency,
                        )
                        .await?;
                        exchange_rates::ActiveModel {
                            currency_pair_id: ActiveValue::Set(pair_id),
                            provider_id: ActiveValue::Set(entry.provider_id),
                            rate: ActiveValue::Set(record.rate),
                            fetched_at: ActiveValue::Set(record.timestamp.naive_utc()),
                            is_successful: ActiveValue::Set(true),
                            confidence_level: ActiveValue::Set("high".to_string()),
                            ..Default::default()
                        }
                        .insert(txn)
                        .await?;
                    }
                    Ok(())
                })
            })
            .await;

        if let Err(err) = outcome {
            error!(error = %err, "failed to log call results to database");
        }
    }

    async fn log_breaker_transition(
        &self,
        provider_id: i32,
        previous_state: Option<BreakerState>,
        new_state: BreakerState,
        failure_count: u32,
        reason: &str,
    ) {
        let row = circuit_breaker_logs::ActiveModel {
            provider_id: ActiveValue::Set(provider_id),
            previous_state: ActiveValue::Set(previous_state.map(|s| s.as_str().to_string())),
            new_state: ActiveValue::Set(new_state.as_str().to_string()),
            failure_count: ActiveValue::Set(failure_count as i32),
            state_changed_at: ActiveValue::Set(Utc::now().naive_utc()),
            reason: ActiveValue::Set(Some(reason.to_string())),
            ..Default::default()
        };
        if let Err(err) = row.insert(&self.db).await {
            error!(provider_id, error = %err, "failed to log breaker transition");
        }
    }

    async fn provider_ids(&self) -> HashMap<String, i32> {
        match api_providers::Entity::find().all(&self.db).await {
            Ok(providers) => providers.into_iter().map(|p| (p.name, p.id)).collect(),
            Err(err) => {
                error!(error = %err, "failed to load provider ids");
                HashMap::new()
            }
        }
    }

    async fn supported_codes(&self) -> Result<HashSet<String>, DbErr> {
        let codes: Vec<String> = supported_currencies::Entity::find()
            .select_only()
            .column(supported_currencies::Column::Code)
            .into_tuple()
            .all(&self.db)
            .await?;
        Ok(codes.into_iter().collect())
    }

    async fn catalog_status(&self) -> Result<CatalogStatus, DbErr> {
        let count = supported_currencies::Entity::find().count(&self.db).await?;
        let last_updated = supported_currencies::Entity::find()
            .order_by_desc(supported_currencies::Column::LastUpdated)
            .one(&self.db)
            .await?
            .map(|row| Utc.from_utc_datetime(&row.last_updated));
        Ok(CatalogStatus { count, last_updated })
    }

    async fn store_supported_codes(&self, codes: &HashSet<String>) -> Result<u64, DbErr> {
        let existing = self.supported_codes().await?;
        let now = Utc::now().naive_utc();
        let mut inserted = 0;
        for code in codes {
            if existing.contains(code) {
                continue;
            }
            supported_currencies::ActiveModel {
                code: ActiveValue::Set(code.clone()),
                name: ActiveValue::Set(None),
                is_popular: ActiveValue::Set(false),
                provider_count: ActiveValue::Set(1),
                last_updated: ActiveValue::Set(now),
                created_at: ActiveValue::Set(now),
                ..Default::default()
            }
            .insert(&self.db)
            .await?;
            inserted += 1;
        }
        debug!(inserted, total = codes.len(), "stored supported currencies");
        Ok(inserted)
    }

    async fn ping(&self) -> ServiceHealth {
        let started = Instant::now();
        match self.db.ping().await {
            Ok(()) => ServiceHealth::healthy(started.elapsed().as_secs_f64() * 1000.0),
            Err(err) => ServiceHealth::unhealthy(err.to_string()),
        }
    }
}

/// Seed the provider catalog so breaker logs and call logs always have a
/// provider row to reference. Idempotent.
pub async fn seed_providers(db: &DatabaseConnection) -> Result<(), DbErr> {
    let catalog = [
        ("FixerIO", "http://data.fixer.io/api", true, 1),
        ("OpenExchange", "https://openexchangerates.org/api", false, 2),
        ("CurrencyAPI", "https://api.currencyapi.com/v3", false, 3),
    ];

    for (name, base_url, is_primary, priority_order) in catalog {
        let exists = api_providers::Entity::find()
            .filter(api_providers::Column::Name.eq(name))
            .one(db)
            .await?
            .is_some();
        if exists {
            continue;
        }
        api_providers::ActiveModel {
            name: ActiveValue::Set(name.to_string()),
            base_url: ActiveValue::Set(base_url.to_string()),
            is_primary: ActiveValue::Set(is_primary),
            is_active: ActiveValue::Set(true),
            priority_order: ActiveValue::Set(priority_order),
            created_at: ActiveValue::Set(Utc::now().naive_utc()),
            ..Default::default()
        }
        .insert(db)
        .await?;
        info!(provider = name, "seeded provider row");
    }
    Ok(())
}
