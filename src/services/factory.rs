use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use sea_orm::DatabaseConnection;
use serde::Serialize;
use tracing::info;

use crate::config::Settings;
use crate::providers::{CurrencyApiProvider, FixerIoProvider, OpenExchangeProvider, RateProvider};
use crate::services::broadcast::BroadcastHub;
use crate::services::cache::{CacheError, RateCache, RedisCache, ServiceHealth};
use crate::services::circuit_breaker::CircuitBreaker;
use crate::services::currency_validator::CurrencyValidator;
use crate::services::history::{DbHistoryStore, HistoryStore};
use crate::services::rate_aggregator::{AggregatorHealth, RateAggregator};

#[derive(Debug, thiserror::Error)]
pub enum FactoryError {
    #[error("Cache initialization failed: {0}")]
    Cache(#[from] CacheError),

    #[error("HTTP client initialization failed: {0}")]
    Http(#[from] reqwest::Error),
}

impl From<FactoryError> for loco_rs::Error {
    fn from(err: FactoryError) -> Self {
        loco_rs::Error::string(&err.to_string())
    }
}

/// Per-service health section of the health endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ServicesHealth {
    pub database: ServiceHealth,
    pub cache: ServiceHealth,
    pub rate_aggregator: AggregatorHealth,
}

/// Composed health report. The endpoint always answers 200; the status field
/// carries the verdict.
#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub status: String,
    pub services: ServicesHealth,
}

/// The fully wired service graph, constructed once at startup and handed to
/// the HTTP layer, the ingestor and the broadcast hub.
#[derive(Clone)]
pub struct SharedServices {
    pub settings: Arc<Settings>,
    pub cache: Arc<dyn RateCache>,
    pub history: Arc<dyn HistoryStore>,
    pub aggregator: Arc<RateAggregator>,
    pub hub: Arc<BroadcastHub>,
}

impl SharedServices {
    /// Construct the graph in dependency order: cache client, durable store,
    /// providers, breakers, validator, aggregator, hub.
    pub async fn build(db: DatabaseConnection, settings: Settings) -> Result<Self, FactoryError> {
        let cache: Arc<dyn RateCache> = Arc::new(
            RedisCache::connect(&settings.redis_url, settings.cache_ttl.clone()).await?,
        );
        let history: Arc<dyn HistoryStore> = Arc::new(DbHistoryStore::new(db));

        let provider_cfg = &settings.providers;
        let providers: Vec<Arc<dyn RateProvider>> = vec![
            Arc::new(FixerIoProvider::new(
                provider_cfg.fixerio_api_key.clone(),
                Duration::from_secs(provider_cfg.fixerio_timeout_secs),
            )?),
            Arc::new(OpenExchangeProvider::new(
                provider_cfg.openexchange_app_id.clone(),
                Duration::from_secs(provider_cfg.openexchange_timeout_secs),
            )?),
            Arc::new(CurrencyApiProvider::new(
                provider_cfg.currencyapi_api_key.clone(),
                Duration::from_secs(provider_cfg.currencyapi_timeout_secs),
            )?),
        ];

        Self::wire(cache, history, providers, settings).await
    }

    /// Wire a graph from pre-built infrastructure handles. Tests inject
    /// in-memory doubles through this path.
    pub async fn wire(
        cache: Arc<dyn RateCache>,
        history: Arc<dyn HistoryStore>,
        providers: Vec<Arc<dyn RateProvider>>,
        settings: Settings,
    ) -> Result<Self, FactoryError> {
        let stored_ids = history.provider_ids().await;
        let mut provider_ids = HashMap::new();
        for (index, provider) in providers.iter().enumerate() {
            // Priority position is the fallback id when the catalog row is
            // missing (fresh database, seeding skipped).
            let id = stored_ids
                .get(provider.name())
                .copied()
                .unwrap_or(index as i32 + 1);
            provider_ids.insert(provider.name().to_string(), id);
        }

        let mut breakers = HashMap::new();
        for provider in &providers {
            let provider_id = provider_ids[provider.name()];
            breakers.insert(
                provider.name().to_string(),
                Arc::new(CircuitBreaker::new(
                    provider_id,
                    provider.name(),
                    Arc::clone(&cache),
                    Arc::clone(&history),
                    settings.breaker.clone(),
                )),
            );
        }

        let validator = Arc::new(CurrencyValidator::new(
            Arc::clone(&cache),
            Arc::clone(&history),
            settings.cache_ttl.clone(),
        ));
        validator.populate_if_needed(&providers).await;

        let aggregator = Arc::new(RateAggregator::new(
            providers,
            breakers,
            provider_ids,
            Arc::clone(&cache),
            Arc::clone(&history),
            Arc::clone(&validator),
            settings.primary_provider.clone(),
            settings.deviation_threshold,
        ));

        info!(
            primary_provider = %settings.primary_provider,
            "service graph constructed"
        );

        Ok(Self {
            settings: Arc::new(settings),
            cache,
            history,
            aggregator,
            hub: Arc::new(BroadcastHub::new()),
        })
    }

    /// Compose the health report. The durable store and the aggregator are
    /// critical; the cache and individual breakers only degrade.
    pub async fn health_snapshot(&self) -> HealthSnapshot {
        let database = self.history.ping().await;
        let cache = self.cache.ping().await;
        let rate_aggregator = self.aggregator.health().await;

        let status = if !database.is_healthy() {
            "unhealthy"
        } else if !cache.is_healthy() || rate_aggregator.status != "healthy" {
            "degraded"
        } else {
            "healthy"
        };

        HealthSnapshot {
            status: status.to_string(),
            services: ServicesHealth {
                database,
                cache,
                rate_aggregator,
            },
        }
    }
}
