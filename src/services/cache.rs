use std::time::Instant;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::{BoxStream, StreamExt};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info};

use crate::config::CacheTtlSettings;

const RATES_CHANNEL: &str = "rates:broadcast";
const TOP_CURRENCIES_KEY: &str = "supported_currencies:top";

pub type CacheResult<T> = std::result::Result<T, CacheError>;

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Confidence attached to a fused rate: `high` when the primary contributed,
/// `medium` when only secondaries did, `low` for stale fallbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl std::fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        };
        f.write_str(label)
    }
}

/// The payload stored under `rates:BASE:TARGET` and published on
/// `rates:broadcast`. The same shape serves both so a cache hit and a
/// broadcast frame round-trip identically.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateUpdate {
    pub pair: String,
    pub base_currency: String,
    pub target_currency: String,
    pub rate: Decimal,
    pub confidence_level: ConfidenceLevel,
    pub sources_used: Vec<String>,
    pub is_primary_used: bool,
    pub timestamp: DateTime<Utc>,
    pub cached: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// Cached currency validation verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationEntry {
    pub valid: bool,
    pub error_message: Option<String>,
    pub cached_at: DateTime<Utc>,
}

/// Circuit breaker state as shared through the cache. Reads fail open to
/// `Closed` so a cache outage never blocks provider traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

impl BreakerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Closed => "CLOSED",
            Self::Open => "OPEN",
            Self::HalfOpen => "HALF_OPEN",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "CLOSED" => Some(Self::Closed),
            "OPEN" => Some(Self::Open),
            "HALF_OPEN" => Some(Self::HalfOpen),
            _ => None,
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Health probe outcome for an infrastructure dependency.
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ServiceHealth {
    pub fn healthy(response_time_ms: f64) -> Self {
        Self {
            status: "healthy".to_string(),
            response_time_ms: Some(response_time_ms),
            error: None,
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: "unhealthy".to_string(),
            response_time_ms: None,
            error: Some(error.into()),
        }
    }

    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

/// Fast KV + pub/sub surface consumed by the aggregator, the breakers, the
/// validator, the ingestor and the broadcast hub.
///
/// Every read degrades to a miss (or `Closed`, for breaker state) on
/// infrastructure failure; writes report success as a bool and never
/// propagate errors to callers.
#[async_trait]
pub trait RateCache: Send + Sync {
    async fn get_latest_rate(&self, base: &str, target: &str) -> Option<RateUpdate>;
    async fn set_latest_rate(&self, update: &RateUpdate) -> bool;

    async fn get_validation(&self, base: &str, target: &str) -> Option<ValidationEntry>;
    async fn set_validation(&self, base: &str, target: &str, entry: &ValidationEntry, ttl_secs: u64) -> bool;

    async fn get_top_currencies(&self) -> Vec<String>;
    async fn set_top_currencies(&self, codes: &[String]) -> bool;

    async fn breaker_state(&self, provider_id: i32) -> BreakerState;
    /// Applied as one pipelined round-trip; when the new state is `Open` the
    /// last-failure stamp lands in the same pipeline so observers never see
    /// an open breaker without one.
    async fn set_breaker_state(&self, provider_id: i32, state: BreakerState, failure_count: u32) -> bool;
    async fn failure_count(&self, provider_id: i32) -> u32;
    /// Atomic INCR + EXPIRE; returns the post-increment count, 0 on error.
    async fn increment_failure_count(&self, provider_id: i32) -> u32;
    async fn reset_failure_count(&self, provider_id: i32) -> bool;
    async fn last_failure_at(&self, provider_id: i32) -> Option<DateTime<Utc>>;

    /// Fire-and-forget publish; the subscriber count is informational.
    async fn publish_rate_update(&self, update: &RateUpdate) -> u32;
    /// Lazy, infinite stream of parsed broadcast messages. Unparseable
    /// messages are dropped; the stream ends cleanly on channel tear-down;
    /// dropping the stream releases the subscription.
    async fn subscribe_to_rates(&self) -> CacheResult<BoxStream<'static, RateUpdate>>;

    async fn ping(&self) -> ServiceHealth;
}

/// Redis-backed implementation of [`RateCache`].
pub struct RedisCache {
    client: redis::Client,
    conn: ConnectionManager,
    ttl: CacheTtlSettings,
}

impl RedisCache {
    pub async fn connect(redis_url: &str, ttl: CacheTtlSettings) -> CacheResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let conn = ConnectionManager::new(client.clone()).await?;
        info!(redis_url, "connected to Redis");
        Ok(Self { client, conn, ttl })
    }

    fn rate_key(base: &str, target: &str) -> String {
        format!("rates:{base}:{target}")
    }

    fn validation_key(base: &str, target: &str) -> String {
        format!("currency_validation:{base}_{target}")
    }

    fn breaker_key(provider_id: i32, suffix: &str) -> String {
        format!("breaker:{provider_id}:{suffix}")
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = conn.get(key).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> CacheResult<()> {
        let mut conn = self.conn.clone();
        let raw = serde_json::to_string(value)?;
        conn.set_ex::<_, _, ()>(key, raw, ttl_secs).await?;
        Ok(())
    }
}

#[async_trait]
impl RateCache for RedisCache {
    async fn get_latest_rate(&self, base: &str, target: &str) -> Option<RateUpdate> {
        let key = Self::rate_key(base, target);
        match self.get_json::<RateUpdate>(&key).await {
            Ok(hit) => {
                debug!(cache_key = %key, hit = hit.is_some(), "rate cache lookup");
                hit
            }
            Err(err) => {
                error!(cache_key = %key, error = %err, "rate cache lookup failed");
                None
            }
        }
    }

    async fn set_latest_rate(&self, update: &RateUpdate) -> bool {
        let key = Self::rate_key(&update.base_currency, &update.target_currency);
        match self.set_json(&key, update, self.ttl.rate_secs).await {
            Ok(()) => true,
            Err(err) => {
                error!(cache_key = %key, error = %err, "failed to write rate cache entry");
                false
            }
        }
    }

    async fn get_validation(&self, base: &str, target: &str) -> Option<ValidationEntry> {
        let key = Self::validation_key(base, target);
        match self.get_json::<ValidationEntry>(&key).await {
            Ok(hit) => hit,
            Err(err) => {
                error!(cache_key = %key, error = %err, "validation cache lookup failed");
                None
            }
        }
    }

    async fn set_validation(&self, base: &str, target: &str, entry: &ValidationEntry, ttl_secs: u64) -> bool {
        let key = Self::validation_key(base, target);
        match self.set_json(&key, entry, ttl_secs).await {
            Ok(()) => true,
            Err(err) => {
                error!(cache_key = %key, error = %err, "failed to cache validation result");
                false
            }
        }
    }

    async fn get_top_currencies(&self) -> Vec<String> {
        match self.get_json::<Vec<String>>(TOP_CURRENCIES_KEY).await {
            Ok(codes) => codes.unwrap_or_default(),
            Err(err) => {
                error!(error = %err, "failed to read top currencies");
                Vec::new()
            }
        }
    }

    async fn set_top_currencies(&self, codes: &[String]) -> bool {
        match self
            .set_json(TOP_CURRENCIES_KEY, &codes, self.ttl.top_currencies_secs)
            .await
        {
            Ok(()) => true,
            Err(err) => {
                error!(error = %err, "failed to cache top currencies");
                false
            }
        }
    }

    async fn breaker_state(&self, provider_id: i32) -> BreakerState {
        let key = Self::breaker_key(provider_id, "state");
        let mut conn = self.conn.clone();
        let raw: Result<Option<String>, _> = conn.get(&key).await;
        match raw {
            Ok(Some(raw)) => BreakerState::parse(&raw).unwrap_or(BreakerState::Closed),
            Ok(None) => BreakerState::Closed,
            Err(err) => {
                error!(provider_id, error = %err, "failed to read breaker state");
                BreakerState::Closed
            }
        }
    }

    async fn set_breaker_state(&self, provider_id: i32, state: BreakerState, failure_count: u32) -> bool {
        let ttl = self.ttl.breaker_secs;
        let mut pipe = redis::pipe();
        pipe.atomic()
            .set_ex(Self::breaker_key(provider_id, "state"), state.as_str(), ttl)
            .ignore()
            .set_ex(Self::breaker_key(provider_id, "failures"), failure_count, ttl)
            .ignore();
        if state == BreakerState::Open {
            pipe.set_ex(
                Self::breaker_key(provider_id, "last_failure"),
                Utc::now().to_rfc3339(),
                ttl,
            )
            .ignore();
        }

        let mut conn = self.conn.clone();
        match pipe.query_async::<_, ()>(&mut conn).await {
            Ok(()) => {
                info!(provider_id, state = %state, failure_count, "breaker state stored");
                true
            }
            Err(err) => {
                error!(provider_id, error = %err, "failed to store breaker state");
                false
            }
        }
    }

    async fn failure_count(&self, provider_id: i32) -> u32 {
        let key = Self::breaker_key(provider_id, "failures");
        let mut conn = self.conn.clone();
        let raw: Result<Option<u32>, _> = conn.get(&key).await;
        match raw {
            Ok(count) => count.unwrap_or(0),
            Err(err) => {
                error!(provider_id, error = %err, "failed to read failure count");
                0
            }
        }
    }

    async fn increment_failure_count(&self, provider_id: i32) -> u32 {
        let key = Self::breaker_key(provider_id, "failures");
        let mut conn = self.conn.clone();
        let outcome: Result<(u32,), _> = redis::pipe()
            .atomic()
            .incr(&key, 1u32)
            .expire(&key, self.ttl.breaker_secs as i64)
            .ignore()
            .query_async(&mut conn)
            .await;
        match outcome {
            Ok((count,)) => {
                debug!(provider_id, count, "failure count incremented");
                count
            }
            Err(err) => {
                error!(provider_id, error = %err, "failed to increment failure count");
                0
            }
        }
    }

    async fn reset_failure_count(&self, provider_id: i32) -> bool {
        let key = Self::breaker_key(provider_id, "failures");
        let mut conn = self.conn.clone();
        match conn.del::<_, ()>(&key).await {
            Ok(()) => true,
            Err(err) => {
                error!(provider_id, error = %err, "failed to reset failure count");
                false
            }
        }
    }

    async fn last_failure_at(&self, provider_id: i32) -> Option<DateTime<Utc>> {
        let key = Self::breaker_key(provider_id, "last_failure");
        let mut conn = self.conn.clone();
        let raw: Result<Option<String>, _> = conn.get(&key).await;
        match raw {
            Ok(raw) => raw
                .and_then(|stamp| DateTime::parse_from_rfc3339(&stamp).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            Err(err) => {
                error!(provider_id, error = %err, "failed to read last failure time");
                None
            }
        }
    }

    async fn publish_rate_update(&self, update: &RateUpdate) -> u32 {
        let payload = match serde_json::to_string(update) {
            Ok(payload) => payload,
            Err(err) => {
                error!(pair = %update.pair, error = %err, "failed to encode rate update");
                return 0;
            }
        };

        let mut conn = self.conn.clone();
        match conn.publish::<_, _, u32>(RATES_CHANNEL, payload).await {
            Ok(subscriber_count) => {
                debug!(pair = %update.pair, subscriber_count, "published rate update");
                subscriber_count
            }
            Err(err) => {
                error!(pair = %update.pair, error = %err, "failed to publish rate update");
                0
            }
        }
    }

    async fn subscribe_to_rates(&self) -> CacheResult<BoxStream<'static, RateUpdate>> {
        let mut pubsub = self.client.get_async_connection().await?.into_pubsub();
        pubsub.subscribe(RATES_CHANNEL).await?;
        info!(channel = RATES_CHANNEL, "subscribed to rate broadcasts");

        // The pub/sub connection lives inside the stream and closes when the
        // stream is dropped.
        let stream = pubsub
            .into_on_message()
            .filter_map(|msg| async move {
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(err) => {
                        error!(error = %err, "failed to read pubsub payload");
                        return None;
                    }
                };
                match serde_json::from_str::<RateUpdate>(&payload) {
                    Ok(update) => Some(update),
                    Err(err) => {
                        error!(error = %err, "dropping unparseable rate broadcast");
                        None
                    }
                }
            })
            .boxed();
        Ok(stream)
    }

    async fn ping(&self) -> ServiceHealth {
        let started = Instant::now();
        let mut conn = self.conn.clone();
        match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
            Ok(_) => ServiceHealth::healthy(started.elapsed().as_secs_f64() * 1000.0),
            Err(err) => ServiceHealth::unhealthy(err.to_string()),
        }
    }
}
