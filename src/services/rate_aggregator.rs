use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use futures::stream::{FuturesUnordered, StreamExt};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{error, info, warn};

use crate::providers::{ProviderCallResult, RateProvider, RateRecord};
use crate::services::cache::{ConfidenceLevel, RateCache, RateUpdate};
use crate::services::circuit_breaker::{BreakerStatus, CircuitBreaker};
use crate::services::currency_validator::CurrencyValidator;
use crate::services::history::{CallLogEntry, HistoryStore};

/// User-facing failures of the aggregation pipeline. Provider failures,
/// open breakers and infrastructure hiccups are all absorbed before this
/// boundary.
#[derive(Debug, thiserror::Error)]
pub enum AggregatorError {
    #[error("Currency validation failed: {0}")]
    InvalidCurrency(String),

    #[error("No exchange rate data available for {base}->{target}")]
    NoRateAvailable { base: String, target: String },
}

/// A fused rate with its provenance and confidence.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedRate {
    pub base_currency: String,
    pub target_currency: String,
    pub rate: Decimal,
    pub confidence_level: ConfidenceLevel,
    pub sources_used: Vec<String>,
    pub is_primary_used: bool,
    pub cached: bool,
    pub timestamp: DateTime<Utc>,
    pub response_time_ms: i64,
    pub warnings: Vec<String>,
}

impl AggregatedRate {
    pub fn to_update(&self) -> RateUpdate {
        RateUpdate {
            pair: format!("{}/{}", self.base_currency, self.target_currency),
            base_currency: self.base_currency.clone(),
            target_currency: self.target_currency.clone(),
            rate: self.rate,
            confidence_level: self.confidence_level,
            sources_used: self.sources_used.clone(),
            is_primary_used: self.is_primary_used,
            timestamp: self.timestamp,
            cached: self.cached,
            warnings: self.warnings.clone(),
        }
    }

    fn from_cached(update: RateUpdate, response_time_ms: i64) -> Self {
        Self {
            base_currency: update.base_currency,
            target_currency: update.target_currency,
            rate: update.rate,
            confidence_level: update.confidence_level,
            sources_used: update.sources_used,
            is_primary_used: update.is_primary_used,
            cached: true,
            timestamp: update.timestamp,
            response_time_ms,
            warnings: update.warnings,
        }
    }
}

/// Health of the aggregator itself: the breaker fleet.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatorHealth {
    pub status: String,
    pub providers: Vec<BreakerStatus>,
}

/// Outer bound on one whole fan-out. Individual provider deadlines fire
/// first in practice; this cancels stragglers and fuses what arrived.
const FAN_OUT_DEADLINE: std::time::Duration = std::time::Duration::from_secs(10);

/// Orchestrates the providers behind their breakers, fuses their answers
/// into one rate per pair, and keeps the caches and audit logs fed.
///
/// The aggregator itself is stateless; concurrent calls for the same pair
/// may duplicate provider traffic.
pub struct RateAggregator {
    providers: Vec<Arc<dyn RateProvider>>,
    breakers: HashMap<String, Arc<CircuitBreaker>>,
    provider_ids: HashMap<String, i32>,
    cache: Arc<dyn RateCache>,
    history: Arc<dyn HistoryStore>,
    validator: Arc<CurrencyValidator>,
    primary_provider: String,
    deviation_threshold: Decimal,
}

impl RateAggregator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        providers: Vec<Arc<dyn RateProvider>>,
        breakers: HashMap<String, Arc<CircuitBreaker>>,
        provider_ids: HashMap<String, i32>,
        cache: Arc<dyn RateCache>,
        history: Arc<dyn HistoryStore>,
        validator: Arc<CurrencyValidator>,
        primary_provider: String,
        deviation_threshold: Decimal,
    ) -> Self {
        Self {
            providers,
            breakers,
            provider_ids,
            cache,
            history,
            validator,
            primary_provider,
            deviation_threshold,
        }
    }

    /// Fetch one fused rate: validate, check the fresh cache, fan out to
    /// every provider through its breaker, fuse, then write back.
    pub async fn get_rate(&self, base: &str, target: &str) -> Result<AggregatedRate, AggregatorError> {
        let started = Instant::now();

        let validation = self.validator.validate(base, target).await;
        if !validation.is_valid {
            return Err(AggregatorError::InvalidCurrency(
                validation.reason.unwrap_or_else(|| "Invalid currencies".to_string()),
            ));
        }

        if let Some(hit) = self.cache.get_latest_rate(base, target).await {
            return Ok(AggregatedRate::from_cached(hit, elapsed_ms(started)));
        }

        let results = self.fan_out(base, target).await;
        let records = successful_records(&results);

        let aggregated = match self.fuse(base, target, &records, started) {
            Some(aggregated) => aggregated,
            None => self
                .stale_fallback(base, target, started)
                .await
                .ok_or_else(|| AggregatorError::NoRateAvailable {
                    base: base.to_string(),
                    target: target.to_string(),
                })?,
        };

        if !aggregated.cached {
            self.cache.set_latest_rate(&aggregated.to_update()).await;
        }
        self.log_results(results).await;

        Ok(aggregated)
    }

    /// Batch variant: every provider's all-rates endpoint is called once and
    /// the single-pair fusion policy is applied per target. A target that
    /// cannot be fused is skipped, never failing the batch.
    pub async fn get_all_rates_for_base(
        &self,
        base: &str,
    ) -> Result<HashMap<String, AggregatedRate>, AggregatorError> {
        let started = Instant::now();

        let validation = self.validator.validate(base, base).await;
        if !validation.is_valid {
            return Err(AggregatorError::InvalidCurrency(
                validation.reason.unwrap_or_else(|| "Invalid base currency".to_string()),
            ));
        }

        let calls: FuturesUnordered<_> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                async move {
                    self.call_through_breaker(&provider, || provider.get_all_rates(base))
                        .await
                }
            })
            .collect();
        let results = self.collect_until_deadline(calls).await;

        let mut by_target: HashMap<String, Vec<RateRecord>> = HashMap::new();
        for result in results.iter().filter(|r| r.was_successful) {
            let Some(records) = result.rate_records() else { continue };
            for record in records {
                if record.is_successful && record.rate > Decimal::ZERO && record.target_currency != base {
                    by_target
                        .entry(record.target_currency.clone())
                        .or_default()
                        .push(record.clone());
                }
            }
        }

        let mut aggregated_by_target = HashMap::new();
        for (target, records) in by_target {
            match self.fuse(base, &target, &records, started) {
                Some(aggregated) => {
                    aggregated_by_target.insert(target, aggregated);
                }
                None => {
                    warn!(base, target = %target, "no fusable records for target, skipping");
                }
            }
        }

        let updates: Vec<RateUpdate> = aggregated_by_target.values().map(|aggregated| aggregated.to_update()).collect();
        let writes = updates.iter().map(|update| self.cache.set_latest_rate(update));
        join_all(writes).await;

        self.log_results(results).await;

        Ok(aggregated_by_target)
    }

    async fn fan_out(&self, base: &str, target: &str) -> Vec<ProviderCallResult> {
        let calls: FuturesUnordered<_> = self
            .providers
            .iter()
            .map(|provider| {
                let provider = Arc::clone(provider);
                async move {
                    self.call_through_breaker(&provider, || provider.get_rate(base, target))
                        .await
                }
            })
            .collect();
        self.collect_until_deadline(calls).await
    }

    /// Drain the fan-out, abandoning stragglers once the outer deadline
    /// fires. Dropped futures cancel their in-flight HTTP calls; whatever
    /// completed in time feeds the fusion policy.
    async fn collect_until_deadline<F>(&self, mut calls: FuturesUnordered<F>) -> Vec<ProviderCallResult>
    where
        F: std::future::Future<Output = Option<ProviderCallResult>>,
    {
        let deadline = tokio::time::sleep(FAN_OUT_DEADLINE);
        tokio::pin!(deadline);

        let mut results = Vec::new();
        loop {
            tokio::select! {
                next = calls.next() => match next {
                    Some(Some(result)) => results.push(result),
                    Some(None) => {}
                    None => break,
                },
                _ = &mut deadline => {
                    warn!(
                        received = results.len(),
                        outstanding = calls.len(),
                        "fan-out deadline reached, cancelling outstanding provider calls"
                    );
                    break;
                }
            }
        }
        results
    }

    async fn call_through_breaker<F, Fut>(
        &self,
        provider: &Arc<dyn RateProvider>,
        f: F,
    ) -> Option<ProviderCallResult>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ProviderCallResult>,
    {
        let Some(breaker) = self.breakers.get(provider.name()) else {
            error!(provider = provider.name(), "no circuit breaker configured");
            return None;
        };
        match breaker.call(f).await {
            Ok(result) => Some(result),
            Err(open) => {
                warn!(
                    provider = %open.provider_name,
                    failure_count = open.failure_count,
                    "circuit breaker open, provider skipped"
                );
                None
            }
        }
    }

    /// Deterministic fusion policy.
    ///
    /// Primary available: its rate wins; agreeing secondaries are averaged
    /// in; a deviation at or above the threshold falls back to the primary
    /// alone with a warning. No primary: mean of the secondaries at medium
    /// confidence. Nothing at all: `None`, and the caller decides about the
    /// stale fallback.
    fn fuse(
        &self,
        base: &str,
        target: &str,
        records: &[RateRecord],
        started: Instant,
    ) -> Option<AggregatedRate> {
        let primary = records.iter().find(|r| r.provider_name == self.primary_provider);
        let secondaries: Vec<&RateRecord> = records
            .iter()
            .filter(|r| r.provider_name != self.primary_provider)
            .collect();

        if let Some(primary) = primary {
            let mut rate = primary.rate;
            let mut sources_used = vec![primary.provider_name.clone()];
            let mut warnings = Vec::new();

            if !secondaries.is_empty() {
                let all_rates: Vec<Decimal> = std::iter::once(primary.rate)
                    .chain(secondaries.iter().map(|r| r.rate))
                    .collect();
                let mean = mean_of(&all_rates);
                let max_deviation = all_rates
                    .iter()
                    .map(|r| (*r - mean).abs())
                    .max()
                    .unwrap_or(Decimal::ZERO);

                info!(
                    base,
                    target,
                    primary_rate = %primary.rate,
                    max_deviation = %max_deviation,
                    "comparing provider rates"
                );

                if max_deviation >= self.deviation_threshold {
                    warnings.push(format!(
                        "High deviation across providers (max {max_deviation}), using primary only"
                    ));
                } else {
                    rate = mean;
                    sources_used.extend(secondaries.iter().map(|r| r.provider_name.clone()));
                }
            }

            return Some(AggregatedRate {
                base_currency: base.to_string(),
                target_currency: target.to_string(),
                rate,
                confidence_level: ConfidenceLevel::High,
                sources_used,
                is_primary_used: true,
                cached: false,
                timestamp: primary.timestamp,
                response_time_ms: elapsed_ms(started),
                warnings,
            });
        }

        if !secondaries.is_empty() {
            warn!(
                base,
                target,
                primary = %self.primary_provider,
                "primary provider unavailable, averaging secondaries"
            );
            let rates: Vec<Decimal> = secondaries.iter().map(|r| r.rate).collect();
            return Some(AggregatedRate {
                base_currency: base.to_string(),
                target_currency: target.to_string(),
                rate: mean_of(&rates),
                confidence_level: ConfidenceLevel::Medium,
                sources_used: secondaries.iter().map(|r| r.provider_name.clone()).collect(),
                is_primary_used: false,
                cached: false,
                timestamp: Utc::now(),
                response_time_ms: elapsed_ms(started),
                warnings: vec![format!("Primary provider {} unavailable", self.primary_provider)],
            });
        }

        None
    }

    /// Most recent successful rate from the durable store, served at low
    /// confidence with the stale age surfaced in the warnings.
    async fn stale_fallback(&self, base: &str, target: &str, started: Instant) -> Option<AggregatedRate> {
        error!(base, target, "all providers failed, checking stale cache");
        let stale = self.history.latest_successful_rate(base, target).await?;
        if stale.rate <= Decimal::ZERO {
            return None;
        }

        let age_minutes = Utc::now().signed_duration_since(stale.fetched_at).num_minutes();
        Some(AggregatedRate {
            base_currency: base.to_string(),
            target_currency: target.to_string(),
            rate: stale.rate,
            confidence_level: ConfidenceLevel::Low,
            sources_used: vec![stale.provider_name],
            is_primary_used: false,
            cached: true,
            timestamp: stale.fetched_at,
            response_time_ms: elapsed_ms(started),
            warnings: vec![
                "All API providers unavailable".to_string(),
                format!("Using stale cache data (age: {age_minutes} minutes)"),
            ],
        })
    }

    async fn log_results(&self, results: Vec<ProviderCallResult>) {
        let entries: Vec<CallLogEntry> = results
            .into_iter()
            .map(|result| CallLogEntry {
                provider_id: self.provider_id_for(&result.provider_name),
                result,
            })
            .collect();
        self.history.log_call_results(entries).await;
    }

    fn provider_id_for(&self, provider_name: &str) -> i32 {
        self.provider_ids.get(provider_name).copied().unwrap_or(1)
    }

    pub async fn health(&self) -> AggregatorHealth {
        let statuses = join_all(self.breakers.values().map(|breaker| breaker.status())).await;
        let all_closed = statuses.iter().all(|s| s.state == "CLOSED");
        AggregatorHealth {
            status: if all_closed { "healthy" } else { "degraded" }.to_string(),
            providers: statuses,
        }
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    started.elapsed().as_millis() as i64
}

fn mean_of(rates: &[Decimal]) -> Decimal {
    let sum: Decimal = rates.iter().copied().sum();
    sum / Decimal::from(rates.len() as u64)
}

/// Keep only logically successful records with positive rates; a record with
/// rate ≤ 0 can never surface in an aggregated result.
fn successful_records(results: &[ProviderCallResult]) -> Vec<RateRecord> {
    results
        .iter()
        .filter(|r| r.was_successful)
        .filter_map(|r| r.rate_record())
        .filter(|record| record.is_successful && record.rate > Decimal::ZERO)
        .cloned()
        .collect()
}
