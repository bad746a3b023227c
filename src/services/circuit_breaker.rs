use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::BreakerSettings;
use crate::providers::ProviderCallResult;
use crate::services::cache::{BreakerState, RateCache};
use crate::services::history::HistoryStore;

/// Returned instead of calling the provider while the circuit is open and
/// the cooldown has not elapsed. Not a retry signal: the provider is
/// unavailable for this request.
#[derive(Debug, thiserror::Error)]
#[error("Circuit breaker OPEN for {provider_name} ({failure_count} failures)")]
pub struct CircuitBreakerOpen {
    pub provider_name: String,
    pub failure_count: u32,
    pub last_failure_at: Option<DateTime<Utc>>,
}

/// Snapshot of one breaker for health reporting.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerStatus {
    pub provider_name: String,
    pub state: String,
    pub failure_count: u32,
    pub failure_threshold: u32,
    pub consecutive_successes: u32,
    pub success_threshold: u32,
}

/// Per-provider circuit breaker.
///
/// CLOSED/OPEN/HALF_OPEN state, the failure count and the last-failure stamp
/// live in the shared cache so every process observes the same circuit. The
/// consecutive-success counter used during HALF_OPEN probes is in-process
/// only; correctness does not depend on it being synchronized across
/// replicas.
pub struct CircuitBreaker {
    provider_id: i32,
    provider_name: String,
    cache: Arc<dyn RateCache>,
    history: Arc<dyn HistoryStore>,
    settings: BreakerSettings,
    consecutive_successes: AtomicU32,
}

impl CircuitBreaker {
    pub fn new(
        provider_id: i32,
        provider_name: impl Into<String>,
        cache: Arc<dyn RateCache>,
        history: Arc<dyn HistoryStore>,
        settings: BreakerSettings,
    ) -> Self {
        Self {
            provider_id,
            provider_name: provider_name.into(),
            cache,
            history,
            settings,
            consecutive_successes: AtomicU32::new(0),
        }
    }

    pub fn provider_name(&self) -> &str {
        &self.provider_name
    }

    /// Run a provider call under breaker protection.
    ///
    /// Providers report failure through the call result rather than erroring,
    /// so the result's success flag drives the state machine.
    pub async fn call<F, Fut>(&self, f: F) -> Result<ProviderCallResult, CircuitBreakerOpen>
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = ProviderCallResult>,
    {
        let state = self.cache.breaker_state(self.provider_id).await;

        if state == BreakerState::Open {
            if self.cooldown_elapsed().await {
                self.transition_to(BreakerState::HalfOpen, "attempting_recovery", 0)
                    .await;
            } else {
                let failure_count = self.cache.failure_count(self.provider_id).await;
                let last_failure_at = self.cache.last_failure_at(self.provider_id).await;
                return Err(CircuitBreakerOpen {
                    provider_name: self.provider_name.clone(),
                    failure_count,
                    last_failure_at,
                });
            }
        }

        let result = f().await;
        if result.was_successful {
            self.on_success().await;
        } else {
            self.on_failure().await;
        }
        Ok(result)
    }

    async fn on_success(&self) {
        match self.cache.breaker_state(self.provider_id).await {
            BreakerState::HalfOpen => {
                let successes = self.consecutive_successes.fetch_add(1, Ordering::SeqCst) + 1;
                if successes >= self.settings.success_threshold {
                    self.transition_to(BreakerState::Closed, "recovery_successful", 0)
                        .await;
                    self.cache.reset_failure_count(self.provider_id).await;
                    info!(
                        provider = %self.provider_name,
                        successes,
                        "circuit breaker CLOSED after successful recovery"
                    );
                } else {
                    debug!(
                        provider = %self.provider_name,
                        successes,
                        success_threshold = self.settings.success_threshold,
                        "circuit breaker HALF_OPEN probe succeeded"
                    );
                }
            }
            BreakerState::Closed => {
                self.cache.reset_failure_count(self.provider_id).await;
            }
            BreakerState::Open => {}
        }
    }

    async fn on_failure(&self) {
        if self.cache.breaker_state(self.provider_id).await == BreakerState::HalfOpen {
            self.consecutive_successes.store(0, Ordering::SeqCst);
            let failure_count = self.cache.failure_count(self.provider_id).await;
            self.transition_to(BreakerState::Open, "failure_during_recovery", failure_count)
                .await;
            return;
        }

        let failure_count = self.cache.increment_failure_count(self.provider_id).await;
        if failure_count >= self.settings.failure_threshold {
            let reason = format!("{failure_count}_consecutive_failures");
            self.transition_to(BreakerState::Open, &reason, failure_count)
                .await;
        } else {
            warn!(
                provider = %self.provider_name,
                failure_count,
                failure_threshold = self.settings.failure_threshold,
                "provider call failed"
            );
        }
    }

    /// Missing last-failure stamp (expired or never set) counts as elapsed.
    async fn cooldown_elapsed(&self) -> bool {
        let Some(last_failure_at) = self.cache.last_failure_at(self.provider_id).await else {
            return true;
        };
        let since = Utc::now().signed_duration_since(last_failure_at);
        since
            .to_std()
            .map(|elapsed| elapsed >= self.settings.recovery_timeout())
            .unwrap_or(true)
    }

    async fn transition_to(&self, new_state: BreakerState, reason: &str, failure_count: u32) {
        let previous_state = self.cache.breaker_state(self.provider_id).await;
        self.cache
            .set_breaker_state(self.provider_id, new_state, failure_count)
            .await;
        // Audit only; a failed insert never blocks the transition.
        self.history
            .log_breaker_transition(
                self.provider_id,
                Some(previous_state),
                new_state,
                failure_count,
                reason,
            )
            .await;
        self.consecutive_successes.store(0, Ordering::SeqCst);

        info!(
            provider = %self.provider_name,
            previous_state = %previous_state,
            new_state = %new_state,
            reason,
            "circuit breaker transition"
        );
    }

    pub async fn status(&self) -> BreakerStatus {
        BreakerStatus {
            provider_name: self.provider_name.clone(),
            state: self.cache.breaker_state(self.provider_id).await.as_str().to_string(),
            failure_count: self.cache.failure_count(self.provider_id).await,
            failure_threshold: self.settings.failure_threshold,
            consecutive_successes: self.consecutive_successes.load(Ordering::SeqCst),
            success_threshold: self.settings.success_threshold,
        }
    }

    /// Manually close the circuit (admin/debugging).
    pub async fn force_reset(&self) {
        self.transition_to(BreakerState::Closed, "manual_reset", 0).await;
        self.cache.reset_failure_count(self.provider_id).await;
        warn!(provider = %self.provider_name, "circuit breaker manually reset");
    }

    /// Manually open the circuit (maintenance).
    pub async fn force_open(&self, reason: &str) {
        let failure_count = self.cache.failure_count(self.provider_id).await;
        self.transition_to(BreakerState::Open, reason, failure_count).await;
        warn!(provider = %self.provider_name, reason, "circuit breaker manually opened");
    }
}
