//! Shared resilience context.
//!
//! One `ResilienceContext` exists per provider. It is built once from
//! configuration and handed (cheaply cloned) to every caller and poll
//! session, so a failure observed anywhere protects everyone.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use dashmap::DashMap;
use serde::Serialize;

use crate::config::ServiceConfig;
use crate::error::{ProviderError, ResilienceError, ResilienceResult};
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::circuit_breaker::{
    BreakerSettings, BreakerSnapshot, CallError, CircuitBreaker, CircuitState,
};
use crate::resilience::retries::{with_retry, BudgetSnapshot, RetryBudget, RetryPolicy};
use crate::resilience::timeouts::with_timeout;

/// Last known outcome of a resilient operation on an asset.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessingState {
    pub asset_id: String,
    pub operation: String,
    pub succeeded: bool,
    pub circuit_state: CircuitState,
    pub last_error: Option<String>,
    /// Unix seconds.
    pub updated_at: u64,
}

/// Aggregate view for health checks and the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct ResilienceSnapshot {
    pub healthy: bool,
    pub circuit_breaker: BreakerSnapshot,
    pub retry_budget: BudgetSnapshot,
    pub processing_states: Vec<ProcessingState>,
}

/// Processing states kept at most; the stalest entry is evicted first.
const MAX_PROCESSING_STATES: usize = 1024;

/// Breaker, retry budget and policies for one provider.
#[derive(Debug, Clone)]
pub struct ResilienceContext {
    breaker: Arc<CircuitBreaker>,
    budget: Arc<RetryBudget>,
    policy: RetryPolicy,
    attempt_timeout: Duration,
    states: Arc<DashMap<String, ProcessingState>>,
}

impl ResilienceContext {
    pub fn new(
        breaker: CircuitBreaker,
        budget: RetryBudget,
        policy: RetryPolicy,
        attempt_timeout: Duration,
    ) -> Self {
        Self {
            breaker: Arc::new(breaker),
            budget: Arc::new(budget),
            policy,
            attempt_timeout,
            states: Arc::new(DashMap::new()),
        }
    }

    /// Build a context from validated configuration.
    pub fn from_config(config: &ServiceConfig) -> Self {
        let cb = &config.circuit_breaker;
        let breaker = CircuitBreaker::new(BreakerSettings {
            failure_threshold: cb.failure_threshold,
            failure_window: Duration::from_secs(cb.failure_window_secs),
            cooldown: Duration::from_millis(cb.cooldown_ms),
            success_threshold: cb.success_threshold,
            half_open_max_calls: cb.half_open_max_calls,
        });

        let retries = &config.retries;
        let budget = RetryBudget::new(
            retries.budget_limit,
            Duration::from_secs(retries.budget_window_secs),
        );
        let policy = RetryPolicy {
            max_attempts: retries.max_attempts,
            backoff: BackoffPolicy::new(
                Duration::from_millis(retries.base_delay_ms),
                Duration::from_millis(retries.max_delay_ms),
                retries.jitter_factor,
            ),
        };

        Self::new(
            breaker,
            budget,
            policy,
            Duration::from_millis(config.provider.request_timeout_ms),
        )
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    pub fn budget(&self) -> &RetryBudget {
        &self.budget
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn attempt_timeout(&self) -> Duration {
        self.attempt_timeout
    }

    /// Run one guarded attempt: breaker plus per-attempt timeout, no retries.
    ///
    /// `attempt` is not polled at all when the breaker rejects the call.
    pub async fn attempt<T, Fut>(&self, attempt: Fut) -> Result<T, CallError>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let limit = self.attempt_timeout;
        self.breaker.call(|| with_timeout(limit, attempt)).await
    }

    /// Run `operation` with the full stack: retry/backoff around breaker
    /// around timeout. Records the outcome for `asset_id` when given.
    pub async fn execute<T, F, Fut>(
        &self,
        operation_name: &str,
        asset_id: Option<&str>,
        mut operation: F,
    ) -> ResilienceResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let started = Instant::now();
        let result = with_retry(operation_name, &self.policy, &self.budget, || {
            self.attempt(operation())
        })
        .await;

        self.finish(operation_name, asset_id, started, &result);
        result
    }

    /// Like [`execute`](Self::execute) but with a single attempt, for calls
    /// that are not safe to repeat (the provider may have acted on a
    /// request whose response was lost).
    pub async fn execute_once<T, Fut>(
        &self,
        operation_name: &str,
        asset_id: Option<&str>,
        operation: Fut,
    ) -> ResilienceResult<T>
    where
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let started = Instant::now();
        let result = match self.attempt(operation).await {
            Ok(value) => Ok(value),
            Err(CallError::Open) => Err(ResilienceError::CircuitOpen),
            Err(CallError::Failed(e)) if e.is_retryable() => Err(ResilienceError::Transient {
                attempts: 1,
                source: e,
            }),
            Err(CallError::Failed(e)) => Err(ResilienceError::Permanent(e)),
        };

        self.finish(operation_name, asset_id, started, &result);
        result
    }

    fn finish<T>(
        &self,
        operation_name: &str,
        asset_id: Option<&str>,
        started: Instant,
        result: &ResilienceResult<T>,
    ) {
        let outcome = match result {
            Ok(_) => "success",
            Err(e) => e.label(),
        };
        metrics::record_provider_call(operation_name, outcome, started);

        match result {
            Ok(_) => tracing::info!(
                operation = operation_name,
                asset_id = asset_id.unwrap_or("-"),
                duration = ?started.elapsed(),
                circuit_state = self.breaker.state().as_str(),
                "Provider operation succeeded"
            ),
            Err(e) => tracing::error!(
                operation = operation_name,
                asset_id = asset_id.unwrap_or("-"),
                duration = ?started.elapsed(),
                error = %e,
                circuit_state = self.breaker.state().as_str(),
                "Provider operation failed"
            ),
        }

        if let Some(asset_id) = asset_id {
            self.record_outcome(
                asset_id,
                operation_name,
                result.as_ref().err().map(|e| e.to_string()),
            );
        }
    }

    /// Circuit not open and retries still available.
    pub fn is_healthy(&self) -> bool {
        self.breaker.state() != CircuitState::Open && self.budget.remaining() > 0
    }

    pub fn processing_state(&self, asset_id: &str) -> Option<ProcessingState> {
        self.states.get(asset_id).map(|r| r.value().clone())
    }

    pub fn snapshot(&self) -> ResilienceSnapshot {
        let mut processing_states: Vec<_> = self.states.iter().map(|r| r.value().clone()).collect();
        processing_states.sort_by(|a, b| a.asset_id.cmp(&b.asset_id));

        ResilienceSnapshot {
            healthy: self.is_healthy(),
            circuit_breaker: self.breaker.snapshot(),
            retry_budget: self.budget.snapshot(),
            processing_states,
        }
    }

    /// Record the latest outcome of `operation` on `asset_id`.
    pub fn record_outcome(&self, asset_id: &str, operation: &str, error: Option<String>) {
        let updated_at = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();

        if !self.states.contains_key(asset_id) && self.states.len() >= MAX_PROCESSING_STATES {
            let stalest = self
                .states
                .iter()
                .min_by_key(|r| r.value().updated_at)
                .map(|r| r.key().clone());
            if let Some(key) = stalest {
                self.states.remove(&key);
            }
        }

        self.states.insert(
            asset_id.to_string(),
            ProcessingState {
                asset_id: asset_id.to_string(),
                operation: operation.to_string(),
                succeeded: error.is_none(),
                circuit_state: self.breaker.state(),
                last_error: error,
                updated_at,
            },
        );
    }

    /// Drop the processing state of an asset whose job has finished.
    pub fn forget(&self, asset_id: &str) {
        self.states.remove(asset_id);
    }
}
