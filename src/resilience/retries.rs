//! Retry logic.
//!
//! # Responsibilities
//! - Decide whether a failed attempt is worth repeating
//! - Wait with exponential backoff + jitter between attempts
//! - Enforce a retry budget shared by every caller (max retries per window)
//!
//! # Design Decisions
//! - Permanent (4xx) errors propagate immediately
//! - A rejected circuit is never retried. If earlier attempts reached the
//!   provider, their last error is reported instead of `CircuitOpen`
//! - The budget is checked and spent in one locked step, and a retry the
//!   breaker turns away is refunded

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::error::{ProviderError, ResilienceError, ResilienceResult};
use crate::observability::metrics;
use crate::resilience::backoff::BackoffPolicy;
use crate::resilience::circuit_breaker::CallError;

/// Attempt limit and delay shape for one operation.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts, the first one included.
    pub max_attempts: u32,
    pub backoff: BackoffPolicy,
}

/// Fixed-window cap on retries across all callers.
#[derive(Debug)]
pub struct RetryBudget {
    limit: u32,
    window: Duration,
    state: Mutex<BudgetWindow>,
}

#[derive(Debug)]
struct BudgetWindow {
    started: Instant,
    used: u32,
}

/// Budget usage for the admin API.
#[derive(Debug, Clone, Serialize)]
pub struct BudgetSnapshot {
    pub limit: u32,
    pub used: u32,
    pub remaining: u32,
    pub window_secs: u64,
}

impl RetryBudget {
    pub fn new(limit: u32, window: Duration) -> Self {
        Self {
            limit,
            window,
            state: Mutex::new(BudgetWindow {
                started: Instant::now(),
                used: 0,
            }),
        }
    }

    /// Spend one retry if the current window has any left.
    pub fn try_acquire(&self) -> bool {
        self.acquire().is_some()
    }

    /// Spend one retry, returning the start of the window it came from.
    fn acquire(&self) -> Option<Instant> {
        let mut state = self.lock();
        if state.used >= self.limit {
            return None;
        }
        state.used += 1;
        tracing::debug!(
            used = state.used,
            limit = self.limit,
            remaining = self.limit - state.used,
            "Retry budget spent"
        );
        Some(state.started)
    }

    /// Give back a retry that never reached the provider. Ignored once the
    /// window it was taken from has rolled over.
    fn refund(&self, window: Instant) {
        let mut state = self.lock();
        if state.started == window {
            state.used = state.used.saturating_sub(1);
        }
    }

    pub fn remaining(&self) -> u32 {
        let state = self.lock();
        self.limit.saturating_sub(state.used)
    }

    pub fn snapshot(&self) -> BudgetSnapshot {
        let state = self.lock();
        BudgetSnapshot {
            limit: self.limit,
            used: state.used,
            remaining: self.limit.saturating_sub(state.used),
            window_secs: self.window.as_secs(),
        }
    }

    /// Lock the window, replenishing it first if it has expired.
    fn lock(&self) -> MutexGuard<'_, BudgetWindow> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        if now.duration_since(state.started) >= self.window {
            state.started = now;
            state.used = 0;
        }
        state
    }
}

/// Run `operation` until it succeeds, fails permanently, or runs out of
/// attempts or budget.
pub async fn with_retry<T, F, Fut>(
    operation_name: &str,
    policy: &RetryPolicy,
    budget: &RetryBudget,
    mut operation: F,
) -> ResilienceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, CallError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    let mut last_error: Option<ProviderError> = None;
    let mut spent_from: Option<Instant> = None;

    loop {
        attempt += 1;
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(CallError::Open) => {
                if let Some(window) = spent_from {
                    budget.refund(window);
                }
                return Err(match last_error {
                    Some(source) => {
                        tracing::info!(
                            operation = operation_name,
                            attempts = attempt - 1,
                            "Circuit opened between attempts, giving up"
                        );
                        ResilienceError::Transient {
                            attempts: attempt - 1,
                            source,
                        }
                    }
                    None => ResilienceError::CircuitOpen,
                });
            }
            Err(CallError::Failed(e)) if !e.is_retryable() => {
                tracing::info!(operation = operation_name, error = %e, "Not retrying permanent failure");
                return Err(ResilienceError::Permanent(e));
            }
            Err(CallError::Failed(e)) => e,
        };

        if attempt >= max_attempts {
            return Err(ResilienceError::Transient {
                attempts: attempt,
                source: error,
            });
        }

        spent_from = budget.acquire();
        if spent_from.is_none() {
            tracing::warn!(operation = operation_name, attempt, "Retry budget exhausted");
            metrics::record_retry_budget_exhausted();
            return Err(ResilienceError::RetryBudgetExhausted {
                attempts: attempt,
                last_error: error,
            });
        }

        let delay = policy.backoff.delay(attempt - 1);
        tracing::info!(
            operation = operation_name,
            attempt,
            delay = ?delay,
            error = %error,
            "Retrying provider call"
        );
        metrics::record_retry(operation_name);
        last_error = Some(error);
        tokio::time::sleep(delay).await;
    }
}
