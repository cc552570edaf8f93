//! Circuit breaker for the video provider.
//!
//! # States
//! - Closed: normal operation, calls pass through
//! - Open: provider assumed down, calls fail fast
//! - Half-Open: a limited number of trial calls test recovery
//!
//! # State Transitions
//! ```text
//! Closed → Open: failure_threshold consecutive failures within failure_window
//! Open → Half-Open: after cooldown
//! Half-Open → Closed: success_threshold consecutive trial successes
//! Half-Open → Open: any trial failure
//! ```
//!
//! # Design Decisions
//! - One breaker per provider, shared by every caller and poll session
//! - Only transport errors, timeouts and 5xx count as failures
//! - Time comes from `tokio::time::Instant` so tests can pause the clock

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::ProviderError;
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

/// Breaker tuning. Every value is supplied by configuration.
#[derive(Debug, Clone, Copy)]
pub struct BreakerSettings {
    /// Consecutive counted failures that open the circuit.
    pub failure_threshold: u32,
    /// Failures older than this no longer count toward the threshold.
    pub failure_window: Duration,
    /// Time spent Open before trial calls are allowed.
    pub cooldown: Duration,
    /// Consecutive trial successes needed to close again.
    pub success_threshold: u32,
    /// Trial calls allowed in flight while Half-Open.
    pub half_open_max_calls: u32,
}

/// A state change, broadcast to subscribers.
#[derive(Debug, Clone, Copy)]
pub struct StateTransition {
    pub from: CircuitState,
    pub to: CircuitState,
    pub at: Instant,
}

/// Why a guarded call did not produce a value.
#[derive(Debug, Clone, Error)]
pub enum CallError {
    /// Rejected without invoking the operation.
    #[error("circuit open")]
    Open,
    /// The operation ran and failed.
    #[error(transparent)]
    Failed(#[from] ProviderError),
}

/// Point-in-time view for health and admin endpoints.
#[derive(Debug, Clone, Serialize)]
pub struct BreakerSnapshot {
    pub state: CircuitState,
    pub failure_streak: u32,
    pub trial_successes: u32,
    pub trials_in_flight: u32,
    pub total_calls: u64,
    pub total_failures: u64,
    pub total_rejections: u64,
}

#[derive(Debug)]
struct Inner {
    state: CircuitState,
    /// Timestamps of the current failure streak (Closed only).
    failures: Vec<Instant>,
    opened_at: Option<Instant>,
    trial_successes: u32,
    trials_in_flight: u32,
    total_calls: u64,
    total_failures: u64,
    total_rejections: u64,
}

/// Shared provider circuit breaker.
#[derive(Debug)]
pub struct CircuitBreaker {
    settings: BreakerSettings,
    inner: Mutex<Inner>,
    events: broadcast::Sender<StateTransition>,
}

enum Outcome {
    Success,
    Failure,
    Neutral,
}

/// An admitted call. Dropping it unrecorded (the caller was cancelled
/// mid-call) counts as neutral so a trial slot is never leaked.
struct Admission<'a> {
    breaker: &'a CircuitBreaker,
    trial: bool,
    recorded: bool,
}

impl Admission<'_> {
    fn finish(mut self, outcome: Outcome) {
        self.recorded = true;
        self.breaker.record(self.trial, outcome);
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.recorded {
            self.breaker.record(self.trial, Outcome::Neutral);
        }
    }
}

impl CircuitBreaker {
    pub fn new(settings: BreakerSettings) -> Self {
        let (events, _) = broadcast::channel(64);
        metrics::record_circuit_state(CircuitState::Closed);
        Self {
            settings,
            inner: Mutex::new(Inner {
                state: CircuitState::Closed,
                failures: Vec::new(),
                opened_at: None,
                trial_successes: 0,
                trials_in_flight: 0,
                total_calls: 0,
                total_failures: 0,
                total_rejections: 0,
            }),
            events,
        }
    }

    pub fn settings(&self) -> &BreakerSettings {
        &self.settings
    }

    /// Receive every future state transition.
    pub fn subscribe(&self) -> broadcast::Receiver<StateTransition> {
        self.events.subscribe()
    }

    /// Current state, promoting Open to Half-Open if the cooldown is over.
    pub fn state(&self) -> CircuitState {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        inner.state
    }

    pub fn snapshot(&self) -> BreakerSnapshot {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());
        BreakerSnapshot {
            state: inner.state,
            failure_streak: inner.failures.len() as u32,
            trial_successes: inner.trial_successes,
            trials_in_flight: inner.trials_in_flight,
            total_calls: inner.total_calls,
            total_failures: inner.total_failures,
            total_rejections: inner.total_rejections,
        }
    }

    /// Run `operation` unless the circuit forbids it, and record the outcome.
    pub async fn call<T, F, Fut>(&self, operation: F) -> Result<T, CallError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let admission = Admission {
            breaker: self,
            trial: self.admit()?,
            recorded: false,
        };
        let result = operation().await;

        let outcome = match &result {
            Ok(_) => Outcome::Success,
            Err(e) if e.counts_against_circuit() => Outcome::Failure,
            Err(_) => Outcome::Neutral,
        };
        admission.finish(outcome);

        result.map_err(CallError::Failed)
    }

    /// Decide whether a call may proceed. Returns whether it is a trial call.
    fn admit(&self) -> Result<bool, CallError> {
        let mut inner = self.lock();
        self.refresh(&mut inner, Instant::now());

        match inner.state {
            CircuitState::Closed => {
                inner.total_calls += 1;
                Ok(false)
            }
            CircuitState::HalfOpen if inner.trials_in_flight < self.settings.half_open_max_calls => {
                inner.trials_in_flight += 1;
                inner.total_calls += 1;
                Ok(true)
            }
            _ => {
                inner.total_rejections += 1;
                Err(CallError::Open)
            }
        }
    }

    fn record(&self, trial: bool, outcome: Outcome) {
        let mut inner = self.lock();
        let now = Instant::now();

        if trial {
            inner.trials_in_flight = inner.trials_in_flight.saturating_sub(1);
        }
        if matches!(outcome, Outcome::Failure) {
            inner.total_failures += 1;
        }

        match (inner.state, outcome) {
            (CircuitState::Closed, Outcome::Success) => inner.failures.clear(),
            (CircuitState::Closed, Outcome::Failure) => {
                let window = self.settings.failure_window;
                inner.failures.retain(|at| now.duration_since(*at) <= window);
                inner.failures.push(now);
                if inner.failures.len() as u32 >= self.settings.failure_threshold {
                    tracing::error!(
                        failures = inner.failures.len(),
                        threshold = self.settings.failure_threshold,
                        "Circuit breaker opened"
                    );
                    self.transition(&mut inner, CircuitState::Open, now);
                }
            }
            // Only trial results move a half-open circuit; stragglers admitted
            // while closed are ignored.
            (CircuitState::HalfOpen, Outcome::Success) if trial => {
                inner.trial_successes += 1;
                if inner.trial_successes >= self.settings.success_threshold {
                    tracing::info!(
                        successes = inner.trial_successes,
                        "Circuit breaker closed after recovery"
                    );
                    self.transition(&mut inner, CircuitState::Closed, now);
                }
            }
            (CircuitState::HalfOpen, Outcome::Failure) if trial => {
                tracing::error!("Trial call failed, circuit breaker re-opened");
                self.transition(&mut inner, CircuitState::Open, now);
            }
            _ => {}
        }
    }

    /// Lazily apply the Open → Half-Open timer.
    fn refresh(&self, inner: &mut Inner, now: Instant) {
        if inner.state != CircuitState::Open {
            return;
        }
        let cooled = inner
            .opened_at
            .map(|at| now.duration_since(at) >= self.settings.cooldown)
            .unwrap_or(true);
        if cooled {
            tracing::info!(cooldown = ?self.settings.cooldown, "Circuit breaker half-open, allowing trial calls");
            self.transition(inner, CircuitState::HalfOpen, now);
        }
    }

    fn transition(&self, inner: &mut Inner, to: CircuitState, now: Instant) {
        let from = inner.state;
        if from == to {
            return;
        }

        inner.state = to;
        inner.failures.clear();
        inner.trial_successes = 0;
        match to {
            CircuitState::Open => inner.opened_at = Some(now),
            CircuitState::Closed => inner.opened_at = None,
            CircuitState::HalfOpen => {}
        }

        metrics::record_circuit_transition(from, to);
        let _ = self.events.send(StateTransition { from, to, at: now });
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
