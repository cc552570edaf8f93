//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Provider call:
//!     → retries.rs (retryable? budget left? back off and try again)
//!     → circuit_breaker.rs (fail fast while Open, track outcomes)
//!     → timeouts.rs (per-attempt deadline)
//!     → provider client
//! ```
//!
//! # Design Decisions
//! - One breaker and one retry budget per provider, shared by every caller
//!   and poll session through `ResilienceContext`
//! - A rejected call ("circuit open") is never retried
//! - 4xx responses are the caller's problem and never trip the breaker

pub mod backoff;
pub mod circuit_breaker;
pub mod context;
pub mod retries;
pub mod timeouts;

pub use backoff::BackoffPolicy;
pub use circuit_breaker::{BreakerSettings, CallError, CircuitBreaker, CircuitState, StateTransition};
pub use context::{ResilienceContext, ResilienceSnapshot};
pub use retries::{with_retry, RetryBudget, RetryPolicy};
