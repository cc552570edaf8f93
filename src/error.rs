//! Error taxonomy for the resilience layer.
//!
//! # Propagation
//! ```text
//! ProviderError (one attempt)
//!     → Transient: retried locally, surfaced only after attempts/budget run out
//!     → Permanent: surfaced immediately, never retried
//! CircuitOpen: returned before any network call ("we didn't try")
//! WebhookRejected: nothing from the payload is applied
//! PollTimeout / PollAttemptsExhausted: surfaced as a stalled job
//! ```

use std::time::Duration;

use thiserror::Error;

use crate::webhook::RejectReason;

/// What went wrong talking to the provider on a single attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    /// Connection refused, reset, DNS failure.
    Transport,
    /// The per-attempt deadline elapsed.
    Timeout,
    /// The provider answered with a non-success HTTP status.
    Status(u16),
    /// The provider answered 2xx but the body did not decode.
    Decode,
}

/// A failed call to the video provider.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

impl ProviderError {
    pub fn transport(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Transport,
            message: message.into(),
        }
    }

    pub fn timeout(limit: Duration) -> Self {
        Self {
            kind: ProviderErrorKind::Timeout,
            message: format!("provider call timed out after {:?}", limit),
        }
    }

    pub fn status(status: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Status(status),
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self {
            kind: ProviderErrorKind::Decode,
            message: message.into(),
        }
    }

    /// Whether another attempt could plausibly succeed.
    ///
    /// 408 and 429 are the only 4xx worth retrying.
    pub fn is_retryable(&self) -> bool {
        match self.kind {
            ProviderErrorKind::Transport | ProviderErrorKind::Timeout => true,
            ProviderErrorKind::Status(code) => code >= 500 || code == 408 || code == 429,
            ProviderErrorKind::Decode => false,
        }
    }

    /// Whether this outcome says something about provider health.
    ///
    /// Only transport failures, timeouts and 5xx count. A 4xx is the caller's
    /// problem and must not trip the breaker.
    pub fn counts_against_circuit(&self) -> bool {
        match self.kind {
            ProviderErrorKind::Transport | ProviderErrorKind::Timeout => true,
            ProviderErrorKind::Status(code) => code >= 500,
            ProviderErrorKind::Decode => false,
        }
    }

    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::Transport => "transport",
            ProviderErrorKind::Timeout => "timeout",
            ProviderErrorKind::Status(code) if code >= 500 => "server_error",
            ProviderErrorKind::Status(_) => "client_error",
            ProviderErrorKind::Decode => "decode",
        }
    }
}

/// Errors surfaced to callers of the resilience layer.
#[derive(Debug, Error)]
pub enum ResilienceError {
    /// A retryable failure that outlived every attempt.
    #[error("transient provider error after {attempts} attempt(s): {source}")]
    Transient {
        attempts: u32,
        #[source]
        source: ProviderError,
    },

    /// A failure that retrying cannot fix (bad request, auth, not found).
    #[error("permanent provider error: {0}")]
    Permanent(ProviderError),

    /// The breaker rejected the call; the provider was not contacted.
    #[error("circuit breaker is open, provider call not attempted")]
    CircuitOpen,

    /// The shared retry budget ran dry before the attempt limit.
    #[error("retry budget exhausted after {attempts} attempt(s): {last_error}")]
    RetryBudgetExhausted {
        attempts: u32,
        last_error: ProviderError,
    },

    /// An inbound webhook failed verification.
    #[error("webhook rejected: {0}")]
    WebhookRejected(RejectReason),

    /// A poll session hit its overall deadline.
    #[error("polling for job {job_id} timed out after {elapsed:?}")]
    PollTimeout { job_id: String, elapsed: Duration },

    /// A poll session hit its check ceiling.
    #[error("polling for job {job_id} gave up after {checks} status checks")]
    PollAttemptsExhausted { job_id: String, checks: u32 },
}

impl ResilienceError {
    /// Non-fatal "try again later" signals.
    pub fn is_try_again_later(&self) -> bool {
        matches!(
            self,
            ResilienceError::CircuitOpen | ResilienceError::RetryBudgetExhausted { .. }
        )
    }

    /// Errors that should be shown as a stalled job.
    pub fn is_stalled_job(&self) -> bool {
        matches!(
            self,
            ResilienceError::PollTimeout { .. } | ResilienceError::PollAttemptsExhausted { .. }
        )
    }

    /// Short label used for metrics and logs.
    pub fn label(&self) -> &'static str {
        match self {
            ResilienceError::Transient { .. } => "transient",
            ResilienceError::Permanent(_) => "permanent",
            ResilienceError::CircuitOpen => "circuit_open",
            ResilienceError::RetryBudgetExhausted { .. } => "budget_exhausted",
            ResilienceError::WebhookRejected(_) => "webhook_rejected",
            ResilienceError::PollTimeout { .. } => "poll_timeout",
            ResilienceError::PollAttemptsExhausted { .. } => "poll_attempts_exhausted",
        }
    }
}

/// Result type for resilience-wrapped operations.
pub type ResilienceResult<T> = Result<T, ResilienceError>;
