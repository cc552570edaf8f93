//! Per-attempt timeout enforcement.
//!
//! An attempt that outlives its deadline is dropped and reported as a
//! `ProviderErrorKind::Timeout`, which counts against the circuit and is
//! retryable.

use std::future::Future;
use std::time::Duration;

use crate::error::ProviderError;

/// Run `attempt` with a deadline of `limit`.
pub async fn with_timeout<T, Fut>(limit: Duration, attempt: Fut) -> Result<T, ProviderError>
where
    Fut: Future<Output = Result<T, ProviderError>>,
{
    match tokio::time::timeout(limit, attempt).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(limit = ?limit, "Provider call exceeded its deadline");
            Err(ProviderError::timeout(limit))
        }
    }
}
