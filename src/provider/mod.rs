//! Video provider integration.
//!
//! # Data Flow
//! ```text
//! caller
//!     → ResilienceContext (retry → breaker → timeout)
//!     → client.rs (one HTTP request)
//!     → types.rs (status vocabulary, response decoding)
//! ```
//!
//! The poller only needs `JobStatusSource`, so tests can drive it with a
//! scripted source instead of a live provider.

pub mod client;
pub mod types;

use std::future::Future;

use crate::error::ProviderError;

pub use client::ProviderClient;
pub use types::{AssetStatus, JobStatus};

/// Anything that can report the current status of an asynchronous job.
pub trait JobStatusSource: Send + Sync + 'static {
    fn check_status(
        &self,
        job_id: &str,
    ) -> impl Future<Output = Result<AssetStatus, ProviderError>> + Send;
}
