//! Resilience layer for an external video-processing provider.
//!
//! Guards provider calls with a shared circuit breaker, retry budget and
//! per-attempt timeouts; tracks asynchronous transcode jobs with an adaptive
//! poller; and accepts signed provider webhooks.

pub mod admin;
pub mod config;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod observability;
pub mod polling;
pub mod provider;
pub mod resilience;
pub mod store;
pub mod webhook;

pub use config::ServiceConfig;
pub use error::{ProviderError, ResilienceError, ResilienceResult};
pub use http::HttpServer;
pub use lifecycle::Shutdown;
pub use resilience::ResilienceContext;
