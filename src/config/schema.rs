//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the service.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the video resilience service.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ServiceConfig {
    /// Listener configuration (bind address, limits).
    pub listener: ListenerConfig,

    /// Video provider endpoint and credentials.
    pub provider: ProviderConfig,

    /// Circuit breaker thresholds.
    pub circuit_breaker: CircuitBreakerConfig,

    /// Retry policy and shared retry budget.
    pub retries: RetryConfig,

    /// Adaptive poller intervals and ceilings.
    pub polling: PollingConfig,

    /// Inbound webhook verification.
    pub webhook: WebhookConfig,

    /// Asset store persistence.
    pub store: StoreConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,

    pub admin: AdminConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    pub bind_address: String,

    /// Whole-request timeout for inbound HTTP in seconds.
    pub request_timeout_secs: u64,

    /// Maximum accepted request body in bytes.
    pub max_body_bytes: usize,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
            max_body_bytes: 1024 * 1024, // 1MB
        }
    }
}

/// Video provider configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// API root (e.g., "https://api.mux.com/").
    pub base_url: String,

    /// Access token id (basic auth user).
    pub token_id: String,

    /// Access token secret (basic auth password).
    pub token_secret: String,

    /// Per-attempt timeout in milliseconds.
    pub request_timeout_ms: u64,

    /// Connection establishment timeout in milliseconds.
    pub connect_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.mux.com/".to_string(),
            token_id: String::new(),
            token_secret: String::new(),
            request_timeout_ms: 10_000,
            connect_timeout_ms: 3_000,
        }
    }
}

/// Circuit breaker configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Consecutive counted failures that open the circuit.
    pub failure_threshold: u32,

    /// Failures older than this no longer count, in seconds.
    pub failure_window_secs: u64,

    /// Time spent Open before a trial call is allowed, in milliseconds.
    pub cooldown_ms: u64,

    /// Trial successes needed to close again.
    pub success_threshold: u32,

    /// Concurrent trial calls allowed while HalfOpen.
    pub half_open_max_calls: u32,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            failure_window_secs: 60,
            cooldown_ms: 30_000,
            success_threshold: 2,
            half_open_max_calls: 1,
        }
    }
}

/// Retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Maximum attempts per operation, first try included.
    pub max_attempts: u32,

    /// Base delay for exponential backoff in milliseconds.
    pub base_delay_ms: u64,

    /// Maximum delay for exponential backoff in milliseconds.
    pub max_delay_ms: u64,

    /// Jitter as a fraction of the delay (0.1 = up to 10% extra).
    pub jitter_factor: f64,

    /// Retries allowed across all callers per budget window.
    pub budget_limit: u32,

    /// Budget window length in seconds.
    pub budget_window_secs: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter_factor: 0.1,
            budget_limit: 50,
            budget_window_secs: 60,
        }
    }
}

/// Adaptive polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PollingConfig {
    pub base_interval_ms: u64,
    pub max_interval_ms: u64,

    /// Interval multiplier while the job status is unchanged.
    pub growth_factor: f64,

    /// Minimum interval while the provider is unhealthy.
    pub degraded_interval_ms: u64,

    pub error_backoff_ms: u64,
    pub max_backoff_ms: u64,

    /// Give up on a job after this long.
    pub max_duration_secs: u64,

    /// Give up on a job after this many checks.
    pub max_checks: u32,

    pub jitter_factor: f64,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            base_interval_ms: 3_000,
            max_interval_ms: 30_000,
            growth_factor: 1.5,
            degraded_interval_ms: 5_000,
            error_backoff_ms: 5_000,
            max_backoff_ms: 60_000,
            max_duration_secs: 600, // 10 minutes
            max_checks: 200,
            jitter_factor: 0.1,
        }
    }
}

/// Webhook verification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Shared signing secret. Usually supplied via `VIDEO_WEBHOOK_SECRET`.
    pub secret: String,

    /// Accepted clock skew between signing and receipt, in seconds.
    pub tolerance_secs: u64,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            secret: String::new(),
            tolerance_secs: 300,
        }
    }
}

/// Asset store configuration.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct StoreConfig {
    /// JSON file the asset store is loaded from and saved to.
    pub persistence_path: Option<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: true,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

/// Admin API configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct AdminConfig {
    /// Mount the admin routes.
    pub enabled: bool,

    /// API key for authentication (Bearer token).
    pub api_key: String,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            // WARNING: This is a placeholder! Change this in production.
            api_key: "CHANGE_ME_IN_PRODUCTION".to_string(),
        }
    }
}
