//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (thresholds > 0, factors in range, addresses parse)
//! - Refuse insecure setups (no webhook secret, placeholder admin key)
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ServiceConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ServiceConfig;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub fn validate_config(config: &ServiceConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("listener.bind_address", "not a socket address"));
    }
    if config.listener.request_timeout_secs == 0 {
        errors.push(ValidationError::new("listener.request_timeout_secs", "must be greater than 0"));
    }

    let provider = &config.provider;
    match Url::parse(&provider.base_url) {
        Ok(url) if url.scheme() == "http" || url.scheme() == "https" => {}
        _ => errors.push(ValidationError::new("provider.base_url", "must be an http(s) URL")),
    }
    if provider.request_timeout_ms == 0 {
        errors.push(ValidationError::new("provider.request_timeout_ms", "must be greater than 0"));
    }

    let cb = &config.circuit_breaker;
    if cb.failure_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_threshold", "must be greater than 0"));
    }
    if cb.failure_window_secs == 0 {
        errors.push(ValidationError::new("circuit_breaker.failure_window_secs", "must be greater than 0"));
    }
    if cb.success_threshold == 0 {
        errors.push(ValidationError::new("circuit_breaker.success_threshold", "must be greater than 0"));
    }
    if cb.half_open_max_calls == 0 {
        errors.push(ValidationError::new("circuit_breaker.half_open_max_calls", "must be greater than 0"));
    }

    let retries = &config.retries;
    if retries.max_attempts == 0 {
        errors.push(ValidationError::new("retries.max_attempts", "must be at least 1"));
    }
    if retries.base_delay_ms > retries.max_delay_ms {
        errors.push(ValidationError::new("retries.base_delay_ms", "must not exceed max_delay_ms"));
    }
    if !(0.0..=1.0).contains(&retries.jitter_factor) {
        errors.push(ValidationError::new("retries.jitter_factor", "must be between 0 and 1"));
    }
    if retries.budget_window_secs == 0 {
        errors.push(ValidationError::new("retries.budget_window_secs", "must be greater than 0"));
    }

    let polling = &config.polling;
    if polling.base_interval_ms == 0 {
        errors.push(ValidationError::new("polling.base_interval_ms", "must be greater than 0"));
    }
    if polling.base_interval_ms > polling.max_interval_ms {
        errors.push(ValidationError::new("polling.base_interval_ms", "must not exceed max_interval_ms"));
    }
    if !(polling.growth_factor >= 1.0 && polling.growth_factor.is_finite()) {
        errors.push(ValidationError::new("polling.growth_factor", "must be at least 1.0"));
    }
    if polling.error_backoff_ms > polling.max_backoff_ms {
        errors.push(ValidationError::new("polling.error_backoff_ms", "must not exceed max_backoff_ms"));
    }
    if !(0.0..=1.0).contains(&polling.jitter_factor) {
        errors.push(ValidationError::new("polling.jitter_factor", "must be between 0 and 1"));
    }
    if polling.max_duration_secs == 0 {
        errors.push(ValidationError::new("polling.max_duration_secs", "must be greater than 0"));
    }
    if polling.max_checks == 0 {
        errors.push(ValidationError::new("polling.max_checks", "must be greater than 0"));
    }

    if config.webhook.secret.is_empty() {
        errors.push(ValidationError::new(
            "webhook.secret",
            "must be set (or provide VIDEO_WEBHOOK_SECRET)",
        ));
    }

    let obs = &config.observability;
    if !matches!(obs.log_format.as_str(), "pretty" | "json") {
        errors.push(ValidationError::new("observability.log_format", "must be \"pretty\" or \"json\""));
    }
    if obs.metrics_enabled && obs.metrics_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::new("observability.metrics_address", "not a socket address"));
    }

    if config.admin.enabled
        && (config.admin.api_key.is_empty() || config.admin.api_key == "CHANGE_ME_IN_PRODUCTION")
    {
        errors.push(ValidationError::new("admin.api_key", "must be changed when admin is enabled"));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
