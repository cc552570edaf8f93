//! Configuration loading from disk and the environment.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::ServiceConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Environment variables that override secrets from the file.
pub const ENV_WEBHOOK_SECRET: &str = "VIDEO_WEBHOOK_SECRET";
pub const ENV_PROVIDER_TOKEN_ID: &str = "VIDEO_PROVIDER_TOKEN_ID";
pub const ENV_PROVIDER_TOKEN_SECRET: &str = "VIDEO_PROVIDER_TOKEN_SECRET";
pub const ENV_ADMIN_API_KEY: &str = "VIDEO_ADMIN_API_KEY";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    load_config_str(&content)
}

/// Parse, apply environment overrides, and validate.
pub fn load_config_str(content: &str) -> Result<ServiceConfig, ConfigError> {
    let mut config: ServiceConfig = toml::from_str(content)?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Defaults plus environment overrides, validated. Used when no file is given.
pub fn default_config() -> Result<ServiceConfig, ConfigError> {
    let mut config = ServiceConfig::default();
    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Overwrite secrets with non-empty values from `lookup`.
pub fn apply_env_overrides<F>(config: &mut ServiceConfig, lookup: F)
where
    F: Fn(&str) -> Option<String>,
{
    let overrides: [(&str, &mut String); 4] = [
        (ENV_WEBHOOK_SECRET, &mut config.webhook.secret),
        (ENV_PROVIDER_TOKEN_ID, &mut config.provider.token_id),
        (ENV_PROVIDER_TOKEN_SECRET, &mut config.provider.token_secret),
        (ENV_ADMIN_API_KEY, &mut config.admin.api_key),
    ];

    for (key, field) in overrides {
        if let Some(value) = lookup(key).filter(|v| !v.is_empty()) {
            tracing::debug!(variable = key, "Applying environment override");
            *field = value;
        }
    }
}
