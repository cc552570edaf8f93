//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse, environment overrides)
//!     → validation.rs (semantic checks)
//!     → ServiceConfig (validated, immutable)
//!
//! On file change:
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → mpsc channel to the HTTP server
//!     → atomic swap of the webhook verifier
//! ```
//!
//! # Design Decisions
//! - All fields have defaults to allow minimal configs
//! - Secrets can come from the environment instead of the file
//! - Breaker, budget and poller settings apply at startup only; a reload
//!   swaps the webhook secret and tolerance

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, ConfigError};
pub use schema::{
    AdminConfig, CircuitBreakerConfig, ListenerConfig, ObservabilityConfig, PollingConfig,
    ProviderConfig, RetryConfig, ServiceConfig, StoreConfig, WebhookConfig,
};
