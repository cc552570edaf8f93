//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, body limit, timeout, tracing)
//!     → handlers.rs (webhook verification → store, health)
//!     → admin (bearer auth → resilience snapshots, submissions, polling control)
//! ```

pub mod handlers;
pub mod server;

pub use server::{AppState, HttpServer, ServerError};
