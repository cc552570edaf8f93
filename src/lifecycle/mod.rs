//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Logging/metrics → Store → Poller → Listener
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Cancel poll sessions → Save store → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! # Design Decisions
//! - Ordered shutdown: HTTP first, then pollers, then persistence
//! - Poll sessions hang off a root cancellation token; cancelling it
//!   stops every session without running their callbacks

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
pub use signals::wait_for_shutdown_signal;
