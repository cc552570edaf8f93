//! Adaptive polling for asynchronous provider jobs.
//!
//! # Data Flow
//! ```text
//! Poller::start_polling(job_id, on_terminal)
//!     → spawned session task
//!     → ResilienceContext::attempt (breaker + timeout)
//!     → PollSession::on_status / on_transient_error (next delay)
//!     → sleep or cancel
//!     → on_terminal(outcome) exactly once
//! ```
//!
//! Polling is the fallback path; webhooks are the primary signal. Sessions
//! share the provider's breaker, so one session seeing failures slows down
//! every other session too.

pub mod poller;
pub mod session;

pub use poller::{PollHandle, PollOutcome, Poller};
pub use session::{PollPhase, PollSession, PollSettings, SessionInfo};
