//! Adaptive status poller.
//!
//! One spawned task per session. Every suspension point races the session's
//! cancellation token, so `cancel()` takes effect at the next sleep or check
//! and `on_terminal` is never invoked for a cancelled session.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use dashmap::DashMap;
use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::error::{ResilienceError, ResilienceResult};
use crate::observability::metrics;
use crate::polling::session::{PollSession, PollSettings, SessionInfo, Step};
use crate::provider::{AssetStatus, JobStatusSource};
use crate::resilience::{CallError, ResilienceContext};

/// Successful end of a poll session.
#[derive(Debug, Clone)]
pub struct PollOutcome {
    pub session_id: Uuid,
    pub job_id: String,
    /// Terminal provider status (`ready` or `errored`).
    pub status: AssetStatus,
    pub checks: u32,
    pub elapsed: Duration,
}

/// Handle to a running poll session.
#[derive(Debug)]
pub struct PollHandle {
    pub session_id: Uuid,
    pub job_id: String,
    cancel: CancellationToken,
    done: watch::Receiver<()>,
}

impl PollHandle {
    /// Stop the session without invoking its callback.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the session task to exit.
    pub async fn join(mut self) {
        // The task holds the sender; it is dropped on exit.
        let _ = self.done.changed().await;
    }
}

struct SessionEntry {
    session_id: Uuid,
    cancel: CancellationToken,
    state: Arc<Mutex<PollSession>>,
    done: watch::Receiver<()>,
}

/// Spawns and tracks poll sessions against one status source.
pub struct Poller<S> {
    source: Arc<S>,
    context: ResilienceContext,
    settings: PollSettings,
    sessions: Arc<DashMap<String, SessionEntry>>,
    shutdown: CancellationToken,
}

impl<S> Clone for Poller<S> {
    fn clone(&self) -> Self {
        Self {
            source: Arc::clone(&self.source),
            context: self.context.clone(),
            settings: self.settings,
            sessions: Arc::clone(&self.sessions),
            shutdown: self.shutdown.clone(),
        }
    }
}

impl<S: JobStatusSource> Poller<S> {
    /// Sessions derive their tokens from `shutdown`; cancelling it stops them all.
    pub fn new(
        source: Arc<S>,
        context: ResilienceContext,
        settings: PollSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            context,
            settings,
            sessions: Arc::new(DashMap::new()),
            shutdown,
        }
    }

    pub fn settings(&self) -> &PollSettings {
        &self.settings
    }

    /// Start polling `job_id`. `on_terminal` runs exactly once when the job
    /// finishes or the session gives up, and never if it is cancelled.
    ///
    /// An existing session for the same job is cancelled and replaced.
    pub fn start_polling<F>(&self, job_id: &str, on_terminal: F) -> PollHandle
    where
        F: FnOnce(ResilienceResult<PollOutcome>) + Send + 'static,
    {
        let session = PollSession::new(job_id, &self.settings, Instant::now());
        let session_id = session.session_id;
        let state = Arc::new(Mutex::new(session));
        let cancel = self.shutdown.child_token();
        let (done_tx, done_rx) = watch::channel(());

        if let Some(previous) = self.sessions.insert(
            job_id.to_string(),
            SessionEntry {
                session_id,
                cancel: cancel.clone(),
                state: Arc::clone(&state),
                done: done_rx.clone(),
            },
        ) {
            tracing::info!(
                job_id,
                previous_session = %previous.session_id,
                session_id = %session_id,
                "Replacing existing poll session"
            );
            previous.cancel.cancel();
        }
        metrics::record_poll_sessions(self.sessions.len());

        tracing::info!(job_id, session_id = %session_id, "Poll session started");

        let task = SessionTask {
            source: Arc::clone(&self.source),
            context: self.context.clone(),
            settings: self.settings,
            state,
            cancel: cancel.clone(),
        };
        let sessions = Arc::clone(&self.sessions);
        let job = job_id.to_string();

        tokio::spawn(async move {
            let _done = done_tx;
            let result = task.run().await;

            sessions.remove_if(&job, |_, entry| entry.session_id == session_id);
            metrics::record_poll_sessions(sessions.len());

            match result {
                Some(result) => on_terminal(result),
                None => tracing::info!(job_id = %job, session_id = %session_id, "Poll session cancelled"),
            }
        });

        PollHandle {
            session_id,
            job_id: job_id.to_string(),
            cancel,
            done: done_rx,
        }
    }

    /// Cancel the session for `job_id`. Returns whether one was running.
    pub fn stop_polling(&self, job_id: &str) -> bool {
        match self.sessions.get(job_id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every session and wait for their tasks to exit.
    pub async fn stop_all(&self) {
        let waiters: Vec<_> = self
            .sessions
            .iter()
            .map(|entry| {
                entry.cancel.cancel();
                entry.done.clone()
            })
            .collect();

        tracing::info!(sessions = waiters.len(), "Stopping all poll sessions");
        join_all(waiters.into_iter().map(|mut done| async move {
            let _ = done.changed().await;
        }))
        .await;
    }

    pub fn is_polling(&self, job_id: &str) -> bool {
        self.sessions.contains_key(job_id)
    }

    /// Snapshot of live sessions, sorted by job id.
    pub fn active_sessions(&self) -> Vec<SessionInfo> {
        let mut sessions: Vec<SessionInfo> = self
            .sessions
            .iter()
            .map(|entry| {
                let state = entry.state.lock().unwrap_or_else(PoisonError::into_inner);
                SessionInfo::from(&*state)
            })
            .collect();
        sessions.sort_by(|a, b| a.job_id.cmp(&b.job_id));
        sessions
    }
}

struct SessionTask<S> {
    source: Arc<S>,
    context: ResilienceContext,
    settings: PollSettings,
    state: Arc<Mutex<PollSession>>,
    cancel: CancellationToken,
}

impl<S: JobStatusSource> SessionTask<S> {
    fn lock(&self) -> std::sync::MutexGuard<'_, PollSession> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Drive the session to completion. `None` means cancelled.
    async fn run(&self) -> Option<ResilienceResult<PollOutcome>> {
        let job_id = self.lock().job_id.clone();

        loop {
            let limits = {
                let mut session = self.lock();
                let limits = session.check_limits(&self.settings, Instant::now());
                if limits.is_ok() {
                    session.checks += 1;
                }
                limits
            };
            if let Err(e) = limits {
                tracing::warn!(job_id = %job_id, error = %e, "Poll session gave up");
                metrics::record_poll_check("gave_up");
                self.lock().terminate();
                return Some(Err(e));
            }

            let checked = tokio::select! {
                _ = self.cancel.cancelled() => return None,
                result = self.context.attempt(self.source.check_status(&job_id)) => result,
            };

            let degraded = !self.context.is_healthy();
            let delay = match checked {
                Ok(status) => {
                    let step = self.lock().on_status(status, &self.settings, degraded);
                    match step {
                        Step::Finished(status) => {
                            metrics::record_poll_check("terminal");
                            return Some(Ok(self.outcome(status)));
                        }
                        Step::Wait(delay) => {
                            metrics::record_poll_check("not_ready");
                            delay
                        }
                    }
                }
                Err(CallError::Open) => {
                    metrics::record_poll_check("circuit_open");
                    tracing::debug!(job_id = %job_id, "Circuit open, backing off");
                    self.lock().on_transient_error(&self.settings)
                }
                Err(CallError::Failed(e)) if e.is_retryable() => {
                    metrics::record_poll_check("error");
                    tracing::warn!(job_id = %job_id, error = %e, "Status check failed, backing off");
                    self.lock().on_transient_error(&self.settings)
                }
                Err(CallError::Failed(e)) => {
                    metrics::record_poll_check("rejected");
                    tracing::error!(job_id = %job_id, error = %e, "Status check rejected by provider");
                    self.lock().terminate();
                    return Some(Err(ResilienceError::Permanent(e)));
                }
            };

            // Wake at the deadline at the latest so the timeout is reported on time.
            let delay = {
                let session = self.lock();
                delay.min(session.remaining(&self.settings, Instant::now()))
            };
            tracing::debug!(job_id = %job_id, delay = ?delay, "Next status check scheduled");

            tokio::select! {
                _ = self.cancel.cancelled() => return None,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    fn outcome(&self, status: AssetStatus) -> PollOutcome {
        let session = self.lock();
        tracing::info!(
            job_id = %session.job_id,
            status = status.status.as_str(),
            checks = session.checks,
            "Poll session finished"
        );
        PollOutcome {
            session_id: session.session_id,
            job_id: session.job_id.clone(),
            status,
            checks: session.checks,
            elapsed: session.started_at.elapsed(),
        }
    }
}
