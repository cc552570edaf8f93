//! Poll session state machine.
//!
//! Pure bookkeeping: the poller task feeds it check results and sleeps for
//! whatever delay it returns. Nothing here touches the clock except through
//! the `now` arguments, which keeps the transitions easy to test.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;
use uuid::Uuid;

use crate::config::PollingConfig;
use crate::error::ResilienceError;
use crate::provider::{AssetStatus, JobStatus};
use crate::resilience::backoff::jittered;

/// Interval policy for one poll session.
#[derive(Debug, Clone, Copy)]
pub struct PollSettings {
    pub base_interval: Duration,
    pub max_interval: Duration,
    /// Multiplier applied while the status is unchanged.
    pub growth_factor: f64,
    /// Floor for the interval while the provider is unhealthy.
    pub degraded_interval: Duration,
    pub error_backoff: Duration,
    pub max_backoff: Duration,
    /// Session-wide ceiling on elapsed time.
    pub max_duration: Duration,
    /// Session-wide ceiling on status checks.
    pub max_checks: u32,
    pub jitter_factor: f64,
}

impl PollSettings {
    pub fn from_config(config: &PollingConfig) -> Self {
        Self {
            base_interval: Duration::from_millis(config.base_interval_ms),
            max_interval: Duration::from_millis(config.max_interval_ms),
            growth_factor: config.growth_factor,
            degraded_interval: Duration::from_millis(config.degraded_interval_ms),
            error_backoff: Duration::from_millis(config.error_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            max_duration: Duration::from_secs(config.max_duration_secs),
            max_checks: config.max_checks,
            jitter_factor: config.jitter_factor,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PollPhase {
    Polling,
    Backoff,
    Terminated,
}

/// What the poller should do after a check.
#[derive(Debug, Clone, PartialEq)]
pub enum Step {
    Wait(Duration),
    Finished(AssetStatus),
}

#[derive(Debug, Clone)]
pub struct PollSession {
    pub session_id: Uuid,
    pub job_id: String,
    pub started_at: Instant,
    pub interval: Duration,
    pub not_ready_count: u32,
    pub checks: u32,
    pub last_status: Option<JobStatus>,
    pub phase: PollPhase,
}

impl PollSession {
    pub fn new(job_id: impl Into<String>, settings: &PollSettings, now: Instant) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            job_id: job_id.into(),
            started_at: now,
            interval: settings.base_interval,
            not_ready_count: 0,
            checks: 0,
            last_status: None,
            phase: PollPhase::Polling,
        }
    }

    /// Fails once the session outlived its deadline or used up its checks.
    pub fn check_limits(&self, settings: &PollSettings, now: Instant) -> Result<(), ResilienceError> {
        let elapsed = now.saturating_duration_since(self.started_at);
        if elapsed >= settings.max_duration {
            return Err(ResilienceError::PollTimeout {
                job_id: self.job_id.clone(),
                elapsed,
            });
        }
        if self.checks >= settings.max_checks {
            return Err(ResilienceError::PollAttemptsExhausted {
                job_id: self.job_id.clone(),
                checks: self.checks,
            });
        }
        Ok(())
    }

    /// Remaining time before the deadline.
    pub fn remaining(&self, settings: &PollSettings, now: Instant) -> Duration {
        settings
            .max_duration
            .saturating_sub(now.saturating_duration_since(self.started_at))
    }

    /// Record a successful status check.
    pub fn on_status(&mut self, status: AssetStatus, settings: &PollSettings, degraded: bool) -> Step {
        if status.status.is_terminal() {
            self.phase = PollPhase::Terminated;
            self.last_status = Some(status.status.clone());
            return Step::Finished(status);
        }

        self.not_ready_count += 1;
        let unchanged = self.last_status.as_ref() == Some(&status.status);
        self.interval = if unchanged {
            self.interval.mul_f64(settings.growth_factor).min(settings.max_interval)
        } else {
            settings.base_interval
        };
        self.last_status = Some(status.status);
        self.phase = PollPhase::Polling;

        if degraded {
            Step::Wait(self.interval.max(settings.degraded_interval))
        } else {
            Step::Wait(self.interval)
        }
    }

    /// Record a transient failure (circuit open, transport, timeout, 5xx).
    /// Returns the jittered delay before the next check.
    pub fn on_transient_error(&mut self, settings: &PollSettings) -> Duration {
        let backed_off = self.interval.max(settings.error_backoff).saturating_mul(2);
        self.interval = backed_off.min(settings.max_backoff);
        self.phase = PollPhase::Backoff;
        jittered(self.interval, settings.jitter_factor)
    }

    pub fn terminate(&mut self) {
        self.phase = PollPhase::Terminated;
    }
}

/// Read-only view of a live session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: Uuid,
    pub job_id: String,
    pub phase: PollPhase,
    pub checks: u32,
    pub not_ready_count: u32,
    pub interval_ms: u64,
    pub elapsed_ms: u64,
    pub last_status: Option<String>,
}

impl From<&PollSession> for SessionInfo {
    fn from(session: &PollSession) -> Self {
        Self {
            session_id: session.session_id,
            job_id: session.job_id.clone(),
            phase: session.phase,
            checks: session.checks,
            not_ready_count: session.not_ready_count,
            interval_ms: session.interval.as_millis() as u64,
            elapsed_ms: session.started_at.elapsed().as_millis() as u64,
            last_status: session.last_status.as_ref().map(|s| s.as_str().to_string()),
        }
    }
}
