//! Per-host circuit breaker.
//!
//! # States
//!
//! ```text
//! Closed ──[failure_threshold failures within window]──> Open
//!   ▲                                                      │
//!   │                                                      │ [open_duration elapsed,
//!   │                                                      │  checked at the next call]
//!   │                                                      ▼
//!   └────────────[trial call succeeds]─────────────── HalfOpen
//!                 [trial call fails] ──────────────────> Open
//! ```
//!
//! Transitions are evaluated lazily against the caller-supplied instant;
//! nothing happens between calls.
//!
//! While half-open, exactly one trial call is admitted. Everyone else is
//! rejected as if the circuit were still open until the trial reports back.
//! A trial that never reports (the caller dropped the request) is considered
//! abandoned once `open_duration` has passed, and the next caller becomes the
//! new trial.

use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::window::FailureWindow;

/// Default number of failures within the window before opening
const DEFAULT_FAILURE_THRESHOLD: u32 = 5;

/// Default sliding window for counting failures
const DEFAULT_WINDOW: Duration = Duration::from_secs(60);

/// Default time an open circuit waits before admitting a trial call
const DEFAULT_OPEN_DURATION: Duration = Duration::from_secs(30);

/// State of a host's circuit
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass through
    Closed,
    /// Requests fail fast without touching the network
    Open,
    /// A single trial request is allowed through
    HalfOpen,
}

/// Circuit breaker thresholds, shared by all hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Failures within [`Self::window`] that open the circuit
    pub failure_threshold: u32,

    /// Sliding window in which failures are counted
    #[serde(with = "humantime_serde")]
    pub window: Duration,

    /// How long the circuit stays open before a trial call is admitted
    #[serde(with = "humantime_serde")]
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: DEFAULT_FAILURE_THRESHOLD,
            window: DEFAULT_WINDOW,
            open_duration: DEFAULT_OPEN_DURATION,
        }
    }
}

/// How a call was let through the breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Admission {
    /// The circuit is closed
    Closed,
    /// The call is the half-open trial
    Trial,
}

#[derive(Debug, Clone)]
pub(crate) struct CircuitBreaker {
    config: CircuitBreakerConfig,
    state: CircuitState,
    failures: FailureWindow,
    opened_at: Option<Instant>,
    trial_started_at: Option<Instant>,
}

impl CircuitBreaker {
    pub(crate) const fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            failures: FailureWindow::new(config.window),
            opened_at: None,
            trial_started_at: None,
        }
    }

    pub(crate) const fn state(&self) -> CircuitState {
        self.state
    }

    /// Decide whether a call may proceed.
    ///
    /// Rejections carry the remaining cooldown until a trial may be admitted.
    pub(crate) fn admit(&mut self, now: Instant) -> Result<Admission, Duration> {
        match self.state {
            CircuitState::Closed => Ok(Admission::Closed),
            CircuitState::Open => {
                let opened_at = self.opened_at.unwrap_or(now);
                let elapsed = now.saturating_duration_since(opened_at);
                if elapsed < self.config.open_duration {
                    return Err(self.config.open_duration - elapsed);
                }
                self.state = CircuitState::HalfOpen;
                self.opened_at = None;
                self.trial_started_at = Some(now);
                Ok(Admission::Trial)
            }
            CircuitState::HalfOpen => {
                if let Some(started) = self.trial_started_at {
                    let elapsed = now.saturating_duration_since(started);
                    if elapsed < self.config.open_duration {
                        return Err(self.config.open_duration - elapsed);
                    }
                }
                self.trial_started_at = Some(now);
                Ok(Admission::Trial)
            }
        }
    }

    /// A call succeeded: close the circuit and forget past failures.
    ///
    /// Returns the state the circuit was in before.
    pub(crate) fn record_success(&mut self) -> CircuitState {
        let previous = self.state;
        self.state = CircuitState::Closed;
        self.failures.clear();
        self.opened_at = None;
        self.trial_started_at = None;
        previous
    }

    /// A call failed. Returns `true` if this failure opened the circuit.
    pub(crate) fn record_failure(&mut self, now: Instant) -> bool {
        match self.state {
            CircuitState::HalfOpen => {
                self.open(now);
                true
            }
            CircuitState::Closed => {
                let failures = self.failures.record(now);
                if failures >= self.config.failure_threshold as usize {
                    self.open(now);
                    true
                } else {
                    false
                }
            }
            // Calls admitted before the circuit tripped may still report in.
            CircuitState::Open => {
                self.failures.record(now);
                false
            }
        }
    }

    /// Failures currently inside the window
    pub(crate) fn recent_failures(&mut self, now: Instant) -> usize {
        self.failures.count(now)
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trial_started_at = None;
    }
}
