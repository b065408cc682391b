//! Circuit breaker state machine.
//!
//! # States
//!
//! | State     | Admits                         | Leaves when                              |
//! |-----------|--------------------------------|------------------------------------------|
//! | Closed    | everything                     | failure ratio in the window > threshold  |
//! | Open      | nothing (fails fast)           | cool-down elapsed                        |
//! | HalfOpen  | up to `half_open_trials` calls | first trial success (Closed) or failure (Open) |
//!
//! The breaker is plain data; callers hold it behind a lock and pass the
//! current time in, which keeps transitions deterministic under test.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use crate::rate_limit::BreakerConfig;

/// Observable breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Calls flow; failures are counted in a rolling window
    Closed,
    /// Calls are rejected immediately
    Open,
    /// A limited number of trial calls probe for recovery
    HalfOpen,
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        };
        write!(f, "{}", s)
    }
}

/// How a call was admitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Regular call in the closed state
    Normal,
    /// Trial call in the half-open state
    Trial,
}

/// Circuit breaker with a rolling failure window.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: BreakerConfig,
    state: CircuitState,
    /// Outcomes in the closed state (`true` = failure)
    outcomes: VecDeque<(Instant, bool)>,
    opened_at: Option<Instant>,
    trials_in_flight: u32,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            config,
            state: CircuitState::Closed,
            outcomes: VecDeque::new(),
            opened_at: None,
            trials_in_flight: 0,
        }
    }

    /// Current state, accounting for an elapsed cool-down.
    pub fn state(&self, now: Instant) -> CircuitState {
        match (self.state, self.opened_at) {
            (CircuitState::Open, Some(opened)) if now >= opened + self.config.cool_down => {
                CircuitState::HalfOpen
            }
            (state, _) => state,
        }
    }

    /// Try to admit a call.
    ///
    /// Returns the admission kind, or `Err(retry_after)` while open or while
    /// every half-open trial slot is taken.
    pub fn try_admit(&mut self, now: Instant) -> Result<Admission, Duration> {
        if self.state == CircuitState::Open {
            let opened = self.opened_at.unwrap_or(now);
            let reopen_at = opened + self.config.cool_down;
            if now < reopen_at {
                return Err(reopen_at - now);
            }
            tracing::info!("circuit breaker half-open after cool-down");
            self.state = CircuitState::HalfOpen;
            self.trials_in_flight = 0;
        }

        match self.state {
            CircuitState::Closed => Ok(Admission::Normal),
            CircuitState::HalfOpen => {
                if self.trials_in_flight < self.config.half_open_trials.max(1) {
                    self.trials_in_flight += 1;
                    Ok(Admission::Trial)
                } else {
                    Err(self.config.cool_down)
                }
            }
            CircuitState::Open => Err(self.config.cool_down),
        }
    }

    /// Record a successful call.
    pub fn on_success(&mut self, admission: Admission, now: Instant) {
        match admission {
            Admission::Trial => {
                self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
                if self.state == CircuitState::HalfOpen {
                    tracing::info!("circuit breaker closed after successful trial");
                    self.close();
                }
            }
            Admission::Normal => {
                if self.state == CircuitState::Closed {
                    self.push_outcome(now, false);
                }
            }
        }
    }

    /// Record a failed call that counts toward breaker health.
    pub fn on_failure(&mut self, admission: Admission, now: Instant) {
        match admission {
            Admission::Trial => {
                self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
                if self.state == CircuitState::HalfOpen {
                    tracing::warn!("circuit breaker re-opened after failed trial");
                    self.open(now);
                }
            }
            Admission::Normal => {
                if self.state != CircuitState::Closed {
                    return;
                }
                self.push_outcome(now, true);
                if self.should_trip() {
                    tracing::warn!(
                        failures = self.failures(),
                        calls = self.outcomes.len(),
                        "circuit breaker opened"
                    );
                    self.open(now);
                }
            }
        }
    }

    /// Release an admission without an outcome (cancelled or non-health error).
    pub fn on_release(&mut self, admission: Admission) {
        if admission == Admission::Trial {
            self.trials_in_flight = self.trials_in_flight.saturating_sub(1);
        }
    }

    /// Return to a clean closed state.
    pub fn reset(&mut self) {
        self.close();
    }

    /// Trial calls currently admitted in the half-open state.
    pub fn trials_in_flight(&self) -> u32 {
        self.trials_in_flight
    }

    fn push_outcome(&mut self, now: Instant, failed: bool) {
        self.outcomes.push_back((now, failed));
        let window = self.config.window;
        while let Some((at, _)) = self.outcomes.front() {
            if now.saturating_duration_since(*at) > window {
                self.outcomes.pop_front();
            } else {
                break;
            }
        }
    }

    fn failures(&self) -> usize {
        self.outcomes.iter().filter(|(_, failed)| *failed).count()
    }

    fn should_trip(&self) -> bool {
        let calls = self.outcomes.len();
        if calls < self.config.minimum_calls as usize {
            return false;
        }
        let ratio = self.failures() as f64 / calls as f64;
        ratio > self.config.failure_ratio
    }

    fn open(&mut self, now: Instant) {
        self.state = CircuitState::Open;
        self.opened_at = Some(now);
        self.trials_in_flight = 0;
        self.outcomes.clear();
    }

    fn close(&mut self) {
        self.state = CircuitState::Closed;
        self.opened_at = None;
        self.trials_in_flight = 0;
        self.outcomes.clear();
    }
}
