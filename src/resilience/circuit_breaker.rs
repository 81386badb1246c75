//! Circuit breaker for upstream instance protection.
//!
//! # States
//! - Closed: normal operation, every outcome is recorded
//! - Open: instance assumed down, calls fail fast
//! - Half-Open: one trial call decides between Closed and Open
//!
//! # State Transitions
//! ```text
//! Closed → Open: total >= minimum_requests and
//!                (failures / total >= expected_error_rate or failures >= failure_threshold)
//! Open → Half-Open: reset timeout elapsed (next call, or the recovery timer)
//! Half-Open → Closed: trial call succeeds (all counters cleared)
//! Half-Open → Open: trial call fails (fresh reset timeout)
//! ```
//!
//! # Design Decisions
//! - Per-instance circuit breaker (not global)
//! - Fail fast in Open state (the wrapped call is never invoked)
//! - Single trial in Half-Open; concurrent arrivals are rejected until it settles
//! - Admission and outcome recording are short critical sections; the wrapped
//!   call itself runs outside the lock

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::clock::unix_millis;
use crate::config::CircuitBreakerConfig;
use crate::error::{CallError, CircuitOpenError};
use crate::observability::metrics;

/// Breaker state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Read-only view of a breaker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CircuitBreakerStats {
    pub target: String,
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_requests: u32,
    /// Milliseconds since the Unix epoch.
    pub last_failure_time: Option<u64>,
    pub last_success_time: Option<u64>,
    pub next_attempt_time: Option<u64>,
    pub config: CircuitBreakerConfig,
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    total_requests: u32,
    last_failure_time: Option<u64>,
    last_success_time: Option<u64>,
    next_attempt: Option<Instant>,
    next_attempt_time: Option<u64>,
    trial_in_flight: bool,
    /// Bumped on every forced or automatic transition; stale recovery timers compare it.
    generation: u64,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            total_requests: 0,
            last_failure_time: None,
            last_success_time: None,
            next_attempt: None,
            next_attempt_time: None,
            trial_in_flight: false,
            generation: 0,
        }
    }

    fn reset(&mut self) {
        self.state = CircuitState::Closed;
        self.failure_count = 0;
        self.success_count = 0;
        self.total_requests = 0;
        self.next_attempt = None;
        self.next_attempt_time = None;
        self.trial_in_flight = false;
        self.generation += 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Admission {
    Normal,
    Trial,
}

/// Failure-isolation state machine wrapping calls to one upstream instance.
#[derive(Debug)]
pub struct CircuitBreaker {
    target: String,
    config: CircuitBreakerConfig,
    inner: Arc<Mutex<BreakerState>>,
}

fn lock(inner: &Mutex<BreakerState>) -> MutexGuard<'_, BreakerState> {
    inner.lock().unwrap_or_else(PoisonError::into_inner)
}

impl CircuitBreaker {
    pub fn new(target: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            target: target.into(),
            config,
            inner: Arc::new(Mutex::new(BreakerState::new())),
        }
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Run `operation` under the state machine.
    ///
    /// Returns `CallError::Open` without invoking `operation` when rejected,
    /// and `CallError::Operation` with the operation's own error after
    /// recording the failure.
    pub async fn execute<T, E, F, Fut>(&self, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let admission = self.admit()?;
        let mut permit = Permit {
            breaker: self,
            admission,
            settled: false,
        };

        let result = operation().await;
        permit.settled = true;
        match &result {
            Ok(_) => self.on_success(admission),
            Err(_) => self.on_failure(admission),
        }
        result.map_err(CallError::Operation)
    }

    pub fn state(&self) -> CircuitState {
        lock(&self.inner).state
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let s = lock(&self.inner);
        CircuitBreakerStats {
            target: self.target.clone(),
            state: s.state,
            failure_count: s.failure_count,
            success_count: s.success_count,
            total_requests: s.total_requests,
            last_failure_time: s.last_failure_time,
            last_success_time: s.last_success_time,
            next_attempt_time: s.next_attempt_time,
            config: self.config,
        }
    }

    /// Open the breaker regardless of counters. Recovery follows the reset timeout.
    pub fn force_open(&self) {
        let mut s = lock(&self.inner);
        let from = s.state;
        let generation = self.open(&mut s);
        drop(s);
        self.log_transition(from, CircuitState::Open, "forced");
        self.schedule_half_open(generation);
    }

    /// Full reset to Closed with cleared counters.
    pub fn force_close(&self) {
        let mut s = lock(&self.inner);
        let from = s.state;
        s.reset();
        drop(s);
        self.log_transition(from, CircuitState::Closed, "forced");
    }

    /// Move to Half-Open so the next call becomes the trial.
    pub fn force_half_open(&self) {
        let mut s = lock(&self.inner);
        let from = s.state;
        s.state = CircuitState::HalfOpen;
        s.next_attempt = None;
        s.next_attempt_time = None;
        s.trial_in_flight = false;
        s.generation += 1;
        drop(s);
        self.log_transition(from, CircuitState::HalfOpen, "forced");
    }

    fn admit(&self) -> Result<Admission, CircuitOpenError> {
        let mut s = lock(&self.inner);
        let now = Instant::now();

        let (state, next_attempt) = (s.state, s.next_attempt);

        let rejection = match state {
            CircuitState::Closed => return Ok(Admission::Normal),
            CircuitState::Open => match next_attempt {
                Some(next) if now >= next => {
                    s.state = CircuitState::HalfOpen;
                    s.trial_in_flight = true;
                    s.generation += 1;
                    drop(s);
                    self.log_transition(CircuitState::Open, CircuitState::HalfOpen, "reset timeout elapsed");
                    return Ok(Admission::Trial);
                }
                Some(next) => Some(next.saturating_duration_since(now).as_millis() as u64),
                None => None,
            },
            CircuitState::HalfOpen => {
                if !s.trial_in_flight {
                    s.trial_in_flight = true;
                    return Ok(Admission::Trial);
                }
                None
            }
        };
        drop(s);

        metrics::record_breaker_rejection(&self.target);
        tracing::debug!(target_key = %self.target, "Call rejected, circuit open");
        Err(CircuitOpenError {
            target: self.target.clone(),
            retry_after_ms: rejection,
        })
    }

    fn on_success(&self, admission: Admission) {
        let mut s = lock(&self.inner);
        s.success_count = s.success_count.saturating_add(1);
        s.total_requests = s.total_requests.saturating_add(1);
        s.last_success_time = Some(unix_millis());

        if admission == Admission::Trial {
            s.trial_in_flight = false;
            if s.state == CircuitState::HalfOpen {
                s.reset();
                drop(s);
                self.log_transition(CircuitState::HalfOpen, CircuitState::Closed, "trial call succeeded");
            }
        }
    }

    fn on_failure(&self, admission: Admission) {
        let mut s = lock(&self.inner);
        s.failure_count = s.failure_count.saturating_add(1);
        s.total_requests = s.total_requests.saturating_add(1);
        s.last_failure_time = Some(unix_millis());
        if admission == Admission::Trial {
            s.trial_in_flight = false;
        }

        let (from, reason) = match (s.state, admission) {
            (CircuitState::HalfOpen, Admission::Trial) => (CircuitState::HalfOpen, "trial call failed"),
            (CircuitState::Closed, _) if self.should_trip(&s) => (CircuitState::Closed, "failure threshold reached"),
            _ => return,
        };

        let generation = self.open(&mut s);
        let (failures, total) = (s.failure_count, s.total_requests);
        drop(s);

        tracing::warn!(
            target_key = %self.target,
            failures,
            total,
            reset_timeout_ms = self.config.reset_timeout_ms,
            "Circuit tripped"
        );
        self.log_transition(from, CircuitState::Open, reason);
        self.schedule_half_open(generation);
    }

    fn should_trip(&self, s: &BreakerState) -> bool {
        let minimum = self.config.minimum_requests.max(1);
        if s.total_requests < minimum {
            return false;
        }
        let error_rate = s.failure_count as f64 / s.total_requests as f64;
        error_rate >= self.config.expected_error_rate || s.failure_count >= self.config.failure_threshold
    }

    fn open(&self, s: &mut BreakerState) -> u64 {
        let reset = Duration::from_millis(self.config.reset_timeout_ms);
        s.state = CircuitState::Open;
        s.next_attempt = Some(Instant::now() + reset);
        s.next_attempt_time = Some(unix_millis() + self.config.reset_timeout_ms);
        s.trial_in_flight = false;
        s.generation += 1;
        s.generation
    }

    /// Flip Open → Half-Open once the reset timeout elapses, even without traffic.
    fn schedule_half_open(&self, generation: u64) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            return;
        };
        let inner: Weak<Mutex<BreakerState>> = Arc::downgrade(&self.inner);
        let target = self.target.clone();
        let delay = Duration::from_millis(self.config.reset_timeout_ms);

        handle.spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut s = lock(&inner);
            if s.state == CircuitState::Open && s.generation == generation {
                s.state = CircuitState::HalfOpen;
                s.trial_in_flight = false;
                s.generation += 1;
                drop(s);
                metrics::record_breaker_state(&target, CircuitState::HalfOpen);
                tracing::info!(
                    target_key = %target,
                    from = %CircuitState::Open,
                    to = %CircuitState::HalfOpen,
                    "Circuit recovery timer elapsed"
                );
            }
        });
    }

    fn log_transition(&self, from: CircuitState, to: CircuitState, reason: &str) {
        metrics::record_breaker_state(&self.target, to);
        if from != to {
            tracing::info!(target_key = %self.target, from = %from, to = %to, reason, "Circuit state changed");
        }
    }
}

/// Releases a Half-Open trial slot if the call is dropped before it settles.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    admission: Admission,
    settled: bool,
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.settled && self.admission == Admission::Trial {
            lock(&self.breaker.inner).trial_in_flight = false;
        }
    }
}
