//! Circuit breaker state.

use serde::{Deserialize, Serialize};

/// The state of a circuit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitState {
    /// Requests pass through.
    Closed,
    /// Requests are rejected until the cooldown elapses.
    Open,
    /// A limited number of probes are let through.
    HalfOpen,
}

impl CircuitState {
    /// Returns the name of the state.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Closed => "closed",
            Self::Open => "open",
            Self::HalfOpen => "half_open",
        }
    }
}

/// Everything a breaker knows, as one immutable value.
///
/// Operations never mutate a `CircuitBreakerMetrics` they are given; they
/// return the next value. `half_open_probe_count` is zero whenever
/// `state` is not [`CircuitState::HalfOpen`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CircuitBreakerMetrics {
    /// Current state.
    pub state: CircuitState,
    /// Successes recorded since the last transition.
    pub success_count: u32,
    /// Failures recorded since the last transition.
    pub failure_count: u32,
    /// Failures recorded in the current error-budget window.
    pub errors_in_window: u32,
    /// When the current error-budget window started.
    pub window_started_ms: u64,
    /// When `state` last changed.
    pub last_transition_ms: u64,
    /// Probes granted in the current half-open period.
    pub half_open_probe_count: u32,
}

impl CircuitBreakerMetrics {
    /// Creates the initial, closed state.
    pub fn initial(now_ms: u64) -> Self {
        Self {
            state: CircuitState::Closed,
            success_count: 0,
            failure_count: 0,
            errors_in_window: 0,
            window_started_ms: now_ms,
            last_transition_ms: now_ms,
            half_open_probe_count: 0,
        }
    }

    /// Returns `true` if the circuit is closed.
    pub fn is_closed(&self) -> bool {
        self.state == CircuitState::Closed
    }

    /// Returns `true` if the circuit is open.
    pub fn is_open(&self) -> bool {
        self.state == CircuitState::Open
    }

    /// Returns `true` if the circuit is half-open.
    pub fn is_half_open(&self) -> bool {
        self.state == CircuitState::HalfOpen
    }

    /// Requests recorded since the last transition.
    pub fn total_requests(&self) -> u64 {
        u64::from(self.success_count) + u64::from(self.failure_count)
    }

    /// Failure rate since the last transition, in percent.
    pub fn failure_rate_percent(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            return 0.0;
        }
        u64::from(self.failure_count) as f64 * 100.0 / total as f64
    }

    /// Returns the state after moving to `state` at `now_ms`.
    ///
    /// Per-state counters restart with every transition; the error-budget
    /// window is independent of the state and is left alone.
    pub(crate) fn transitioned(&self, state: CircuitState, now_ms: u64) -> Self {
        Self {
            state,
            success_count: 0,
            failure_count: 0,
            errors_in_window: self.errors_in_window,
            window_started_ms: self.window_started_ms,
            last_transition_ms: now_ms,
            half_open_probe_count: 0,
        }
    }
}

impl Default for CircuitBreakerMetrics {
    fn default() -> Self {
        Self::initial(0)
    }
}
