//! Shared breaker cell.

use crate::circuit_breaker::breaker::{apply_outcome, evaluate_gate, CallOutcome, GateDecision};
use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::CircuitBreakerMetrics;
use crate::core::{ArcClock, RiskError, SystemClock};

use std::fmt;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A circuit breaker shared between concurrent callers.
///
/// The pure functions in this module do no locking. `BreakerGuard` owns
/// the single [`CircuitBreakerMetrics`] value for one dependency and
/// performs each read-modify-write under a mutex, so two tasks can never
/// both take the last half-open probe.
///
/// # Example
///
/// ```rust,ignore
/// use riskgate::circuit_breaker::{BreakerGuard, CircuitBreakerConfig};
///
/// let guard = BreakerGuard::new("ip-intel", CircuitBreakerConfig::default());
/// let response = guard.call(provider.fetch(request)).await?;
/// ```
pub struct BreakerGuard {
    name: String,
    config: CircuitBreakerConfig,
    clock: ArcClock,
    state: Mutex<CircuitBreakerMetrics>,
}

impl BreakerGuard {
    /// Creates a guard using the system clock.
    pub fn new(name: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self::with_clock(name, config, Arc::new(SystemClock))
    }

    /// Creates a guard reading time from `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: CircuitBreakerConfig,
        clock: ArcClock,
    ) -> Self {
        let initial = CircuitBreakerMetrics::initial(clock.now_ms());
        Self {
            name: name.into(),
            config: config.clamped(),
            clock,
            state: Mutex::new(initial),
        }
    }

    /// Returns the name of the protected dependency.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the effective (clamped) configuration.
    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    /// Returns a snapshot of the current state.
    pub fn state(&self) -> CircuitBreakerMetrics {
        self.state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Resets the breaker to a fresh closed state.
    pub fn reset(&self) {
        let now = self.clock.now_ms();
        *self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = CircuitBreakerMetrics::initial(now);
    }

    /// Asks the gate for permission and stores the resulting state.
    ///
    /// Returns [`RiskError::CircuitOpen`] when the call must not be made.
    pub fn try_acquire(&self) -> Result<(), RiskError> {
        let now = self.clock.now_ms();
        let decision = {
            let mut state = self
                .state
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            let decision = evaluate_gate(&state, &self.config, now);
            let previous = state.state;
            *state = decision.next_state().clone();
            if previous != state.state {
                log_transition(&self.name, previous.name(), state.state.name());
            }
            decision
        };

        match decision {
            GateDecision::Allow { .. } => Ok(()),
            GateDecision::Deny {
                reason,
                retry_after_ms,
                ..
            } => {
                tracing::debug!(
                    provider = %self.name,
                    reason = %reason,
                    retry_after_ms = ?retry_after_ms,
                    "Circuit breaker denied call"
                );
                Err(RiskError::CircuitOpen {
                    provider: self.name.clone(),
                    reason,
                    retry_after: retry_after_ms.map(Duration::from_millis),
                })
            }
        }
    }

    /// Records the outcome of a call made after [`Self::try_acquire`].
    pub fn record(&self, outcome: CallOutcome) {
        let now = self.clock.now_ms();
        let mut state = self
            .state
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let previous = state.state;
        *state = apply_outcome(&state, outcome, &self.config, now);
        if previous != state.state {
            log_transition(&self.name, previous.name(), state.state.name());
        }
    }

    /// Runs `call` through the gate and records how it ended.
    ///
    /// Cancellation is recorded as [`CallOutcome::Abandoned`], and so is
    /// dropping the returned future before `call` completes. Every other
    /// error counts as a failure.
    pub async fn call<T, F>(&self, call: F) -> Result<T, RiskError>
    where
        F: Future<Output = Result<T, RiskError>>,
    {
        self.try_acquire()?;
        let in_flight = InFlight {
            guard: self,
            settled: false,
        };
        let result = call.await;
        in_flight.settle(match &result {
            Ok(_) => CallOutcome::Success,
            Err(RiskError::Cancelled) => CallOutcome::Abandoned,
            Err(_) => CallOutcome::Failure,
        });
        result
    }
}

/// An admitted call. Records [`CallOutcome::Abandoned`] when dropped
/// before it settles, so a dropped future never keeps a half-open slot.
struct InFlight<'a> {
    guard: &'a BreakerGuard,
    settled: bool,
}

impl InFlight<'_> {
    fn settle(mut self, outcome: CallOutcome) {
        self.settled = true;
        self.guard.record(outcome);
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if !self.settled {
            tracing::debug!(provider = %self.guard.name, "Admitted call dropped before completion");
            self.guard.record(CallOutcome::Abandoned);
        }
    }
}

fn log_transition(name: &str, from: &'static str, to: &'static str) {
    if to == "open" {
        tracing::warn!(provider = %name, from, to, "Circuit breaker opened");
    } else {
        tracing::info!(provider = %name, from, to, "Circuit breaker state changed");
    }
}

impl fmt::Debug for BreakerGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BreakerGuard")
            .field("name", &self.name)
            .field("state", &self.state().state)
            .field("config", &self.config)
            .finish()
    }
}
