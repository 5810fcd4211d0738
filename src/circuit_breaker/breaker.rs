//! The breaker state machine as pure functions.
//!
//! Every call takes the current [`CircuitBreakerMetrics`] and an explicit
//! `now_ms` and returns the next value. Nothing here locks, sleeps or
//! reads a clock, so the same inputs always produce the same output.
//! [`BreakerGuard`](super::BreakerGuard) wraps these functions for callers
//! that share one breaker between tasks.

use crate::circuit_breaker::config::CircuitBreakerConfig;
use crate::circuit_breaker::state::{CircuitBreakerMetrics, CircuitState};

use serde::{Deserialize, Serialize};
use std::fmt;

/// Why a gate refused a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateBlockReason {
    /// Too many failures in the current error-budget window.
    ErrorBudgetExhausted,
    /// The circuit is open and the cooldown has not elapsed.
    CooldownActive,
    /// Every half-open probe slot is taken.
    HalfOpenProbeLimitReached,
}

impl GateBlockReason {
    /// Returns the reason as a stable snake_case string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ErrorBudgetExhausted => "error_budget_exhausted",
            Self::CooldownActive => "cooldown_active",
            Self::HalfOpenProbeLimitReached => "half_open_probe_limit_reached",
        }
    }
}

impl fmt::Display for GateBlockReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The verdict of [`evaluate_gate`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GateDecision {
    /// The call may proceed.
    Allow {
        /// State to store before making the call.
        next_state: CircuitBreakerMetrics,
    },
    /// The call must not be made.
    Deny {
        /// State to store; a denial can still transition the circuit.
        next_state: CircuitBreakerMetrics,
        /// Why the call was refused.
        reason: GateBlockReason,
        /// Suggested wait before asking again, when one is known.
        retry_after_ms: Option<u64>,
    },
}

impl GateDecision {
    /// Returns `true` if the call may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// Returns the state to store.
    pub fn next_state(&self) -> &CircuitBreakerMetrics {
        match self {
            Self::Allow { next_state } | Self::Deny { next_state, .. } => next_state,
        }
    }

    /// Returns the denial reason, if denied.
    pub fn reason(&self) -> Option<GateBlockReason> {
        match self {
            Self::Allow { .. } => None,
            Self::Deny { reason, .. } => Some(*reason),
        }
    }

    /// Consumes the decision, returning the state to store.
    pub fn into_next_state(self) -> CircuitBreakerMetrics {
        match self {
            Self::Allow { next_state } | Self::Deny { next_state, .. } => next_state,
        }
    }
}

/// The result of a gated call, fed back through [`apply_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallOutcome {
    /// The dependency answered.
    Success,
    /// The dependency failed or timed out.
    Failure,
    /// The caller gave up before the dependency answered. Frees a
    /// half-open probe slot and counts as neither success nor failure.
    Abandoned,
}

/// Decides whether a call may go through at `now_ms`.
pub fn evaluate_gate(
    state: &CircuitBreakerMetrics,
    config: &CircuitBreakerConfig,
    now_ms: u64,
) -> GateDecision {
    let config = config.clamped();
    let mut next = roll_window(state, &config, now_ms);

    if next.errors_in_window >= config.error_budget_per_window {
        if next.state != CircuitState::Open {
            next = next.transitioned(CircuitState::Open, now_ms);
        }
        let window_end = next
            .window_started_ms
            .saturating_add(config.error_budget_window_ms);
        return GateDecision::Deny {
            next_state: next,
            reason: GateBlockReason::ErrorBudgetExhausted,
            retry_after_ms: Some(window_end.saturating_sub(now_ms)),
        };
    }

    match next.state {
        CircuitState::Closed => GateDecision::Allow { next_state: next },

        CircuitState::Open => {
            let elapsed = now_ms.saturating_sub(next.last_transition_ms);
            if elapsed >= config.open_state_cooldown_ms {
                let mut half_open = next.transitioned(CircuitState::HalfOpen, now_ms);
                half_open.half_open_probe_count = 1;
                GateDecision::Allow {
                    next_state: half_open,
                }
            } else {
                GateDecision::Deny {
                    next_state: next,
                    reason: GateBlockReason::CooldownActive,
                    retry_after_ms: Some(config.open_state_cooldown_ms.saturating_sub(elapsed)),
                }
            }
        }

        CircuitState::HalfOpen => {
            if next.half_open_probe_count < config.half_open_probe_limit {
                next.half_open_probe_count += 1;
                GateDecision::Allow { next_state: next }
            } else {
                GateDecision::Deny {
                    next_state: next,
                    reason: GateBlockReason::HalfOpenProbeLimitReached,
                    retry_after_ms: None,
                }
            }
        }
    }
}

/// Folds the outcome of a gated call into the state.
pub fn apply_outcome(
    state: &CircuitBreakerMetrics,
    outcome: CallOutcome,
    config: &CircuitBreakerConfig,
    now_ms: u64,
) -> CircuitBreakerMetrics {
    let config = config.clamped();
    let mut next = roll_window(state, &config, now_ms);

    if outcome == CallOutcome::Failure {
        next.errors_in_window = next.errors_in_window.saturating_add(1);
    }

    match (next.state, outcome) {
        (CircuitState::HalfOpen, CallOutcome::Success) => {
            next.transitioned(CircuitState::Closed, now_ms)
        }
        (CircuitState::HalfOpen, CallOutcome::Failure) => {
            next.transitioned(CircuitState::Open, now_ms)
        }
        (CircuitState::HalfOpen, CallOutcome::Abandoned) => {
            next.half_open_probe_count = next.half_open_probe_count.saturating_sub(1);
            next
        }

        (CircuitState::Closed, CallOutcome::Success) => {
            next.success_count = next.success_count.saturating_add(1);
            next
        }
        (CircuitState::Closed, CallOutcome::Failure) => {
            next.failure_count = next.failure_count.saturating_add(1);
            if next.total_requests() >= u64::from(config.minimum_request_count)
                && next.failure_rate_percent() >= config.failure_rate_threshold_percent
            {
                next.transitioned(CircuitState::Open, now_ms)
            } else {
                next
            }
        }
        (CircuitState::Closed, CallOutcome::Abandoned) => next,

        (CircuitState::Open, _) => next,
    }
}

fn roll_window(
    state: &CircuitBreakerMetrics,
    config: &CircuitBreakerConfig,
    now_ms: u64,
) -> CircuitBreakerMetrics {
    let mut next = state.clone();
    if now_ms.saturating_sub(next.window_started_ms) >= config.error_budget_window_ms {
        next.errors_in_window = 0;
        next.window_started_ms = now_ms;
    }
    next
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> CircuitBreakerConfig {
        CircuitBreakerConfig::new()
            .with_minimum_request_count(4)
            .with_failure_rate_threshold_percent(50.0)
            .with_open_state_cooldown_ms(1_000)
            .with_half_open_probe_limit(1)
            .with_error_budget_per_window(100)
            .with_error_budget_window_ms(60_000)
    }

    fn open_at(now: u64) -> CircuitBreakerMetrics {
        CircuitBreakerMetrics::initial(now).transitioned(CircuitState::Open, now)
    }

    #[test]
    fn test_closed_allows() {
        let state = CircuitBreakerMetrics::initial(0);
        let decision = evaluate_gate(&state, &config(), 10);
        assert!(decision.is_allowed());
        assert!(decision.next_state().is_closed());
    }

    #[test]
    fn test_opens_on_failure_rate() {
        let config = config();
        let mut state = CircuitBreakerMetrics::initial(0);
        state = apply_outcome(&state, CallOutcome::Success, &config, 1);
        state = apply_outcome(&state, CallOutcome::Success, &config, 2);
        state = apply_outcome(&state, CallOutcome::Failure, &config, 3);
        assert!(state.is_closed());

        // 2 of 4 failed: 50% meets the threshold.
        state = apply_outcome(&state, CallOutcome::Failure, &config, 4);
        assert!(state.is_open());
        assert_eq!(state.last_transition_ms, 4);
    }

    #[test]
    fn test_minimum_request_count_gates_opening() {
        let config = config();
        let mut state = CircuitBreakerMetrics::initial(0);
        for t in 1..=3 {
            state = apply_outcome(&state, CallOutcome::Failure, &config, t);
        }
        assert!(state.is_closed());
    }

    #[test]
    fn test_open_denies_during_cooldown() {
        let state = open_at(1_000);
        let decision = evaluate_gate(&state, &config(), 1_400);
        match decision {
            GateDecision::Deny {
                reason,
                retry_after_ms,
                ..
            } => {
                assert_eq!(reason, GateBlockReason::CooldownActive);
                assert_eq!(retry_after_ms, Some(600));
            }
            GateDecision::Allow { .. } => panic!("expected deny"),
        }
    }

    #[test]
    fn test_cooldown_retry_is_never_negative() {
        // Clock moved backwards relative to the transition stamp.
        let state = open_at(5_000);
        let decision = evaluate_gate(&state, &config(), 4_000);
        match decision {
            GateDecision::Deny { retry_after_ms, .. } => {
                assert_eq!(retry_after_ms, Some(1_000));
            }
            GateDecision::Allow { .. } => panic!("expected deny"),
        }
    }

    #[test]
    fn test_open_to_half_open_after_cooldown() {
        let state = open_at(0);
        let decision = evaluate_gate(&state, &config(), 1_000);
        assert!(decision.is_allowed());
        let next = decision.into_next_state();
        assert!(next.is_half_open());
        assert_eq!(next.half_open_probe_count, 1);
        assert_eq!(next.last_transition_ms, 1_000);
    }

    #[test]
    fn test_half_open_probe_limit() {
        let state = open_at(0);
        let next = evaluate_gate(&state, &config(), 1_000).into_next_state();
        let decision = evaluate_gate(&next, &config(), 1_001);
        assert_eq!(
            decision.reason(),
            Some(GateBlockReason::HalfOpenProbeLimitReached)
        );
        assert_eq!(decision.next_state().half_open_probe_count, 1);
    }

    #[test]
    fn test_half_open_success_closes() {
        let config = config();
        let half_open = evaluate_gate(&open_at(0), &config, 1_000).into_next_state();
        let closed = apply_outcome(&half_open, CallOutcome::Success, &config, 1_010);

        assert!(closed.is_closed());
        assert_eq!(closed.success_count, 0);
        assert_eq!(closed.failure_count, 0);
        assert_eq!(closed.half_open_probe_count, 0);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let config = config();
        let half_open = evaluate_gate(&open_at(0), &config, 1_000).into_next_state();
        let reopened = apply_outcome(&half_open, CallOutcome::Failure, &config, 1_010);

        assert!(reopened.is_open());
        assert_eq!(reopened.last_transition_ms, 1_010);
        assert_eq!(reopened.half_open_probe_count, 0);
    }

    #[test]
    fn test_abandoned_probe_frees_slot() {
        let config = config();
        let half_open = evaluate_gate(&open_at(0), &config, 1_000).into_next_state();
        let released = apply_outcome(&half_open, CallOutcome::Abandoned, &config, 1_005);

        assert!(released.is_half_open());
        assert_eq!(released.half_open_probe_count, 0);
        assert!(evaluate_gate(&released, &config, 1_006).is_allowed());
    }

    #[test]
    fn test_error_budget_denies_in_any_state() {
        let config = config().with_error_budget_per_window(3);
        let mut state = CircuitBreakerMetrics::initial(0);
        // Keep the rate check from opening the circuit first.
        for t in 0..10 {
            state = apply_outcome(&state, CallOutcome::Success, &config, t);
        }
        for t in 10..13 {
            state = apply_outcome(&state, CallOutcome::Failure, &config, t);
        }
        assert!(state.is_closed());
        assert_eq!(state.errors_in_window, 3);

        let decision = evaluate_gate(&state, &config, 20);
        assert_eq!(decision.reason(), Some(GateBlockReason::ErrorBudgetExhausted));
        assert!(decision.next_state().is_open());
        assert_eq!(decision.next_state().last_transition_ms, 20);

        // Still denied, and the transition stamp does not move.
        let again = evaluate_gate(decision.next_state(), &config, 5_000);
        assert_eq!(again.reason(), Some(GateBlockReason::ErrorBudgetExhausted));
        assert_eq!(again.next_state().last_transition_ms, 20);
    }

    #[test]
    fn test_error_budget_retry_is_remaining_window() {
        let config = config()
            .with_error_budget_per_window(1)
            .with_error_budget_window_ms(10_000);
        let state = CircuitBreakerMetrics::initial(0);
        let state = apply_outcome(&state, CallOutcome::Failure, &config, 100);
        match evaluate_gate(&state, &config, 2_500) {
            GateDecision::Deny { retry_after_ms, .. } => {
                assert_eq!(retry_after_ms, Some(7_500));
            }
            GateDecision::Allow { .. } => panic!("expected deny"),
        }
    }

    #[test]
    fn test_window_rolls_forward() {
        let config = config()
            .with_error_budget_per_window(1)
            .with_error_budget_window_ms(10_000);
        let state = apply_outcome(
            &CircuitBreakerMetrics::initial(0),
            CallOutcome::Failure,
            &config,
            100,
        );
        let decision = evaluate_gate(&state, &config, 10_000);
        assert_eq!(decision.next_state().errors_in_window, 0);
        assert_eq!(decision.next_state().window_started_ms, 10_000);
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_open_ignores_outcomes_except_budget() {
        let config = config();
        let state = open_at(0);
        let next = apply_outcome(&state, CallOutcome::Failure, &config, 10);
        assert!(next.is_open());
        assert_eq!(next.failure_count, 0);
        assert_eq!(next.errors_in_window, 1);
        assert_eq!(next.last_transition_ms, 0);
    }

    #[test]
    fn test_degenerate_config_is_clamped() {
        // A zero probe limit would leave a half-open circuit stuck forever.
        let config = config().with_half_open_probe_limit(0);
        let decision = evaluate_gate(&open_at(0), &config, 1_000);
        assert!(decision.is_allowed());
    }

    #[test]
    fn test_inputs_are_not_mutated() {
        let config = config();
        let state = open_at(0);
        let before = state.clone();
        let _ = evaluate_gate(&state, &config, 2_000);
        let _ = apply_outcome(&state, CallOutcome::Failure, &config, 2_000);
        assert_eq!(state, before);
    }

    #[test]
    fn test_reason_display() {
        assert_eq!(
            GateBlockReason::ErrorBudgetExhausted.to_string(),
            "error_budget_exhausted"
        );
        assert_eq!(GateBlockReason::CooldownActive.to_string(), "cooldown_active");
    }
}
