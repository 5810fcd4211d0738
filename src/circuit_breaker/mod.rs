//! Circuit breaker for unreliable risk providers.
//!
//! The breaker is a pure state machine: [`evaluate_gate`] decides whether a
//! call may be made and [`apply_outcome`] folds its result back in. Both
//! take the current [`CircuitBreakerMetrics`] and an explicit timestamp and
//! return the next value, which makes every transition reproducible in
//! tests. [`BreakerGuard`] owns one state value for callers that share a
//! breaker between tasks.
//!
//! ## States
//!
//! - **Closed**: Normal operation; outcomes are counted.
//! - **Open**: The provider is failing; calls are denied until the cooldown
//!   elapses.
//! - **Half-Open**: A limited number of probes test whether the provider
//!   has recovered. One success closes the circuit, one failure reopens it.
//!
//! Independently of the state, a per-window error budget denies every call
//! once it is exhausted.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use riskgate::circuit_breaker::{
//!     apply_outcome, evaluate_gate, CallOutcome, CircuitBreakerConfig, CircuitBreakerMetrics,
//! };
//!
//! let config = CircuitBreakerConfig::default();
//! let state = CircuitBreakerMetrics::initial(now);
//!
//! let decision = evaluate_gate(&state, &config, now);
//! if decision.is_allowed() {
//!     let outcome = call_provider().await;
//!     let state = apply_outcome(decision.next_state(), outcome, &config, later);
//! }
//! ```

mod breaker;
mod config;
mod guard;
mod state;

pub use breaker::{apply_outcome, evaluate_gate, CallOutcome, GateBlockReason, GateDecision};
pub use config::{CircuitBreakerConfig, RawCircuitBreakerConfig};
pub use guard::BreakerGuard;
pub use state::{CircuitBreakerMetrics, CircuitState};
