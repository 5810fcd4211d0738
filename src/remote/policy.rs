//! Execution and failure policies of the remote provider stage.

use crate::circuit_breaker::BreakerGuard;
use crate::core::RiskError;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Time budget of a provider call when nothing else is configured.
pub const DEFAULT_PROVIDER_TIMEOUT: Duration = Duration::from_secs(3);

/// What the stage does when the provider cannot be used.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Continue with the local signals only.
    #[default]
    FailOpen,
    /// Merge the configured fallback signals with `MaxRisk`.
    FailClosed,
}

impl FailurePolicy {
    /// Returns the snake_case name of the policy.
    pub fn name(&self) -> &'static str {
        match self {
            Self::FailOpen => "fail_open",
            Self::FailClosed => "fail_closed",
        }
    }
}

impl fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a provider call is bounded.
#[derive(Debug, Clone)]
pub enum ExecutionPolicy {
    /// A plain time budget.
    Timeout(Duration),
    /// A circuit breaker in front of the provider. Each admitted call
    /// still runs under [`DEFAULT_PROVIDER_TIMEOUT`], and a timeout counts
    /// as a failure.
    CircuitBreaker(Arc<BreakerGuard>),
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self::Timeout(DEFAULT_PROVIDER_TIMEOUT)
    }
}

impl ExecutionPolicy {
    /// The time budget of one call.
    pub fn call_timeout(&self) -> Duration {
        match self {
            Self::Timeout(timeout) => *timeout,
            Self::CircuitBreaker(_) => DEFAULT_PROVIDER_TIMEOUT,
        }
    }
}

/// Why the stage fell back instead of using the provider's answer.
#[derive(Debug)]
pub struct RemoteFallback {
    /// The failure policy that was applied.
    pub policy: FailurePolicy,
    /// What went wrong.
    pub cause: RiskError,
}

impl RemoteFallback {
    /// Returns `true` if the provider data was rejected as corrupt.
    pub fn is_integrity_violation(&self) -> bool {
        self.cause.is_data_integrity()
    }

    /// Returns `true` if the caller cancelled the call.
    pub fn is_cancelled(&self) -> bool {
        matches!(self.cause, RiskError::Cancelled)
    }

    /// Returns `true` if the pipeline must not continue on this fallback.
    ///
    /// Cancellation and corrupt data are always fatal. A fail-open
    /// fallback is fatal when the pipeline runs fail-closed. A fail-closed
    /// fallback never is: the pipeline scores the merged fallback signals.
    pub fn is_fatal(&self, pipeline_fail_closed: bool) -> bool {
        if self.is_integrity_violation() || self.is_cancelled() {
            return true;
        }
        match self.policy {
            FailurePolicy::FailOpen => pipeline_fail_closed,
            FailurePolicy::FailClosed => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SanitizeError;

    #[test]
    fn test_default_policies() {
        assert_eq!(FailurePolicy::default(), FailurePolicy::FailOpen);
        assert_eq!(
            ExecutionPolicy::default().call_timeout(),
            Duration::from_secs(3)
        );
    }

    #[test]
    fn test_fallback_fatality() {
        let open = |cause| RemoteFallback {
            policy: FailurePolicy::FailOpen,
            cause,
        };

        let failed = open(RiskError::provider_failed("p", "503"));
        assert!(failed.is_fatal(true));
        assert!(!failed.is_fatal(false));

        let timed_out = open(RiskError::timeout("p", Duration::from_secs(3)));
        assert!(timed_out.is_fatal(true));
        assert!(!timed_out.is_fatal(false));

        assert!(open(RiskError::Cancelled).is_fatal(false));
        assert!(open(SanitizeError::NonFinite { field: "reputation_score" }.into()).is_fatal(false));

        let closed = RemoteFallback {
            policy: FailurePolicy::FailClosed,
            cause: RiskError::provider_failed("p", "503"),
        };
        assert!(!closed.is_fatal(true));
        assert!(!closed.is_fatal(false));

        let closed_cancelled = RemoteFallback {
            policy: FailurePolicy::FailClosed,
            cause: RiskError::Cancelled,
        };
        assert!(closed_cancelled.is_fatal(false));
    }

    #[test]
    fn test_failure_policy_serde() {
        let policy: FailurePolicy = serde_json::from_str("\"fail_closed\"").unwrap();
        assert_eq!(policy, FailurePolicy::FailClosed);
        assert_eq!(policy.to_string(), "fail_closed");
    }
}
